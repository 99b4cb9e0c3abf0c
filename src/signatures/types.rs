//! Signature record types.
//!
//! This module defines the portable record produced by every signing
//! operation and the tag that says which scheme produced it.

use crate::error::{Error, Result};
use crate::hash::Digest;
use crate::keys::Certificate;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Signing scheme that produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureScheme {
    /// RSA-PSS (MGF1/SHA-256, maximal salt) over the digest string's UTF-8 bytes
    #[serde(rename = "legacy-pss-over-digest")]
    LegacyPssOverDigest,
    /// RSA PKCS#1 v1.5 with SHA-256 over the raw content, tied to a certificate
    #[serde(rename = "certificate-pkcs1v15-over-content")]
    CertificatePkcs1v15OverContent,
}

impl SignatureScheme {
    /// Wire name of the scheme.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureScheme::LegacyPssOverDigest => "legacy-pss-over-digest",
            SignatureScheme::CertificatePkcs1v15OverContent => "certificate-pkcs1v15-over-content",
        }
    }

    /// Algorithm tag written into records.
    pub fn algorithm(&self) -> &'static str {
        match self {
            SignatureScheme::LegacyPssOverDigest => "RSA-SHA256",
            SignatureScheme::CertificatePkcs1v15OverContent => "RSA-PKCS1v15-SHA256",
        }
    }
}

impl std::fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SignatureScheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "legacy-pss-over-digest" | "legacy" => Ok(SignatureScheme::LegacyPssOverDigest),
            "certificate-pkcs1v15-over-content" | "certificate" => {
                Ok(SignatureScheme::CertificatePkcs1v15OverContent)
            },
            other => Err(Error::Unsupported(format!("signature scheme {}", other))),
        }
    }
}

/// Certificate identity captured at signing time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateStamp {
    /// Subject distinguished name
    pub certificate_subject: String,
    /// Issuer distinguished name
    pub certificate_issuer: String,
    /// Serial number in decimal
    pub certificate_serial: String,
    /// SHA-256 fingerprint of the certificate, lowercase hex
    pub certificate_fingerprint: String,
}

impl From<&Certificate> for CertificateStamp {
    fn from(cert: &Certificate) -> Self {
        let info = cert.info();
        Self {
            certificate_subject: info.subject.clone(),
            certificate_issuer: info.issuer.clone(),
            certificate_serial: info.serial_number.clone(),
            certificate_fingerprint: info.fingerprint_sha256.clone(),
        }
    }
}

/// Result of one signing operation.
///
/// Records are immutable once created and persisted by the caller. The JSON
/// form carries `hash`, `signature`, `timestamp`, `algorithm`, `scheme` and,
/// for certificate-based records, the flattened `certificate_*` fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    /// Digest of the signed content
    pub hash: Digest,
    /// Signature bytes, standard base64
    pub signature: String,
    /// Signing time
    pub timestamp: DateTime<Utc>,
    /// Algorithm tag
    pub algorithm: String,
    /// Scheme tag. Records persisted before the tag existed deserialize as `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<SignatureScheme>,
    /// Certificate identity for certificate-based records
    #[serde(flatten)]
    pub certificate: Option<CertificateStamp>,
}

impl SignatureRecord {
    /// Build a record from raw signature bytes.
    pub fn new(
        scheme: SignatureScheme,
        hash: Digest,
        signature: &[u8],
        timestamp: DateTime<Utc>,
        certificate: Option<CertificateStamp>,
    ) -> Self {
        Self {
            hash,
            signature: BASE64.encode(signature),
            timestamp,
            algorithm: scheme.algorithm().to_string(),
            scheme: Some(scheme),
            certificate,
        }
    }

    /// Decode the signature bytes.
    pub fn signature_bytes(&self) -> Result<Vec<u8>> {
        Ok(BASE64.decode(self.signature.trim())?)
    }

    /// Expected certificate fingerprint, if the record carries one.
    pub fn certificate_fingerprint(&self) -> Option<&str> {
        self.certificate
            .as_ref()
            .map(|stamp| stamp.certificate_fingerprint.as_str())
    }

    /// Serialize to compact JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::ContentHasher;

    fn sample(scheme: SignatureScheme, certificate: Option<CertificateStamp>) -> SignatureRecord {
        SignatureRecord::new(
            scheme,
            ContentHasher::digest(b"hello world"),
            &[1, 2, 3, 250],
            DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
            certificate,
        )
    }

    fn stamp() -> CertificateStamp {
        CertificateStamp {
            certificate_subject: "CN=test".to_string(),
            certificate_issuer: "CN=test".to_string(),
            certificate_serial: "42".to_string(),
            certificate_fingerprint: "ab".repeat(32),
        }
    }

    #[test]
    fn test_scheme_names() {
        assert_eq!(SignatureScheme::LegacyPssOverDigest.algorithm(), "RSA-SHA256");
        assert_eq!(
            "certificate".parse::<SignatureScheme>().unwrap(),
            SignatureScheme::CertificatePkcs1v15OverContent
        );
        assert_eq!(
            SignatureScheme::LegacyPssOverDigest
                .as_str()
                .parse::<SignatureScheme>()
                .unwrap(),
            SignatureScheme::LegacyPssOverDigest
        );
        assert!("rot13".parse::<SignatureScheme>().is_err());
    }

    #[test]
    fn test_legacy_record_wire_format() {
        let record = sample(SignatureScheme::LegacyPssOverDigest, None);
        let value: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();

        assert_eq!(value["hash"], ContentHasher::digest(b"hello world").as_str());
        assert_eq!(value["signature"], "AQID+g==");
        assert_eq!(value["algorithm"], "RSA-SHA256");
        assert_eq!(value["scheme"], "legacy-pss-over-digest");
        assert!(value["timestamp"].as_str().unwrap().starts_with("2023-11-14T22:13:20"));
        assert!(value.get("certificate_subject").is_none());
    }

    #[test]
    fn test_certificate_record_flattens_stamp() {
        let record = sample(SignatureScheme::CertificatePkcs1v15OverContent, Some(stamp()));
        let value: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();

        assert_eq!(value["certificate_subject"], "CN=test");
        assert_eq!(value["certificate_serial"], "42");
        assert_eq!(value["certificate_fingerprint"], "ab".repeat(32));

        let parsed = SignatureRecord::from_json(&record.to_json().unwrap()).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(parsed.certificate_fingerprint(), Some("ab".repeat(32).as_str()));
    }

    #[test]
    fn test_untagged_record_parses() {
        let json = format!(
            r#"{{"hash":"{}","signature":"AQID","timestamp":"2024-01-01T00:00:00Z","algorithm":"RSA-SHA256"}}"#,
            ContentHasher::digest(b"x")
        );
        let record = SignatureRecord::from_json(&json).unwrap();
        assert!(record.scheme.is_none());
        assert!(record.certificate.is_none());
        assert_eq!(record.signature_bytes().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_rejects_non_canonical_hash() {
        let json = r#"{"hash":"ABC","signature":"","timestamp":"2024-01-01T00:00:00Z","algorithm":"RSA-SHA256"}"#;
        assert!(SignatureRecord::from_json(json).is_err());
    }

    #[test]
    fn test_bad_base64() {
        let mut record = sample(SignatureScheme::LegacyPssOverDigest, None);
        record.signature = "not base64!".to_string();
        assert!(matches!(record.signature_bytes(), Err(Error::Base64(_))));
    }
}
