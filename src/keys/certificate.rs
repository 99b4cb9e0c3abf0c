//! Self-signed X.509 certificates bound to the engine's key pair.
//!
//! Certificates are issued with `x509-cert` and read back with `x509-parser`.
//! The validity window always starts at issuance and lasts for the configured
//! number of days.

use crate::config::CertificateSubject;
use crate::error::{Error, Result};
use crate::hash::bytes_to_hex;
use chrono::{DateTime, Utc};
use der::asn1::Ia5String;
use der::pem::LineEnding;
use der::{Decode, Encode};
use pkcs8::{DecodePublicKey, EncodePublicKey};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use spki::SubjectPublicKeyInfoOwned;
use std::str::FromStr;
use std::time::Duration;
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::SubjectAltName;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::Validity;

const PEM_LABEL: &str = "CERTIFICATE";
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Where the current time falls relative to a certificate's validity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CertificateStatus {
    /// Before `not_before`
    Future,
    /// Within the validity window
    Valid,
    /// After `not_after`
    Expired,
    /// Certificate absent or unreadable
    Error,
}

impl CertificateStatus {
    /// Upper-case name used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Future => "FUTURE",
            CertificateStatus::Valid => "VALID",
            CertificateStatus::Expired => "EXPIRED",
            CertificateStatus::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable certificate details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    /// Subject distinguished name
    pub subject: String,
    /// Issuer distinguished name (equal to the subject when self-signed)
    pub issuer: String,
    /// Serial number in decimal
    pub serial_number: String,
    /// Start of the validity window
    pub not_before: DateTime<Utc>,
    /// End of the validity window
    pub not_after: DateTime<Utc>,
    /// SHA-256 of the DER encoding, lowercase hex
    pub fingerprint_sha256: String,
    /// SHA-1 of the DER encoding, lowercase hex
    pub fingerprint_sha1: String,
}

impl CertificateInfo {
    /// Status of the validity window at the given instant.
    pub fn status_at(&self, now: DateTime<Utc>) -> CertificateStatus {
        if now < self.not_before {
            CertificateStatus::Future
        } else if now > self.not_after {
            CertificateStatus::Expired
        } else {
            CertificateStatus::Valid
        }
    }

    /// Status plus a short explanation, e.g. "valid for 1824 more days".
    pub fn status_message(&self, now: DateTime<Utc>) -> (CertificateStatus, String) {
        let status = self.status_at(now);
        let message = match status {
            CertificateStatus::Future => {
                format!("not valid until {}", self.not_before.to_rfc3339())
            },
            CertificateStatus::Valid => {
                format!("valid for {} more days", (self.not_after - now).num_days())
            },
            CertificateStatus::Expired => {
                format!("expired {} days ago", (now - self.not_after).num_days())
            },
            CertificateStatus::Error => String::new(),
        };
        (status, message)
    }
}

/// A parsed certificate with its DER encoding and public key.
#[derive(Clone)]
pub struct Certificate {
    der: Vec<u8>,
    info: CertificateInfo,
    public_key: RsaPublicKey,
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("der", &format!("{} bytes", self.der.len()))
            .field("info", &self.info)
            .finish()
    }
}

impl Certificate {
    /// Issue a self-signed certificate over the given key.
    ///
    /// `not_before` is the issuance time and `not_after` is `validity_days`
    /// later.
    pub fn issue(
        private_key: &RsaPrivateKey,
        subject: &CertificateSubject,
        validity_days: u32,
    ) -> Result<Self> {
        let public_key = RsaPublicKey::from(private_key);
        let spki_der = public_key
            .to_public_key_der()
            .map_err(|e| Error::Certificate(format!("encode public key: {}", e)))?;
        let spki = SubjectPublicKeyInfoOwned::from_der(spki_der.as_bytes())
            .map_err(|e| Error::Certificate(format!("decode public key info: {}", e)))?;

        let name = Name::from_str(&subject.to_rfc4514())
            .map_err(|e| Error::Certificate(format!("subject name: {}", e)))?;

        let mut serial = [0u8; 16];
        OsRng.fill_bytes(&mut serial);
        // Positive, without a leading zero octet
        serial[0] = (serial[0] & 0x7F) | 0x40;
        let serial_number = SerialNumber::new(&serial)
            .map_err(|e| Error::Certificate(format!("serial number: {}", e)))?;

        let validity =
            Validity::from_now(Duration::from_secs(u64::from(validity_days) * SECONDS_PER_DAY))
                .map_err(|e| Error::Certificate(format!("validity: {}", e)))?;

        let signer = rsa::pkcs1v15::SigningKey::<Sha256>::new(private_key.clone());
        let mut builder =
            CertificateBuilder::new(Profile::Root, serial_number, validity, name, spki, &signer)
                .map_err(|e| Error::Certificate(format!("builder: {}", e)))?;

        if !subject.common_name.is_empty() {
            let dns = Ia5String::new(&subject.common_name)
                .map_err(|e| Error::Certificate(format!("subject alt name: {}", e)))?;
            builder
                .add_extension(&SubjectAltName(vec![GeneralName::DnsName(dns)]))
                .map_err(|e| Error::Certificate(format!("subject alt name: {}", e)))?;
        }

        let cert = builder
            .build::<rsa::pkcs1v15::Signature>()
            .map_err(|e| Error::Certificate(format!("sign certificate: {}", e)))?;
        let der = cert
            .to_der()
            .map_err(|e| Error::Certificate(format!("encode certificate: {}", e)))?;

        Self::from_der(der)
    }

    /// Parse a PEM-encoded certificate.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let (_, pem) = x509_parser::pem::parse_x509_pem(pem.as_bytes())
            .map_err(|e| Error::Certificate(format!("PEM: {}", e)))?;
        if pem.label != PEM_LABEL {
            return Err(Error::Certificate(format!(
                "expected PEM label {}, found {}",
                PEM_LABEL, pem.label
            )));
        }
        Self::from_der(pem.contents)
    }

    /// Parse a DER-encoded certificate.
    pub fn from_der(der: Vec<u8>) -> Result<Self> {
        let (info, public_key) = {
            let (_, cert) = x509_parser::parse_x509_certificate(&der)
                .map_err(|e| Error::Certificate(format!("DER: {}", e)))?;

            let not_before = timestamp_to_utc(cert.validity().not_before.timestamp())?;
            let not_after = timestamp_to_utc(cert.validity().not_after.timestamp())?;
            let public_key = RsaPublicKey::from_public_key_der(cert.public_key().raw)
                .map_err(|e| Error::Certificate(format!("public key is not RSA: {}", e)))?;

            let info = CertificateInfo {
                subject: cert.subject().to_string(),
                issuer: cert.issuer().to_string(),
                serial_number: cert.serial.to_string(),
                not_before,
                not_after,
                fingerprint_sha256: bytes_to_hex(&Sha256::digest(&der)),
                fingerprint_sha1: bytes_to_hex(&Sha1::digest(&der)),
            };
            (info, public_key)
        };

        Ok(Self {
            der,
            info,
            public_key,
        })
    }

    /// PEM encoding.
    pub fn to_pem(&self) -> Result<String> {
        der::pem::encode_string(PEM_LABEL, LineEnding::LF, &self.der)
            .map_err(|e| Error::Certificate(format!("PEM encode: {}", e)))
    }

    /// DER encoding.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Parsed details.
    pub fn info(&self) -> &CertificateInfo {
        &self.info
    }

    /// The certified public key.
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// SHA-256 fingerprint, lowercase hex.
    pub fn fingerprint(&self) -> &str {
        &self.info.fingerprint_sha256
    }

    /// Status at the current time.
    pub fn status(&self) -> CertificateStatus {
        self.info.status_at(Utc::now())
    }
}

fn timestamp_to_utc(seconds: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(seconds, 0)
        .ok_or_else(|| Error::Certificate(format!("timestamp out of range: {}", seconds)))
}
