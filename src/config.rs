//! Configuration for the signature engine.
//!
//! Defaults match a single-deployment setup: keys under `./keys`, an
//! unencrypted private key, and a five-year self-signed certificate.
//! [`EngineConfig::from_env`] overlays the deployment's environment.

use std::path::PathBuf;

/// Environment variable naming the key directory.
pub const ENV_KEY_DIR: &str = "KEYS_DIR_SECURE";
/// Environment variable holding the private key passphrase.
pub const ENV_PASSPHRASE: &str = "PRIVATE_KEY_PASSPHRASE";
/// Environment variable overriding the certificate validity in days.
pub const ENV_CERT_VALIDITY_DAYS: &str = "CERTIFICATE_VALIDITY_DAYS";

/// Distinguished name fields written into the self-signed certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSubject {
    /// Country (C), two letters
    pub country: String,
    /// State or province (ST)
    pub state: String,
    /// Locality (L)
    pub locality: String,
    /// Organization (O)
    pub organization: String,
    /// Organizational unit (OU)
    pub organizational_unit: String,
    /// Common name (CN), also used as the DNS subject alternative name
    pub common_name: String,
}

impl Default for CertificateSubject {
    fn default() -> Self {
        Self {
            country: "BR".to_string(),
            state: "Goias".to_string(),
            locality: "Senador Canedo".to_string(),
            organization: "Document Signing Service".to_string(),
            organizational_unit: "Digital Signatures".to_string(),
            common_name: "pdf-seal.local".to_string(),
        }
    }
}

impl CertificateSubject {
    /// Render as an RFC 4514 distinguished name string.
    pub fn to_rfc4514(&self) -> String {
        // RFC 4514 lists the most specific RDN first
        [
            ("CN", &self.common_name),
            ("OU", &self.organizational_unit),
            ("O", &self.organization),
            ("L", &self.locality),
            ("ST", &self.state),
            ("C", &self.country),
        ]
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{}={}", key, escape_rdn_value(value)))
        .collect::<Vec<_>>()
        .join(",")
    }
}

fn escape_rdn_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Signature engine configuration.
#[derive(Clone)]
pub struct EngineConfig {
    /// Directory holding `private_key.pem`, `public_key.pem` and `certificate.pem`
    pub key_dir: PathBuf,

    /// Passphrase for the private key file. `None` stores the key unencrypted.
    pub passphrase: Option<String>,

    /// RSA modulus size for generated keys
    pub key_bits: usize,

    /// Validity period of the self-signed certificate, counted from issuance
    pub certificate_validity_days: u32,

    /// Certificate subject
    pub certificate_subject: CertificateSubject,

    /// Bytes reserved in the PDF for the embedded signature block
    pub metadata_slot_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("key_dir", &self.key_dir)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .field("key_bits", &self.key_bits)
            .field("certificate_validity_days", &self.certificate_validity_days)
            .field("certificate_subject", &self.certificate_subject)
            .field("metadata_slot_size", &self.metadata_slot_size)
            .finish()
    }
}

impl EngineConfig {
    /// Create new configuration with defaults.
    pub fn new() -> Self {
        Self {
            key_dir: PathBuf::from("keys"),
            passphrase: None,
            key_bits: 2048,
            certificate_validity_days: 1825,
            certificate_subject: CertificateSubject::default(),
            metadata_slot_size: 8192,
        }
    }

    /// Build configuration from defaults overlaid with environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::new();

        if let Some(dir) = get(ENV_KEY_DIR) {
            config.key_dir = PathBuf::from(dir);
        }
        if let Some(passphrase) = get(ENV_PASSPHRASE) {
            config.passphrase = Some(passphrase);
        }
        if let Some(days) = get(ENV_CERT_VALIDITY_DAYS) {
            match days.trim().parse::<u32>() {
                Ok(days) if days > 0 => config.certificate_validity_days = days,
                _ => log::warn!("Ignoring invalid {}={:?}", ENV_CERT_VALIDITY_DAYS, days),
            }
        }

        config
    }

    /// Set the key directory.
    pub fn with_key_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.key_dir = dir.into();
        self
    }

    /// Protect the private key file with a passphrase.
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    /// Set the RSA modulus size for generated keys.
    pub fn with_key_bits(mut self, bits: usize) -> Self {
        self.key_bits = bits;
        self
    }

    /// Set the certificate validity period.
    pub fn with_certificate_validity_days(mut self, days: u32) -> Self {
        self.certificate_validity_days = days;
        self
    }

    /// Set the certificate subject.
    pub fn with_certificate_subject(mut self, subject: CertificateSubject) -> Self {
        self.certificate_subject = subject;
        self
    }

    /// Set the reserved size of the embedded signature block.
    pub fn with_metadata_slot_size(mut self, size: usize) -> Self {
        self.metadata_slot_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.key_dir, PathBuf::from("keys"));
        assert!(config.passphrase.is_none());
        assert_eq!(config.key_bits, 2048);
        assert_eq!(config.certificate_validity_days, 1825);
        assert_eq!(config.metadata_slot_size, 8192);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_KEY_DIR, "/var/lib/seal"),
            (ENV_PASSPHRASE, "s3cret"),
            (ENV_CERT_VALIDITY_DAYS, "30"),
        ]
        .into_iter()
        .collect();

        let config = EngineConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.key_dir, PathBuf::from("/var/lib/seal"));
        assert_eq!(config.passphrase.as_deref(), Some("s3cret"));
        assert_eq!(config.certificate_validity_days, 30);
    }

    #[test]
    fn test_from_lookup_ignores_empty_and_invalid() {
        let vars: HashMap<&str, &str> =
            [(ENV_PASSPHRASE, ""), (ENV_CERT_VALIDITY_DAYS, "soon")].into_iter().collect();

        let config = EngineConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert!(config.passphrase.is_none());
        assert_eq!(config.certificate_validity_days, 1825);
    }

    #[test]
    fn test_debug_redacts_passphrase() {
        let config = EngineConfig::new().with_passphrase("hunter2");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_subject_rfc4514() {
        let subject = CertificateSubject {
            organization: "Acme, Inc".to_string(),
            ..CertificateSubject::default()
        };
        let dn = subject.to_rfc4514();
        assert!(dn.starts_with("CN=pdf-seal.local,"));
        assert!(dn.contains("O=Acme\\, Inc"));
        assert!(dn.ends_with("C=BR"));
    }
}
