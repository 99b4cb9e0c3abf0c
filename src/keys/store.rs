//! Key pair and certificate persistence.
//!
//! The store owns one RSA key pair and, optionally, a self-signed certificate
//! over it. Material is generated on first use and loaded thereafter. New files
//! are written to a temporary file in the key directory and moved into place
//! with a no-clobber rename, so when several processes race on first run the
//! first one to land its file wins and the others load it.

use super::certificate::{Certificate, CertificateInfo, CertificateStatus};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tempfile::NamedTempFile;

/// File name of the PKCS#8 private key.
pub const PRIVATE_KEY_FILE: &str = "private_key.pem";
/// File name of the SubjectPublicKeyInfo public key.
pub const PUBLIC_KEY_FILE: &str = "public_key.pem";
/// File name of the self-signed certificate.
pub const CERTIFICATE_FILE: &str = "certificate.pem";

const PUBLIC_EXPONENT: u32 = 65537;
const DIR_MODE: u32 = 0o700;
const PRIVATE_MODE: u32 = 0o600;
const PUBLIC_MODE: u32 = 0o644;

/// An RSA key pair.
#[derive(Clone)]
pub struct KeyMaterial {
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("private_key", &"[REDACTED]")
            .field("bits", &self.public_key.n().bits())
            .finish()
    }
}

impl KeyMaterial {
    fn new(private_key: RsaPrivateKey) -> Self {
        let public_key = RsaPublicKey::from(&private_key);
        Self {
            private_key,
            public_key,
        }
    }

    /// Generate a fresh key pair with exponent 65537.
    pub fn generate(bits: usize) -> Result<Self> {
        let exponent = BigUint::from(PUBLIC_EXPONENT);
        let private_key = RsaPrivateKey::new_with_exp(&mut OsRng, bits, &exponent)?;
        Ok(Self::new(private_key))
    }

    /// The private half.
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    /// The public half.
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// Public key as SubjectPublicKeyInfo PEM.
    pub fn public_key_pem(&self) -> Result<String> {
        self.public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| Error::Crypto(format!("encode public key: {}", e)))
    }

    /// Summary of the public key.
    pub fn info(&self) -> PublicKeyInfo {
        PublicKeyInfo {
            algorithm: "RSA".to_string(),
            key_size: self.public_key.n().bits(),
            modulus: self.public_key.n().to_string(),
            public_exponent: self.public_key.e().to_string(),
        }
    }
}

/// Public key details for display and export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyInfo {
    /// Always `RSA`
    pub algorithm: String,
    /// Modulus size in bits
    pub key_size: usize,
    /// Modulus in decimal
    pub modulus: String,
    /// Public exponent in decimal
    pub public_exponent: String,
}

/// Owner of the deployment's key pair and certificate.
///
/// Construct with [`KeyMaterialStore::open`] and share behind an `Arc`. Each
/// store is independent; two stores over different directories hold
/// different keys.
pub struct KeyMaterialStore {
    config: EngineConfig,
    keys: Mutex<Option<Arc<KeyMaterial>>>,
    certificate: Mutex<Option<Arc<Certificate>>>,
}

impl std::fmt::Debug for KeyMaterialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterialStore")
            .field("key_dir", &self.config.key_dir)
            .finish()
    }
}

impl KeyMaterialStore {
    /// Open a store over the configured key directory, creating it if needed.
    ///
    /// No key material is generated or read here.
    pub fn open(config: EngineConfig) -> Result<Self> {
        let dir = &config.key_dir;
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| {
                Error::KeyMaterialUnavailable(format!(
                    "cannot create key directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
            set_mode(dir, DIR_MODE)?;
            log::info!("Created key directory {}", dir.display());
        }

        Ok(Self {
            config,
            keys: Mutex::new(None),
            certificate: Mutex::new(None),
        })
    }

    /// Drop cached key material. Files on disk are untouched.
    pub fn close(&self) {
        *lock(&self.keys) = None;
        *lock(&self.certificate) = None;
        log::debug!("Closed key store {}", self.config.key_dir.display());
    }

    /// The configuration this store was opened with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The key directory.
    pub fn key_dir(&self) -> &Path {
        &self.config.key_dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.config.key_dir.join(name)
    }

    /// Whether a private key file exists.
    pub fn has_keys(&self) -> bool {
        self.path(PRIVATE_KEY_FILE).exists()
    }

    /// Load the key pair, generating and persisting it on first use.
    pub fn ensure_keys(&self) -> Result<Arc<KeyMaterial>> {
        let mut cached = lock(&self.keys);
        if let Some(keys) = cached.as_ref() {
            return Ok(Arc::clone(keys));
        }

        let keys = if self.has_keys() {
            self.read_keys()?
        } else {
            self.generate_keys()?
        };
        let keys = Arc::new(keys);
        *cached = Some(Arc::clone(&keys));
        Ok(keys)
    }

    /// Load the key pair without generating one.
    pub fn load_keys(&self) -> Result<Arc<KeyMaterial>> {
        let mut cached = lock(&self.keys);
        if let Some(keys) = cached.as_ref() {
            return Ok(Arc::clone(keys));
        }
        if !self.has_keys() {
            return Err(Error::KeyMaterialUnavailable(format!(
                "no key pair in {}",
                self.config.key_dir.display()
            )));
        }

        let keys = Arc::new(self.read_keys()?);
        *cached = Some(Arc::clone(&keys));
        Ok(keys)
    }

    fn generate_keys(&self) -> Result<KeyMaterial> {
        log::info!(
            "Generating {}-bit RSA key pair in {}",
            self.config.key_bits,
            self.config.key_dir.display()
        );
        let keys = KeyMaterial::generate(self.config.key_bits)?;

        let private_pem = match &self.config.passphrase {
            Some(passphrase) => keys.private_key.to_pkcs8_encrypted_pem(
                OsRng,
                passphrase.as_bytes(),
                LineEnding::LF,
            ),
            None => {
                log::warn!("No private key passphrase configured; storing key unencrypted");
                keys.private_key.to_pkcs8_pem(LineEnding::LF)
            },
        }
        .map_err(|e| Error::Crypto(format!("encode private key: {}", e)))?;

        if !write_new(&self.config.key_dir, PRIVATE_KEY_FILE, private_pem.as_bytes(), PRIVATE_MODE)? {
            log::info!("Key pair created concurrently by another writer; loading it");
            return self.read_keys();
        }
        write_new(
            &self.config.key_dir,
            PUBLIC_KEY_FILE,
            keys.public_key_pem()?.as_bytes(),
            PUBLIC_MODE,
        )?;

        log::info!("Key pair generated and stored");
        Ok(keys)
    }

    fn read_keys(&self) -> Result<KeyMaterial> {
        let private_path = self.path(PRIVATE_KEY_FILE);
        let private_pem = fs::read_to_string(&private_path).map_err(|e| {
            Error::KeyMaterialUnavailable(format!("read {}: {}", private_path.display(), e))
        })?;

        let private_key = match &self.config.passphrase {
            Some(passphrase) => {
                RsaPrivateKey::from_pkcs8_encrypted_pem(&private_pem, passphrase.as_bytes())
                    .map_err(|e| {
                        Error::KeyMaterialUnavailable(format!(
                            "cannot decrypt private key (wrong passphrase?): {}",
                            e
                        ))
                    })?
            },
            None => RsaPrivateKey::from_pkcs8_pem(&private_pem).map_err(|e| {
                Error::KeyMaterialUnavailable(format!(
                    "cannot parse private key (encrypted keys need a passphrase): {}",
                    e
                ))
            })?,
        };
        let keys = KeyMaterial::new(private_key);

        let public_path = self.path(PUBLIC_KEY_FILE);
        match fs::read_to_string(&public_path) {
            Ok(public_pem) => {
                let public_key = RsaPublicKey::from_public_key_pem(&public_pem).map_err(|e| {
                    Error::KeyMaterialUnavailable(format!("parse {}: {}", public_path.display(), e))
                })?;
                if public_key != keys.public_key {
                    return Err(Error::KeyMaterialUnavailable(
                        "public key file does not match private key".to_string(),
                    ));
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::warn!("{} missing; rewriting from private key", public_path.display());
                write_new(
                    &self.config.key_dir,
                    PUBLIC_KEY_FILE,
                    keys.public_key_pem()?.as_bytes(),
                    PUBLIC_MODE,
                )?;
            },
            Err(e) => {
                return Err(Error::KeyMaterialUnavailable(format!(
                    "read {}: {}",
                    public_path.display(),
                    e
                )))
            },
        }

        log::debug!("Loaded key pair from {}", self.config.key_dir.display());
        Ok(keys)
    }

    /// Load the certificate, issuing and persisting one on first use.
    pub fn ensure_certificate(&self) -> Result<Arc<Certificate>> {
        let mut cached = lock(&self.certificate);
        if let Some(cert) = cached.as_ref() {
            return Ok(Arc::clone(cert));
        }

        let keys = self.ensure_keys()?;
        let cert = if self.path(CERTIFICATE_FILE).exists() {
            self.read_certificate(&keys)?
        } else {
            self.issue_certificate(&keys)?
        };
        let cert = Arc::new(cert);
        *cached = Some(Arc::clone(&cert));
        Ok(cert)
    }

    /// Load the certificate if one exists. Never issues a new one.
    pub fn load_certificate(&self) -> Result<Option<Arc<Certificate>>> {
        let mut cached = lock(&self.certificate);
        if let Some(cert) = cached.as_ref() {
            return Ok(Some(Arc::clone(cert)));
        }
        if !self.path(CERTIFICATE_FILE).exists() {
            return Ok(None);
        }

        let keys = self.load_keys()?;
        let cert = Arc::new(self.read_certificate(&keys)?);
        *cached = Some(Arc::clone(&cert));
        Ok(Some(cert))
    }

    fn issue_certificate(&self, keys: &KeyMaterial) -> Result<Certificate> {
        log::info!(
            "Issuing self-signed certificate valid for {} days",
            self.config.certificate_validity_days
        );
        let cert = Certificate::issue(
            keys.private_key(),
            &self.config.certificate_subject,
            self.config.certificate_validity_days,
        )?;

        if !write_new(
            &self.config.key_dir,
            CERTIFICATE_FILE,
            cert.to_pem()?.as_bytes(),
            PUBLIC_MODE,
        )? {
            log::info!("Certificate created concurrently by another writer; loading it");
            return self.read_certificate(keys);
        }

        log::info!(
            "Certificate issued: serial {}, fingerprint {}",
            cert.info().serial_number,
            cert.fingerprint()
        );
        Ok(cert)
    }

    fn read_certificate(&self, keys: &KeyMaterial) -> Result<Certificate> {
        let path = self.path(CERTIFICATE_FILE);
        let pem = fs::read_to_string(&path)?;
        let cert = Certificate::from_pem(&pem)?;
        if cert.public_key() != keys.public_key() {
            return Err(Error::KeyMaterialUnavailable(
                "certificate does not certify the current key pair".to_string(),
            ));
        }
        log::debug!("Loaded certificate {}", cert.fingerprint());
        Ok(cert)
    }

    /// Status of the certificate at the current time.
    ///
    /// `Error` when there is no certificate or it cannot be read.
    pub fn certificate_status(&self) -> CertificateStatus {
        match self.load_certificate() {
            Ok(Some(cert)) => cert.status(),
            Ok(None) => CertificateStatus::Error,
            Err(e) => {
                log::debug!("Certificate status unavailable: {}", e);
                CertificateStatus::Error
            },
        }
    }

    /// Details of the current certificate, if any.
    pub fn certificate_info(&self) -> Result<Option<CertificateInfo>> {
        Ok(self.load_certificate()?.map(|cert| cert.info().clone()))
    }

    /// Public key as PEM for third-party verification.
    pub fn export_public_key_pem(&self) -> Result<String> {
        self.ensure_keys()?.public_key_pem()
    }

    /// Summary of the public key.
    pub fn public_key_info(&self) -> Result<PublicKeyInfo> {
        Ok(self.ensure_keys()?.info())
    }

    /// Certificate as PEM.
    pub fn export_certificate_pem(&self) -> Result<String> {
        self.ensure_certificate()?.to_pem()
    }

    /// Certificate as DER.
    pub fn export_certificate_der(&self) -> Result<Vec<u8>> {
        Ok(self.ensure_certificate()?.der().to_vec())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Write `contents` to `dir/name` unless the file already exists.
///
/// Returns `false` when another writer got there first.
fn write_new(dir: &Path, name: &str, contents: &[u8], mode: u32) -> Result<bool> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    set_mode(tmp.path(), mode)?;

    match tmp.persist_noclobber(dir.join(name)) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.error.into()),
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, KeyMaterialStore) {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::new().with_key_dir(dir.path().join("keys"));
        let store = KeyMaterialStore::open(config).unwrap();
        (dir, store)
    }

    #[test]
    fn test_open_creates_directory_without_keys() {
        let (_dir, store) = open_temp();
        assert!(store.key_dir().is_dir());
        assert!(!store.has_keys());
        assert!(matches!(store.load_keys(), Err(Error::KeyMaterialUnavailable(_))));
        assert!(store.load_certificate().unwrap().is_none());
        assert_eq!(store.certificate_status(), CertificateStatus::Error);
    }

    #[cfg(unix)]
    #[test]
    fn test_key_directory_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, store) = open_temp();
        let mode = fs::metadata(store.key_dir()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, DIR_MODE);
    }

    #[test]
    fn test_write_new_does_not_clobber() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_new(dir.path(), "a.txt", b"first", PUBLIC_MODE).unwrap());
        assert!(!write_new(dir.path(), "a.txt", b"second", PUBLIC_MODE).unwrap());
        assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"first");

        // No stray temp files survive
        let count = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_corrupt_private_key_is_unavailable() {
        let (_dir, store) = open_temp();
        fs::write(store.key_dir().join(PRIVATE_KEY_FILE), "garbage").unwrap();
        assert!(matches!(store.ensure_keys(), Err(Error::KeyMaterialUnavailable(_))));
    }

    #[test]
    fn test_debug_hides_passphrase() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::new()
            .with_key_dir(dir.path())
            .with_passphrase("hunter2");
        let store = KeyMaterialStore::open(config).unwrap();
        let debug = format!("{:?}", store);
        assert!(debug.contains("key_dir"));
        assert!(!debug.contains("hunter2"));
    }
}
