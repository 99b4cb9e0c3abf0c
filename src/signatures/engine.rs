//! Signing and verification for both record schemes.
//!
//! - **Legacy**: RSA-PSS with MGF1/SHA-256 and the largest salt the key
//!   allows, computed over the UTF-8 bytes of the hex digest string.
//! - **Certificate**: RSA PKCS#1 v1.5 with SHA-256 over the raw content. The
//!   record also carries the content digest and the identity of the
//!   certificate that was current at signing time.
//!
//! The two schemes are not interchangeable. A record produced by one fails
//! verification under the other.

use super::types::{CertificateStamp, SignatureRecord, SignatureScheme};
use crate::error::{Error, Result};
use crate::hash::{ContentHasher, ContentInput, Digest};
use crate::keys::{CertificateStatus, KeyMaterialStore};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rsa::pkcs1v15::{Signature as Pkcs1v15Signature, SigningKey, VerifyingKey};
use rsa::traits::PublicKeyParts;
use rsa::{Pss, RsaPublicKey};
use sha2::{Digest as _, Sha256};
use signature::{DigestSigner, DigestVerifier, SignatureEncoding};
use std::sync::Arc;

/// SHA-256 output length in bytes.
const HASH_LEN: usize = 32;

/// Signs content and verifies signature records with the store's keys.
#[derive(Debug, Clone)]
pub struct SignatureEngine {
    store: Arc<KeyMaterialStore>,
}

impl SignatureEngine {
    /// Create an engine over a key store.
    pub fn new(store: Arc<KeyMaterialStore>) -> Self {
        Self { store }
    }

    /// The key store backing this engine.
    pub fn store(&self) -> &Arc<KeyMaterialStore> {
        &self.store
    }

    /// Sign with the legacy scheme at the current time.
    ///
    /// A [`ContentInput::Digest`] is signed as-is; raw content is hashed first.
    pub fn sign(&self, input: ContentInput<'_>) -> Result<SignatureRecord> {
        self.sign_legacy(&input.resolve(), Utc::now())
    }

    /// Verify a legacy record, reporting why it failed.
    ///
    /// The digest is resolved from `input` exactly as [`sign`](Self::sign)
    /// resolves it, compared with the record, and the PSS signature is checked
    /// over the digest string.
    pub fn check(&self, input: ContentInput<'_>, record: &SignatureRecord) -> Result<()> {
        let keys = self.store.load_keys()?;
        let digest = input.resolve();
        ensure_digest(&record.hash, &digest)?;

        let signature = record.signature_bytes()?;
        let hashed = Sha256::digest(digest.as_str().as_bytes());
        keys.public_key()
            .verify(pss_padding(keys.public_key()), &hashed, &signature)
            .map_err(|e| Error::SignatureInvalid(format!("PSS verification failed: {}", e)))
    }

    /// Verify a legacy record.
    pub fn verify(&self, input: ContentInput<'_>, record: &SignatureRecord) -> bool {
        match self.check(input, record) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("Legacy verification failed: {}", e);
                false
            },
        }
    }

    /// Sign raw content with the certificate scheme at the current time.
    pub fn sign_with_certificate(&self, content: &[u8]) -> Result<SignatureRecord> {
        self.sign_certificate(content, Utc::now())
    }

    /// Verify a certificate-scheme record, reporting why it failed.
    ///
    /// Checks the PKCS#1 v1.5 signature over `content` against the current
    /// certificate's key, that the recorded digest matches `content`, and that
    /// the recorded certificate fingerprint (when present) is the current one.
    pub fn check_with_certificate(&self, content: &[u8], record: &SignatureRecord) -> Result<()> {
        let cert = self
            .store
            .load_certificate()?
            .ok_or_else(|| Error::Certificate("no certificate configured".to_string()))?;

        if let Some(expected) = record.certificate_fingerprint() {
            if expected != cert.fingerprint() {
                return Err(Error::SignatureInvalid(format!(
                    "record was signed under certificate {}, current certificate is {}",
                    expected,
                    cert.fingerprint()
                )));
            }
        }

        let signature = Pkcs1v15Signature::try_from(record.signature_bytes()?.as_slice())
            .map_err(|e| Error::SignatureInvalid(format!("malformed signature: {}", e)))?;
        let verifying_key = VerifyingKey::<Sha256>::new(cert.public_key().clone());
        let hasher = Sha256::new_with_prefix(content);
        let digest = Digest::from_bytes(&hasher.clone().finalize());

        verifying_key
            .verify_digest(hasher, &signature)
            .map_err(|e| Error::SignatureInvalid(format!("PKCS#1 v1.5 verification failed: {}", e)))?;
        ensure_digest(&record.hash, &digest)
    }

    /// Verify a certificate-scheme record.
    pub fn verify_with_certificate(&self, content: &[u8], record: &SignatureRecord) -> bool {
        match self.check_with_certificate(content, record) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("Certificate verification failed: {}", e);
                false
            },
        }
    }

    /// Sign raw content with the given scheme and a caller-chosen timestamp.
    pub fn sign_with_scheme(
        &self,
        scheme: SignatureScheme,
        content: &[u8],
        timestamp: DateTime<Utc>,
    ) -> Result<SignatureRecord> {
        match scheme {
            SignatureScheme::LegacyPssOverDigest => {
                self.sign_legacy(&ContentHasher::digest(content), timestamp)
            },
            SignatureScheme::CertificatePkcs1v15OverContent => {
                self.sign_certificate(content, timestamp)
            },
        }
    }

    fn sign_legacy(&self, digest: &Digest, timestamp: DateTime<Utc>) -> Result<SignatureRecord> {
        let keys = self.store.ensure_keys()?;
        let hashed = Sha256::digest(digest.as_str().as_bytes());
        let signature =
            keys.private_key()
                .sign_with_rng(&mut OsRng, pss_padding(keys.public_key()), &hashed)?;

        log::debug!("Signed digest {} (legacy)", digest.short());
        Ok(SignatureRecord::new(
            SignatureScheme::LegacyPssOverDigest,
            digest.clone(),
            &signature,
            timestamp,
            None,
        ))
    }

    fn sign_certificate(&self, content: &[u8], timestamp: DateTime<Utc>) -> Result<SignatureRecord> {
        let cert = self.store.ensure_certificate()?;
        let (status, message) = cert.info().status_message(Utc::now());
        if status != CertificateStatus::Valid {
            return Err(Error::CertificateExpiredOrNotYetValid(message));
        }

        let keys = self.store.ensure_keys()?;
        let signing_key = SigningKey::<Sha256>::new(keys.private_key().clone());
        let hasher = Sha256::new_with_prefix(content);
        let digest = Digest::from_bytes(&hasher.clone().finalize());
        let signature: Pkcs1v15Signature = signing_key
            .try_sign_digest(hasher)
            .map_err(|e| Error::Crypto(format!("PKCS#1 v1.5 signing failed: {}", e)))?;

        log::debug!("Signed content {} (certificate {})", digest.short(), cert.fingerprint());
        Ok(SignatureRecord::new(
            SignatureScheme::CertificatePkcs1v15OverContent,
            digest,
            &signature.to_bytes(),
            timestamp,
            Some(CertificateStamp::from(cert.as_ref())),
        ))
    }
}

/// PSS padding with the maximal salt: `emLen - hLen - 2`.
fn pss_padding(public_key: &RsaPublicKey) -> Pss {
    let em_len = (public_key.n().bits() + 6) / 8;
    Pss::new_with_salt::<Sha256>(em_len.saturating_sub(HASH_LEN + 2))
}

fn ensure_digest(expected: &Digest, actual: &Digest) -> Result<()> {
    if expected != actual {
        return Err(Error::DigestMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}
