//! Document integrity validation.
//!
//! The validator answers two questions about a candidate document: did its
//! bytes change since signing (`hash_match`), and does the signature check
//! out (`digital_signature_valid`). It never fails: every problem found on
//! the way is collected into [`ValidationResult::errors`] and a partial
//! result is returned.
//!
//! A digest mismatch is reported as a possible tamper event. It is never
//! reconciled by re-hashing or re-signing.
//!
//! ## Signature sources
//!
//! - A stored record supplied by the caller covers the complete file.
//! - Without one, the record embedded in the document's metadata is used. It
//!   covers the byte range written next to it, which must span the whole
//!   file except the metadata block itself.
//!
//! ## Strategies
//!
//! Verification runs through [`VerificationStrategy`] implementations,
//! certificate first and legacy second. A record tagged with a scheme is
//! verified by the matching strategy only. An untagged record (written
//! before the tag existed) is tried against each strategy in order.

use crate::audit::{self, AuditAction, AuditEvent};
use crate::error::Result;
use crate::hash::{ContentHasher, ContentInput, Digest};
use crate::keys::CertificateStatus;
use crate::pdf::metadata;
use crate::signatures::{ByteRange, SignatureEngine, SignatureRecord, SignatureScheme};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Error entry added when the document carries no signature at all.
pub const NO_SIGNATURE_METADATA: &str = "no signature metadata found in document";

/// Where the record used for validation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureSource {
    /// Supplied by the caller
    StoredRecord,
    /// Read from the document's metadata
    EmbeddedMetadata,
    /// No record was available
    None,
}

/// Outcome of one validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// `hash_match && digital_signature_valid`
    pub valid: bool,
    /// The recorded digest equals the digest of the covered bytes
    pub hash_match: bool,
    /// The signature verified under the record's scheme
    pub digital_signature_valid: bool,
    /// The certificate strategy verified the signature; advisory only
    pub certificate_signature_valid: bool,
    /// Digest of the complete candidate file
    pub current_hash: Digest,
    /// Digest carried by the record, if any
    pub stored_hash: Option<Digest>,
    /// Digest of the byte-range content when validating embedded metadata
    pub signed_content_hash: Option<Digest>,
    /// Status of the configured certificate at validation time
    pub certificate_status: CertificateStatus,
    /// Origin of `record`
    pub signature_source: SignatureSource,
    /// The record the document was checked against
    pub record: Option<SignatureRecord>,
    /// Every problem found, in the order found; advisory entries included
    pub errors: Vec<String>,
}

impl ValidationResult {
    fn new(current_hash: Digest, certificate_status: CertificateStatus) -> Self {
        Self {
            valid: false,
            hash_match: false,
            digital_signature_valid: false,
            certificate_signature_valid: false,
            current_hash,
            stored_hash: None,
            signed_content_hash: None,
            certificate_status,
            signature_source: SignatureSource::None,
            record: None,
            errors: Vec::new(),
        }
    }
}

/// Content handed to a verification strategy.
#[derive(Debug, Clone, Copy)]
pub struct VerificationInput<'a> {
    /// Bytes the record claims to cover
    pub content: &'a [u8],
    /// Digest of `content`, computed once
    pub digest: &'a Digest,
}

/// One way of checking a record's signature.
pub trait VerificationStrategy: Send + Sync {
    /// Short name used in error entries.
    fn name(&self) -> &'static str;

    /// Scheme this strategy verifies.
    fn scheme(&self) -> SignatureScheme;

    /// Check `record` against `input`.
    fn check(
        &self,
        engine: &SignatureEngine,
        input: VerificationInput<'_>,
        record: &SignatureRecord,
    ) -> Result<()>;
}

/// PKCS#1 v1.5 over the raw content, bound to the current certificate.
#[derive(Debug, Clone, Copy, Default)]
pub struct CertificateStrategy;

impl VerificationStrategy for CertificateStrategy {
    fn name(&self) -> &'static str {
        "certificate"
    }

    fn scheme(&self) -> SignatureScheme {
        SignatureScheme::CertificatePkcs1v15OverContent
    }

    fn check(
        &self,
        engine: &SignatureEngine,
        input: VerificationInput<'_>,
        record: &SignatureRecord,
    ) -> Result<()> {
        engine.check_with_certificate(input.content, record)
    }
}

/// RSA-PSS over the digest string.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyStrategy;

impl VerificationStrategy for LegacyStrategy {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn scheme(&self) -> SignatureScheme {
        SignatureScheme::LegacyPssOverDigest
    }

    fn check(
        &self,
        engine: &SignatureEngine,
        input: VerificationInput<'_>,
        record: &SignatureRecord,
    ) -> Result<()> {
        // The digest is already known; signing reused it the same way
        engine.check(ContentInput::Digest(input.digest), record)
    }
}

/// Validates documents against stored or embedded signature records.
pub struct IntegrityValidator {
    engine: SignatureEngine,
    strategies: Vec<Box<dyn VerificationStrategy>>,
}

impl std::fmt::Debug for IntegrityValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("IntegrityValidator")
            .field("engine", &self.engine)
            .field("strategies", &names)
            .finish()
    }
}

impl IntegrityValidator {
    /// Create a validator with the certificate and legacy strategies.
    pub fn new(engine: SignatureEngine) -> Self {
        Self {
            engine,
            strategies: vec![Box::new(CertificateStrategy), Box::new(LegacyStrategy)],
        }
    }

    /// Replace the strategy list. Order matters for untagged records.
    pub fn with_strategies(mut self, strategies: Vec<Box<dyn VerificationStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    /// The signing engine.
    pub fn engine(&self) -> &SignatureEngine {
        &self.engine
    }

    /// Validate document bytes.
    ///
    /// With `stored`, the record is checked against the complete file.
    /// Without it, the embedded metadata is used.
    pub fn validate(&self, pdf: &[u8], stored: Option<&SignatureRecord>) -> ValidationResult {
        let mut result =
            ValidationResult::new(ContentHasher::digest(pdf), self.engine.store().certificate_status());

        match stored {
            Some(record) => self.validate_stored(pdf, record, &mut result),
            None => self.validate_embedded(pdf, &mut result),
        }

        result.valid = result.hash_match && result.digital_signature_valid;
        self.audit(&result);
        result
    }

    /// Validate a file on disk.
    ///
    /// Fails only if the file cannot be read.
    pub fn validate_file(
        &self,
        path: impl AsRef<Path>,
        stored: Option<&SignatureRecord>,
    ) -> Result<ValidationResult> {
        let pdf = std::fs::read(path.as_ref())?;
        Ok(self.validate(&pdf, stored))
    }

    fn validate_stored(&self, pdf: &[u8], record: &SignatureRecord, result: &mut ValidationResult) {
        result.signature_source = SignatureSource::StoredRecord;
        result.stored_hash = Some(record.hash.clone());
        result.record = Some(record.clone());
        result.hash_match = result.current_hash == record.hash;

        if !result.hash_match {
            log::warn!(
                "Possible tampering: stored hash {} does not match current hash {}",
                record.hash.short(),
                result.current_hash.short()
            );
            result.errors.push(format!(
                "document hash mismatch: stored {}, current {}",
                record.hash, result.current_hash
            ));
        }

        let digest = result.current_hash.clone();
        let input = VerificationInput {
            content: pdf,
            digest: &digest,
        };
        self.verify_signature(input, record, result);
    }

    fn validate_embedded(&self, pdf: &[u8], result: &mut ValidationResult) {
        let embedded = match metadata::extract(pdf) {
            Ok(Some(embedded)) => embedded,
            Ok(None) => {
                result.errors.push(NO_SIGNATURE_METADATA.to_string());
                return;
            },
            Err(e) => {
                result.errors.push(e.to_string());
                return;
            },
        };

        let record = embedded.record;
        result.signature_source = SignatureSource::EmbeddedMetadata;
        result.stored_hash = Some(record.hash.clone());
        result.record = Some(record.clone());

        let range_ok = self.check_byte_range(&embedded.byte_range, pdf.len(), result);

        let content = match embedded.byte_range.signed_bytes(pdf) {
            Ok(content) => content,
            Err(e) => {
                result.errors.push(e.to_string());
                return;
            },
        };
        let signed_digest = ContentHasher::digest(&content);
        result.hash_match = range_ok && signed_digest == record.hash;
        if signed_digest != record.hash {
            log::warn!(
                "Possible tampering: embedded hash {} does not match signed content {}",
                record.hash.short(),
                signed_digest.short()
            );
            result.errors.push(format!(
                "signed content hash mismatch: embedded {}, current {}",
                record.hash, signed_digest
            ));
        }

        let input = VerificationInput {
            content: &content,
            digest: &signed_digest,
        };
        self.verify_signature(input, &record, result);
        result.signed_content_hash = Some(signed_digest);
    }

    /// The embedded byte range must span the whole file except the metadata block.
    fn check_byte_range(&self, range: &ByteRange, file_size: usize, result: &mut ValidationResult) -> bool {
        match range.validate(file_size) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Possible tampering: signed byte range {} does not span the file: {}", range, e);
                result
                    .errors
                    .push(format!("signed byte range does not cover the document: {}", e));
                false
            },
        }
    }

    fn verify_signature(
        &self,
        input: VerificationInput<'_>,
        record: &SignatureRecord,
        result: &mut ValidationResult,
    ) {
        let mut failures = Vec::new();

        for strategy in &self.strategies {
            if matches!(record.scheme, Some(scheme) if scheme != strategy.scheme()) {
                continue;
            }
            match strategy.check(&self.engine, input, record) {
                Ok(()) => {
                    result.digital_signature_valid = true;
                    if strategy.scheme() == SignatureScheme::CertificatePkcs1v15OverContent {
                        result.certificate_signature_valid = true;
                    }
                    break;
                },
                Err(e) => {
                    log::debug!("{} verification failed: {}", strategy.name(), e);
                    failures.push(format!("{} signature verification failed: {}", strategy.name(), e));
                },
            }
        }

        if !result.digital_signature_valid {
            if failures.is_empty() {
                failures.push("no verification strategy accepts this record".to_string());
            }
            result.errors.extend(failures);
        }

        let certificate_bound = record.scheme
            == Some(SignatureScheme::CertificatePkcs1v15OverContent)
            || record.certificate.is_some();
        if certificate_bound && result.certificate_status != CertificateStatus::Valid {
            result.errors.push(format!(
                "certificate status is {} at validation time",
                result.certificate_status
            ));
        }
    }

    fn audit(&self, result: &ValidationResult) {
        let status = if result.valid { "valid" } else { "invalid" };
        let event = AuditEvent::new(AuditAction::Validation, status)
            .with_document_id(result.current_hash.as_str())
            .with_details(serde_json::json!({
                "hash_match": result.hash_match,
                "digital_signature_valid": result.digital_signature_valid,
                "certificate_signature_valid": result.certificate_signature_valid,
                "signature_source": result.signature_source,
                "errors": result.errors.len(),
            }));
        audit::record(&event);
    }
}
