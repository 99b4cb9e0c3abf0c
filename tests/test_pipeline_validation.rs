//! End-to-end sealing and validation.
//!
//! Covers:
//! - Sealed documents validate against the stored record (both schemes)
//! - A flipped body byte is reported as tampering
//! - Documents without any signature metadata
//! - Validation from embedded metadata alone
//! - Bytes appended after sealing
//! - Encrypted input is refused before any page is stamped

mod common;

use common::{body_offset, encrypted_pdf, sample_stamp, shared_engine, synthetic_pdf};
use pdf_seal::hash::ContentHasher;
use pdf_seal::pdf::{metadata, SignatureStamp, Stamper};
use pdf_seal::validator::NO_SIGNATURE_METADATA;
use pdf_seal::{
    CertificateStatus, Error, IntegrityValidator, SealingPipeline, SignatureScheme,
    SignatureSource,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn seal(scheme: SignatureScheme) -> pdf_seal::SealedDocument {
    SealingPipeline::new(shared_engine())
        .seal(&synthetic_pdf(2), &sample_stamp(), scheme)
        .unwrap()
}

fn validator() -> IntegrityValidator {
    IntegrityValidator::new(shared_engine())
}

#[test]
fn test_sealed_digests_bind_final_bytes() {
    for scheme in [
        SignatureScheme::LegacyPssOverDigest,
        SignatureScheme::CertificatePkcs1v15OverContent,
    ] {
        let sealed = seal(scheme);

        assert_eq!(sealed.record.hash, ContentHasher::digest(&sealed.bytes));
        assert_eq!(
            sealed.embedded.hash,
            ContentHasher::digest_ranges(&sealed.bytes, &sealed.byte_range).unwrap()
        );
        assert_eq!(sealed.record.timestamp, sealed.embedded.timestamp);

        // The file's own metadata reports the embedded record
        let embedded = metadata::extract(&sealed.bytes).unwrap().unwrap();
        assert_eq!(embedded.record, sealed.embedded);
        assert_eq!(embedded.algorithm, scheme.algorithm());
    }
}

#[test]
fn test_stored_record_validates() {
    let sealed = seal(SignatureScheme::LegacyPssOverDigest);
    let result = validator().validate(&sealed.bytes, Some(&sealed.record));

    assert!(result.valid, "{:?}", result.errors);
    assert!(result.hash_match);
    assert!(result.digital_signature_valid);
    assert!(!result.certificate_signature_valid);
    assert_eq!(result.signature_source, SignatureSource::StoredRecord);
    assert_eq!(result.stored_hash.as_ref(), Some(&sealed.record.hash));
}

#[test]
fn test_certificate_record_validates() {
    let sealed = seal(SignatureScheme::CertificatePkcs1v15OverContent);
    let result = validator().validate(&sealed.bytes, Some(&sealed.record));

    assert!(result.valid, "{:?}", result.errors);
    assert!(result.certificate_signature_valid);
    assert_eq!(result.certificate_status, CertificateStatus::Valid);
    assert!(result.errors.is_empty());
}

#[test]
fn test_flipped_byte_is_tampering() {
    let sealed = seal(SignatureScheme::LegacyPssOverDigest);
    let mut tampered = sealed.bytes.clone();
    let offset = body_offset(&tampered);
    tampered[offset] ^= 0x01;

    let result = validator().validate(&tampered, Some(&sealed.record));
    assert!(!result.valid);
    assert!(!result.hash_match);
    assert_ne!(result.current_hash, sealed.record.hash);
    assert!(!result.errors.is_empty());

    // Embedded metadata catches it too
    let result = validator().validate(&tampered, None);
    assert!(!result.valid);
    assert!(!result.hash_match);
    assert_eq!(result.signature_source, SignatureSource::EmbeddedMetadata);
}

#[test]
fn test_missing_metadata() {
    let pdf = synthetic_pdf(1);
    let result = validator().validate(&pdf, None);

    assert!(!result.valid);
    assert_eq!(result.signature_source, SignatureSource::None);
    assert!(result.record.is_none());
    assert_eq!(result.errors, vec![NO_SIGNATURE_METADATA.to_string()]);
}

#[test]
fn test_embedded_metadata_only() {
    for scheme in [
        SignatureScheme::LegacyPssOverDigest,
        SignatureScheme::CertificatePkcs1v15OverContent,
    ] {
        let sealed = seal(scheme);
        let result = validator().validate(&sealed.bytes, None);

        assert!(result.valid, "{:?}: {:?}", scheme, result.errors);
        assert_eq!(result.signature_source, SignatureSource::EmbeddedMetadata);
        assert_eq!(result.signed_content_hash.as_ref(), Some(&sealed.embedded.hash));
        assert_eq!(result.record.as_ref(), Some(&sealed.embedded));
    }
}

#[test]
fn test_appended_bytes_after_sealing() {
    let sealed = seal(SignatureScheme::LegacyPssOverDigest);
    let mut extended = sealed.bytes.clone();
    extended.extend_from_slice(b"\n% trailing data\n");

    let result = validator().validate(&extended, None);
    assert!(!result.valid);
    assert!(!result.hash_match);
    assert!(!result.errors.is_empty());
}

#[test]
fn test_validate_file_matches_in_memory() {
    let sealed = seal(SignatureScheme::LegacyPssOverDigest);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sealed.pdf");
    std::fs::write(&path, &sealed.bytes).unwrap();

    let result = validator().validate_file(&path, Some(&sealed.record)).unwrap();
    assert!(result.valid);
    assert_eq!(result.current_hash, sealed.record.hash);
    assert_eq!(result, validator().validate(&sealed.bytes, Some(&sealed.record)));

    let embedded = validator().validate_file(&path, None).unwrap();
    assert!(embedded.valid, "{:?}", embedded.errors);
    assert_eq!(embedded.signature_source, SignatureSource::EmbeddedMetadata);

    assert!(validator().validate_file(dir.path().join("missing.pdf"), None).is_err());
}

#[test]
fn test_pipeline_rejects_non_pdf() {
    let result = SealingPipeline::new(shared_engine()).seal(
        b"definitely not a pdf",
        &sample_stamp(),
        SignatureScheme::LegacyPssOverDigest,
    );
    assert!(result.is_err());
}

/// Passes documents through unchanged and counts calls.
struct CountingStamper(Arc<AtomicUsize>);

impl Stamper for CountingStamper {
    fn stamp(&self, pdf: &[u8], _stamp: &SignatureStamp) -> pdf_seal::Result<Vec<u8>> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(pdf.to_vec())
    }
}

#[test]
fn test_pipeline_rejects_encrypted_before_stamping() {
    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline =
        SealingPipeline::new(shared_engine()).with_stamper(CountingStamper(calls.clone()));

    let err = pipeline
        .seal(&encrypted_pdf(), &sample_stamp(), SignatureScheme::LegacyPssOverDigest)
        .unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    pipeline
        .seal(&synthetic_pdf(1), &sample_stamp(), SignatureScheme::LegacyPssOverDigest)
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
