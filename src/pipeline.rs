//! One-call sealing: stamp, embed, hash, sign.
//!
//! Sealing runs every step over the exact bytes produced by the step before
//! it, so the digest that ends up in the returned record is always the
//! digest of the returned document:
//!
//! 1. Stamp every page.
//! 2. Append signature metadata with an empty reserved block.
//! 3. Sign the bytes covered by the metadata byte range (embedded record).
//! 4. Fill the block. The file length is unchanged, so the covered bytes and
//!    their digest stay as signed.
//! 5. Sign the complete final file (external record).
//!
//! ## Example
//!
//! ```ignore
//! use pdf_seal::pipeline::SealingPipeline;
//! use pdf_seal::signatures::SignatureScheme;
//!
//! let pipeline = SealingPipeline::new(engine);
//! let sealed = pipeline.seal(&source, &stamp, SignatureScheme::CertificatePkcs1v15OverContent)?;
//! std::fs::write("signed.pdf", &sealed.bytes)?;
//! store_record(&sealed.record.to_json()?);
//! ```

use crate::audit::{self, AuditAction, AuditEvent};
use crate::error::Result;
use crate::pdf::{metadata, MetadataEmbedder, PageStamper, SignatureStamp, Stamper};
use crate::signatures::{ByteRange, SignatureEngine, SignatureRecord, SignatureScheme};
use chrono::Utc;

/// Output of [`SealingPipeline::seal`].
#[derive(Debug, Clone)]
pub struct SealedDocument {
    /// Final document bytes
    pub bytes: Vec<u8>,
    /// Record over the complete final file, for the caller to persist
    pub record: SignatureRecord,
    /// Record embedded in the document, over `byte_range`
    pub embedded: SignatureRecord,
    /// Bytes covered by the embedded record
    pub byte_range: ByteRange,
}

/// Runs the sealing steps in their required order.
pub struct SealingPipeline {
    engine: SignatureEngine,
    embedder: MetadataEmbedder,
    stamper: Box<dyn Stamper>,
}

impl std::fmt::Debug for SealingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealingPipeline")
            .field("engine", &self.engine)
            .field("embedder", &self.embedder)
            .finish_non_exhaustive()
    }
}

impl SealingPipeline {
    /// Create a pipeline with the built-in page stamper.
    ///
    /// The metadata block size comes from the engine's configuration.
    pub fn new(engine: SignatureEngine) -> Self {
        let slot_size = engine.store().config().metadata_slot_size;
        Self {
            engine,
            embedder: MetadataEmbedder::new(slot_size),
            stamper: Box::new(PageStamper::new()),
        }
    }

    /// Replace the stamper.
    pub fn with_stamper(mut self, stamper: impl Stamper + 'static) -> Self {
        self.stamper = Box::new(stamper);
        self
    }

    /// The signing engine.
    pub fn engine(&self) -> &SignatureEngine {
        &self.engine
    }

    /// Stamp, embed and sign `source` under `scheme`.
    ///
    /// Fails without producing output if any step fails; there is no
    /// partially sealed result.
    pub fn seal(
        &self,
        source: &[u8],
        stamp: &SignatureStamp,
        scheme: SignatureScheme,
    ) -> Result<SealedDocument> {
        let result = self.seal_inner(source, stamp, scheme);

        let event = match &result {
            Ok(sealed) => AuditEvent::new(AuditAction::Signature, "success")
                .with_document_id(sealed.record.hash.as_str())
                .with_details(serde_json::json!({
                    "scheme": scheme.as_str(),
                    "algorithm": sealed.record.algorithm,
                    "byte_range": sealed.byte_range.to_string(),
                    "size": sealed.bytes.len(),
                })),
            Err(e) => AuditEvent::new(AuditAction::Signature, "failure").with_details(
                serde_json::json!({ "scheme": scheme.as_str(), "error": e.to_string() }),
            ),
        };
        audit::record(&event);

        result
    }

    fn seal_inner(
        &self,
        source: &[u8],
        stamp: &SignatureStamp,
        scheme: SignatureScheme,
    ) -> Result<SealedDocument> {
        let timestamp = Utc::now();

        metadata::ensure_sealable(source)?;
        let stamped = self.stamper.stamp(source, stamp)?;
        let prepared = self
            .embedder
            .prepare(&stamped, timestamp, scheme.algorithm())?;
        let byte_range = prepared.byte_range();

        let embedded =
            self.engine
                .sign_with_scheme(scheme, &prepared.signed_content()?, timestamp)?;
        let bytes = prepared.fill(&embedded)?;
        let record = self.engine.sign_with_scheme(scheme, &bytes, timestamp)?;

        log::info!(
            "Sealed document {} ({} bytes, {})",
            record.hash.short(),
            bytes.len(),
            scheme
        );

        Ok(SealedDocument {
            bytes,
            record,
            embedded,
            byte_range,
        })
    }
}
