//! # PDF Seal
//!
//! Document integrity and digital signatures for PDF files.
//!
//! ## Core Features
//!
//! - **Key lifecycle**: one RSA-2048 key pair and a self-signed certificate per
//!   key directory, generated on first use with single-writer-wins semantics
//! - **Content hashing**: streaming SHA-256 over exact bytes or a signature byte range
//! - **Two signing schemes**: RSA-PSS over the digest string (legacy) and
//!   PKCS#1 v1.5 over the raw content, bound to the certificate
//! - **Sealing pipeline**: visual stamp, metadata embedding, hashing and signing
//!   as one call, so the persisted digest always matches the distributed bytes
//! - **Validation**: tamper detection against a stored record or the record
//!   embedded in the document, with every problem collected instead of thrown
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use pdf_seal::{EngineConfig, IntegrityValidator, KeyMaterialStore, SealingPipeline};
//! use pdf_seal::pdf::SignatureStamp;
//! use pdf_seal::signatures::{SignatureEngine, SignatureScheme};
//!
//! # fn main() -> pdf_seal::Result<()> {
//! let store = Arc::new(KeyMaterialStore::open(EngineConfig::from_env())?);
//! let engine = SignatureEngine::new(store);
//!
//! let source = std::fs::read("contract.pdf")?;
//! let stamp = SignatureStamp::new(
//!     vec!["Name: Jane Doe".into()],
//!     chrono::Local::now().naive_local(),
//! );
//! let sealed = SealingPipeline::new(engine.clone())
//!     .seal(&source, &stamp, SignatureScheme::CertificatePkcs1v15OverContent)?;
//!
//! let result = IntegrityValidator::new(engine).validate(&sealed.bytes, Some(&sealed.record));
//! assert!(result.valid);
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod config;
pub mod error;
pub mod hash;
pub mod keys;
pub mod pdf;
pub mod pipeline;
pub mod signatures;
pub mod signers;
pub mod validator;

pub use config::{CertificateSubject, EngineConfig};
pub use error::{Error, Result};
pub use hash::{ContentHasher, ContentInput, Digest};
pub use keys::{Certificate, CertificateInfo, CertificateStatus, KeyMaterialStore};
pub use pipeline::{SealedDocument, SealingPipeline};
pub use signatures::{SignatureEngine, SignatureRecord, SignatureScheme};
pub use signers::{SignerSet, SignerStatus, SigningStatus};
pub use validator::{IntegrityValidator, SignatureSource, ValidationResult, VerificationStrategy};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
