//! Signature records and the signing engine.
//!
//! This module provides the two signing schemes used for documents and the
//! byte range helpers used when the signature lives inside the document.
//!
//! ## Schemes
//!
//! - `legacy-pss-over-digest`: RSA-PSS over the hex digest string (`RSA-SHA256`)
//! - `certificate-pkcs1v15-over-content`: RSA PKCS#1 v1.5 over raw content,
//!   bound to the self-signed certificate (`RSA-PKCS1v15-SHA256`)
//!
//! ## Example
//!
//! ```ignore
//! use pdf_seal::hash::ContentInput;
//! use pdf_seal::signatures::SignatureEngine;
//!
//! let engine = SignatureEngine::new(store);
//! let record = engine.sign(ContentInput::Raw(b"hello world"))?;
//! assert!(engine.verify(ContentInput::Raw(b"hello world"), &record));
//!
//! let record = engine.sign_with_certificate(&pdf_bytes)?;
//! assert!(engine.verify_with_certificate(&pdf_bytes, &record));
//! ```

mod byterange;
mod engine;
mod types;

pub use byterange::{ByteRange, ByteRangeCalculator, BYTE_RANGE_FIELD_WIDTH};
pub use engine::SignatureEngine;
pub use types::{CertificateStamp, SignatureRecord, SignatureScheme};
