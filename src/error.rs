//! Error types for the signature engine.
//!
//! Key material failures are hard errors for every signing path. Verification
//! failures are surfaced as values so the validator can collect them and keep
//! going with the next strategy.

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while signing or validating documents.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Key files missing, corrupt, mismatched, or locked with a different passphrase
    #[error("Key material unavailable: {0}")]
    KeyMaterialUnavailable(String),

    /// Freshly computed digest differs from the recorded one
    #[error("Digest mismatch: expected {expected}, found {actual}")]
    DigestMismatch {
        /// Digest carried by the signature record
        expected: String,
        /// Digest computed from the content
        actual: String,
    },

    /// Cryptographic signature verification failed
    #[error("Signature invalid: {0}")]
    SignatureInvalid(String),

    /// Certificate outside its validity window
    #[error("Certificate expired or not yet valid: {0}")]
    CertificateExpiredOrNotYetValid(String),

    /// Embedded signature metadata is malformed or unreadable
    #[error("Metadata extraction failed: {0}")]
    MetadataExtractionFailed(String),

    /// Text that should be a 64-character lowercase hex digest
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    /// Invalid PDF structure
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// Unsupported feature
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// Certificate could not be issued, encoded or parsed
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// Low-level failure inside the RSA implementation
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Signature field is not valid base64
    #[error("Base64 decoding error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Stamp image could not be decoded
    #[error("Image error: {0}")]
    Image(String),

    /// Unknown signer or illegal signer state transition
    #[error("Invalid signer operation: {0}")]
    InvalidSigner(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        Error::InvalidPdf(err.to_string())
    }
}

impl From<rsa::Error> for Error {
    fn from(err: rsa::Error) -> Self {
        Error::Crypto(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}
