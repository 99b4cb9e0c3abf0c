//! Content hashing.
//!
//! Every digest in the engine is SHA-256 over the literal bytes, encoded as
//! 64 lowercase hex characters. No normalization is applied to the input.
//!
//! ## Example
//!
//! ```ignore
//! use pdf_seal::hash::{ContentHasher, Digest};
//!
//! let digest = ContentHasher::digest(b"hello world");
//! assert_eq!(digest.as_str().len(), 64);
//!
//! let parsed = Digest::parse(digest.as_str())?;
//! assert_eq!(parsed, digest);
//! ```

use crate::error::{Error, Result};
use crate::signatures::ByteRange;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Read buffer used when hashing readers and files.
const CHUNK_SIZE: usize = 8192;

/// Length of a hex-encoded SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// A SHA-256 digest in canonical lowercase hex form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    /// Parse a digest, accepting only 64 lowercase hex characters.
    pub fn parse(text: &str) -> Result<Self> {
        if text.len() != DIGEST_HEX_LEN {
            return Err(Error::InvalidDigest(format!(
                "expected {} hex characters, got {}",
                DIGEST_HEX_LEN,
                text.len()
            )));
        }
        if !text.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(Error::InvalidDigest(format!("not lowercase hex: {}", text)));
        }
        Ok(Self(text.to_string()))
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes_to_hex(bytes))
    }

    /// The hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> &str {
        &self.0[..16]
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Digest {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Digest::parse(&value)
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.0
    }
}

impl std::str::FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Digest::parse(s)
    }
}

/// Input to the legacy signing scheme.
///
/// Callers that already hold the digest of their content pass it as
/// `Digest` and it is used as-is; anything else is hashed first.
#[derive(Debug, Clone, Copy)]
pub enum ContentInput<'a> {
    /// Raw content, hashed before use
    Raw(&'a [u8]),
    /// Digest computed earlier over the content
    Digest(&'a Digest),
}

impl ContentInput<'_> {
    /// Resolve to the digest this input stands for.
    pub fn resolve(&self) -> Digest {
        match self {
            ContentInput::Raw(bytes) => ContentHasher::digest(bytes),
            ContentInput::Digest(digest) => (*digest).clone(),
        }
    }
}

impl<'a> From<&'a [u8]> for ContentInput<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        ContentInput::Raw(bytes)
    }
}

impl<'a> From<&'a Digest> for ContentInput<'a> {
    fn from(digest: &'a Digest) -> Self {
        ContentInput::Digest(digest)
    }
}

/// SHA-256 hasher for in-memory content, readers, files and byte ranges.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentHasher;

impl ContentHasher {
    /// Digest of an in-memory byte slice.
    pub fn digest(bytes: &[u8]) -> Digest {
        let mut hasher = Sha256::new();
        for chunk in bytes.chunks(CHUNK_SIZE) {
            hasher.update(chunk);
        }
        Digest::from_bytes(&hasher.finalize())
    }

    /// Digest of everything a reader yields, read in fixed-size chunks.
    pub fn digest_reader<R: Read>(mut reader: R) -> Result<Digest> {
        let mut hasher = Sha256::new();
        let mut buf = [0u8; CHUNK_SIZE];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Digest::from_bytes(&hasher.finalize()))
    }

    /// Digest of a file on disk.
    pub fn digest_file(path: impl AsRef<Path>) -> Result<Digest> {
        let file = File::open(path.as_ref())?;
        Self::digest_reader(file)
    }

    /// Digest of the two segments named by a byte range, without concatenating them.
    pub fn digest_ranges(bytes: &[u8], range: &ByteRange) -> Result<Digest> {
        let (first, second) = range.segments(bytes)?;
        let mut hasher = Sha256::new();
        hasher.update(first);
        hasher.update(second);
        Ok(Digest::from_bytes(&hasher.finalize()))
    }
}

/// Convert bytes to a lowercase hex string.
pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    const HEX_CHARS: &[u8] = b"0123456789abcdef";
    let mut hex = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        hex.push(HEX_CHARS[(byte >> 4) as usize] as char);
        hex.push(HEX_CHARS[(byte & 0x0F) as usize] as char);
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HELLO_WORLD: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
    const EMPTY: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_known_digests() {
        assert_eq!(ContentHasher::digest(b"hello world").as_str(), HELLO_WORLD);
        assert_eq!(ContentHasher::digest(b"").as_str(), EMPTY);
    }

    #[test]
    fn test_digest_is_of_literal_bytes() {
        assert_ne!(ContentHasher::digest(b"hello world"), ContentHasher::digest(b"hello world\n"));
        assert_ne!(ContentHasher::digest(b" hello world"), ContentHasher::digest(b"hello world"));
    }

    #[test]
    fn test_reader_matches_slice_across_chunks() {
        let data: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let from_reader = ContentHasher::digest_reader(Cursor::new(&data)).unwrap();
        assert_eq!(from_reader, ContentHasher::digest(&data));
    }

    #[test]
    fn test_digest_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"hello world").unwrap();
        let digest = ContentHasher::digest_file(file.path()).unwrap();
        assert_eq!(digest.as_str(), HELLO_WORLD);
    }

    #[test]
    fn test_digest_ranges_skips_gap() {
        let data = b"hello XXXXXworld";
        let range = ByteRange::new(0, 6, 11, 5);
        let digest = ContentHasher::digest_ranges(data, &range).unwrap();
        assert_eq!(digest, ContentHasher::digest(b"hello world"));
    }

    #[test]
    fn test_parse_rejects_non_canonical() {
        assert!(Digest::parse(HELLO_WORLD).is_ok());
        assert!(Digest::parse(&HELLO_WORLD.to_uppercase()).is_err());
        assert!(Digest::parse(&HELLO_WORLD[..63]).is_err());
        assert!(Digest::parse(&format!("{}0", HELLO_WORLD)).is_err());
        assert!(Digest::parse(&"g".repeat(64)).is_err());
    }

    #[test]
    fn test_content_input_resolution() {
        let digest = ContentHasher::digest(b"hello world");
        assert_eq!(ContentInput::Raw(b"hello world").resolve(), digest);
        assert_eq!(ContentInput::Digest(&digest).resolve(), digest);

        // Raw text that happens to look like a digest is still hashed
        let raw = ContentInput::Raw(HELLO_WORLD.as_bytes()).resolve();
        assert_ne!(raw.as_str(), HELLO_WORLD);
    }

    #[test]
    fn test_serde_round_trip_validates() {
        let digest = ContentHasher::digest(b"x");
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{}\"", digest));
        assert!(serde_json::from_str::<Digest>("\"ABC\"").is_err());
    }

    #[test]
    fn test_bytes_to_hex() {
        assert_eq!(bytes_to_hex(&[0x00, 0xab, 0xff]), "00abff");
    }
}
