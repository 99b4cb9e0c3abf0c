//! Signature metadata in the document Info dictionary.
//!
//! The embedder appends a new Info dictionary as an incremental update. It
//! keeps the existing entries and adds:
//!
//! - `/SignatureDate` - signing time, RFC 3339
//! - `/SignatureAlgorithm` - algorithm tag of the record
//! - `/SignatureByteRange` - the bytes covered by the embedded record
//! - `/SignatureHash` - digest of the covered bytes
//! - `/SignatureInfo` - the embedded record as JSON
//!
//! `/SignatureHash` and `/SignatureInfo` share one reserved slot of fixed
//! size that sits outside the byte range, so they can be filled after the
//! covered bytes are hashed without moving any other byte of the file.

use super::incremental::{append_info_object, TrailerInfo};
use super::serializer::{escape_literal, write_name, write_string, ObjectSerializer};
use crate::error::{Error, Result};
use crate::hash::{ContentHasher, Digest, DIGEST_HEX_LEN};
use crate::signatures::{ByteRange, ByteRangeCalculator, SignatureRecord, BYTE_RANGE_FIELD_WIDTH};
use chrono::{DateTime, SecondsFormat, Utc};
use lopdf::{Document, Object};

/// Info dictionary key for the signing time.
pub const KEY_DATE: &str = "SignatureDate";
/// Info dictionary key for the algorithm tag.
pub const KEY_ALGORITHM: &str = "SignatureAlgorithm";
/// Info dictionary key for the covered byte range.
pub const KEY_BYTE_RANGE: &str = "SignatureByteRange";
/// Info dictionary key for the covered-bytes digest.
pub const KEY_HASH: &str = "SignatureHash";
/// Info dictionary key for the JSON record.
pub const KEY_INFO: &str = "SignatureInfo";

const KEY_PREFIX: &[u8] = b"Signature";
/// Text between the hash field and the JSON field inside the slot.
const SLOT_SEPARATOR: &[u8] = b")\n/SignatureInfo (";
/// Smallest slot that still leaves room for a certificate-scheme record.
const MIN_SLOT_SIZE: usize = 1024;

/// Signature metadata read back from a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedSignature {
    /// The embedded record
    pub record: SignatureRecord,
    /// Bytes covered by the embedded record
    pub byte_range: ByteRange,
    /// `/SignatureDate` as written
    pub date: String,
    /// `/SignatureAlgorithm` as written
    pub algorithm: String,
}

/// A document with signature metadata reserved but not yet filled in.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    bytes: Vec<u8>,
    byte_range: ByteRange,
    hash_offset: usize,
    info_offset: usize,
    info_capacity: usize,
}

impl PreparedDocument {
    /// Document bytes with an empty slot.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Bytes that the embedded record must cover.
    pub fn byte_range(&self) -> ByteRange {
        self.byte_range
    }

    /// The covered bytes, concatenated.
    pub fn signed_content(&self) -> Result<Vec<u8>> {
        self.byte_range.signed_bytes(&self.bytes)
    }

    /// Digest of the covered bytes.
    pub fn signed_digest(&self) -> Result<Digest> {
        ContentHasher::digest_ranges(&self.bytes, &self.byte_range)
    }

    /// Write the record into the slot and return the final document.
    ///
    /// The file length does not change, so the covered bytes and their
    /// digest are the same before and after.
    pub fn fill(mut self, record: &SignatureRecord) -> Result<Vec<u8>> {
        let json = escape_literal(record.to_json()?.as_bytes());
        if json.len() > self.info_capacity {
            return Err(Error::InvalidPdf(format!(
                "signature record ({} bytes) exceeds reserved metadata slot ({} bytes)",
                json.len(),
                self.info_capacity
            )));
        }

        ByteRangeCalculator::overwrite_field(
            &mut self.bytes,
            self.hash_offset,
            DIGEST_HEX_LEN,
            record.hash.as_str().as_bytes(),
        )?;
        ByteRangeCalculator::overwrite_field(
            &mut self.bytes,
            self.info_offset,
            self.info_capacity,
            &json,
        )?;
        Ok(self.bytes)
    }
}

/// Writes and reads signature metadata.
#[derive(Debug, Clone)]
pub struct MetadataEmbedder {
    calculator: ByteRangeCalculator,
}

impl Default for MetadataEmbedder {
    fn default() -> Self {
        Self::new(8192)
    }
}

impl MetadataEmbedder {
    /// Create an embedder that reserves `slot_size` bytes for the signature block.
    pub fn new(slot_size: usize) -> Self {
        Self {
            calculator: ByteRangeCalculator::new(slot_size.max(MIN_SLOT_SIZE)),
        }
    }

    /// Reserved slot size.
    pub fn slot_size(&self) -> usize {
        self.calculator.slot_size()
    }

    /// Embed an existing record.
    ///
    /// Date and algorithm entries are taken from the record. Page content is
    /// untouched.
    pub fn embed(&self, pdf: &[u8], record: &SignatureRecord) -> Result<Vec<u8>> {
        self.prepare(pdf, record.timestamp, &record.algorithm)?
            .fill(record)
    }

    /// Append the metadata update with an empty slot.
    pub fn prepare(
        &self,
        pdf: &[u8],
        timestamp: DateTime<Utc>,
        algorithm: &str,
    ) -> Result<PreparedDocument> {
        let doc = load(pdf)?;
        reject_encrypted(&doc)?;
        let trailer = TrailerInfo::from_document(&doc, pdf)?;

        let serializer = ObjectSerializer::new();
        let mut body = Vec::with_capacity(self.slot_size() + 1024);
        body.extend_from_slice(b"<<\n");

        if let Some(info) = info_dictionary(&doc) {
            for (key, value) in info.iter() {
                if key.starts_with(KEY_PREFIX) || matches!(value, Object::Stream(_)) {
                    continue;
                }
                write_name(&mut body, key);
                body.push(b' ');
                serializer.write_object(&mut body, value)?;
                body.push(b'\n');
            }
        }

        let date = timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);
        write_name(&mut body, KEY_DATE.as_bytes());
        body.push(b' ');
        write_string(&mut body, date.as_bytes());
        body.push(b'\n');

        write_name(&mut body, KEY_ALGORITHM.as_bytes());
        body.push(b' ');
        write_string(&mut body, algorithm.as_bytes());
        body.push(b'\n');

        write_name(&mut body, KEY_BYTE_RANGE.as_bytes());
        body.push(b' ');
        let byte_range_rel = body.len();
        body.extend_from_slice(ByteRangeCalculator::placeholder_byte_range().as_bytes());
        body.push(b'\n');

        // Slot: (hash)\n/SignatureInfo (json...)
        write_name(&mut body, KEY_HASH.as_bytes());
        body.push(b' ');
        let slot_rel = body.len();
        let info_capacity = self.slot_size() - (2 + DIGEST_HEX_LEN + SLOT_SEPARATOR.len());
        body.push(b'(');
        body.extend(std::iter::repeat(b'0').take(DIGEST_HEX_LEN));
        body.extend_from_slice(SLOT_SEPARATOR);
        body.extend(std::iter::repeat(b' ').take(info_capacity));
        body.push(b')');
        debug_assert_eq!(body.len() - slot_rel, self.slot_size());
        body.extend_from_slice(b"\n>>");

        let update = append_info_object(pdf, &trailer, &body)?;
        let mut bytes = update.bytes;
        let slot_offset = update.body_offset + slot_rel;
        let byte_range = self
            .calculator
            .calculate_byte_range(bytes.len(), slot_offset)?;

        ByteRangeCalculator::overwrite_field(
            &mut bytes,
            update.body_offset + byte_range_rel,
            BYTE_RANGE_FIELD_WIDTH,
            byte_range.to_padded_string().as_bytes(),
        )?;

        log::debug!(
            "Prepared signature metadata as object {} with byte range {}",
            update.object_id.0,
            byte_range
        );

        Ok(PreparedDocument {
            bytes,
            byte_range,
            hash_offset: slot_offset + 1,
            info_offset: slot_offset + 1 + DIGEST_HEX_LEN + SLOT_SEPARATOR.len(),
            info_capacity,
        })
    }

    /// Read the embedded signature metadata.
    ///
    /// Returns `Ok(None)` when the document carries no `/SignatureInfo`.
    pub fn extract(&self, pdf: &[u8]) -> Result<Option<EmbeddedSignature>> {
        extract(pdf)
    }
}

/// Read the embedded signature metadata from a document.
pub fn extract(pdf: &[u8]) -> Result<Option<EmbeddedSignature>> {
    let doc = Document::load_mem(pdf)
        .map_err(|e| Error::MetadataExtractionFailed(format!("cannot parse PDF: {}", e)))?;
    let info = match info_dictionary(&doc) {
        Some(info) => info,
        None => return Ok(None),
    };
    let raw_info = match info.get(KEY_INFO.as_bytes()) {
        Ok(value) => string_value(value, KEY_INFO)?,
        Err(_) => return Ok(None),
    };

    let record = SignatureRecord::from_json(raw_info.trim()).map_err(|e| {
        log::warn!("Malformed {} entry: {}", KEY_INFO, e);
        Error::MetadataExtractionFailed(format!("{} is not a signature record: {}", KEY_INFO, e))
    })?;

    let hash = info
        .get(KEY_HASH.as_bytes())
        .map_err(|_| missing(KEY_HASH))
        .and_then(|value| string_value(value, KEY_HASH))?;
    if hash != record.hash.as_str() {
        return Err(Error::MetadataExtractionFailed(format!(
            "{} disagrees with {}",
            KEY_HASH, KEY_INFO
        )));
    }

    let range_values = info
        .get(KEY_BYTE_RANGE.as_bytes())
        .and_then(Object::as_array)
        .map_err(|_| missing(KEY_BYTE_RANGE))?
        .iter()
        .map(|value| match value {
            Object::Integer(i) => Ok(*i),
            _ => Err(Error::MetadataExtractionFailed(format!(
                "{} must contain integers",
                KEY_BYTE_RANGE
            ))),
        })
        .collect::<Result<Vec<i64>>>()?;
    let byte_range = ByteRange::from_array(&range_values)
        .map_err(|e| Error::MetadataExtractionFailed(e.to_string()))?;

    let date = optional_string(info, KEY_DATE)?.unwrap_or_default();
    let algorithm = optional_string(info, KEY_ALGORITHM)?.unwrap_or_else(|| record.algorithm.clone());

    Ok(Some(EmbeddedSignature {
        record,
        byte_range,
        date,
        algorithm,
    }))
}

/// Fail with [`Error::Unsupported`] if `pdf` is encrypted.
///
/// A document is encrypted when its trailer references an `/Encrypt`
/// dictionary.
pub fn ensure_sealable(pdf: &[u8]) -> Result<()> {
    reject_encrypted(&load(pdf)?)
}

fn reject_encrypted(doc: &Document) -> Result<()> {
    if doc.is_encrypted() {
        return Err(Error::Unsupported("encrypted documents cannot be sealed".to_string()));
    }
    Ok(())
}

fn load(pdf: &[u8]) -> Result<Document> {
    Document::load_mem(pdf).map_err(|e| Error::InvalidPdf(format!("cannot parse PDF: {}", e)))
}

fn info_dictionary(doc: &Document) -> Option<&lopdf::Dictionary> {
    match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn string_value(value: &Object, key: &str) -> Result<String> {
    match value {
        Object::String(bytes, _) => String::from_utf8(bytes.clone())
            .map_err(|_| Error::MetadataExtractionFailed(format!("{} is not UTF-8", key))),
        _ => Err(Error::MetadataExtractionFailed(format!("{} must be a string", key))),
    }
}

fn optional_string(info: &lopdf::Dictionary, key: &str) -> Result<Option<String>> {
    match info.get(key.as_bytes()) {
        Ok(value) => string_value(value, key).map(Some),
        Err(_) => Ok(None),
    }
}

fn missing(key: &str) -> Error {
    Error::MetadataExtractionFailed(format!("{} missing", key))
}
