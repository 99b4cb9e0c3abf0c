//! Incremental updates.
//!
//! An incremental update keeps the original file byte-for-byte and appends
//! the new objects, a cross-reference section for them, and a trailer whose
//! `/Prev` points at the previous cross-reference section.

use super::serializer::ObjectSerializer;
use crate::error::{Error, Result};
use lopdf::{Document, Object, ObjectId};
use std::io::Write;

/// Trailer values carried into an incremental update.
#[derive(Debug, Clone)]
pub struct TrailerInfo {
    /// Document catalog
    pub root: ObjectId,
    /// File identifier array, if the original has one
    pub id: Option<Object>,
    /// Object number for the appended object
    pub next_object_id: u32,
    /// Offset of the previous cross-reference section
    pub prev_xref: u64,
}

impl TrailerInfo {
    /// Collect trailer values from a parsed document and its raw bytes.
    pub fn from_document(doc: &Document, original: &[u8]) -> Result<Self> {
        let root = doc
            .trailer
            .get(b"Root")
            .and_then(Object::as_reference)
            .map_err(|_| Error::InvalidPdf("trailer has no /Root reference".to_string()))?;
        let id = doc.trailer.get(b"ID").ok().cloned();

        let declared_size = match doc.trailer.get(b"Size") {
            Ok(Object::Integer(size)) if *size > 0 => u32::try_from(*size).unwrap_or(0),
            _ => 0,
        };
        let next_object_id = doc.max_id.max(declared_size.saturating_sub(1)) + 1;

        Ok(Self {
            root,
            id,
            next_object_id,
            prev_xref: find_prev_xref_offset(original)?,
        })
    }
}

/// Bytes produced by an incremental update.
#[derive(Debug, Clone)]
pub struct AppendedUpdate {
    /// Complete file: original bytes plus the update
    pub bytes: Vec<u8>,
    /// Offset of the first byte of the appended object's body
    pub body_offset: usize,
    /// Object id of the appended object
    pub object_id: ObjectId,
}

/// Append one object as the new document Info dictionary.
///
/// `body` is the already-serialized dictionary. Its offset within the
/// returned file is reported so callers can patch reserved fields in place.
pub fn append_info_object(
    original: &[u8],
    trailer: &TrailerInfo,
    body: &[u8],
) -> Result<AppendedUpdate> {
    let serializer = ObjectSerializer::new();
    let object_id = (trailer.next_object_id, 0u16);
    let mut out = Vec::with_capacity(original.len() + body.len() + 512);

    out.extend_from_slice(original);
    if !matches!(out.last(), Some(b'\n') | Some(b'\r')) {
        out.push(b'\n');
    }

    let object_offset = out.len();
    writeln!(out, "{} {} obj", object_id.0, object_id.1)?;
    let body_offset = out.len();
    out.extend_from_slice(body);
    write!(out, "\nendobj\n")?;

    let xref_offset = out.len();
    write!(out, "xref\n")?;
    write!(out, "{} 1\n", object_id.0)?;
    write!(out, "{:010} {:05} n \n", object_offset, object_id.1)?;

    write!(out, "trailer\n<<")?;
    write!(out, "/Size {}", object_id.0 + 1)?;
    write!(out, "/Root {} {} R", trailer.root.0, trailer.root.1)?;
    write!(out, "/Info {} {} R", object_id.0, object_id.1)?;
    write!(out, "/Prev {}", trailer.prev_xref)?;
    if let Some(id) = &trailer.id {
        write!(out, "/ID ")?;
        serializer.write_object(&mut out, id)?;
    }
    write!(out, ">>\n")?;
    write!(out, "startxref\n{}\n%%EOF\n", xref_offset)?;

    Ok(AppendedUpdate {
        bytes: out,
        body_offset,
        object_id,
    })
}

/// Find the offset recorded after the last `startxref` keyword.
pub fn find_prev_xref_offset(bytes: &[u8]) -> Result<u64> {
    let search = b"startxref";
    let tail_start = bytes.len().saturating_sub(2048);
    let tail = &bytes[tail_start..];

    let pos = tail
        .windows(search.len())
        .rposition(|window| window == search)
        .ok_or_else(|| Error::InvalidPdf("Could not find startxref".to_string()))?;

    let offset_str: String = tail[pos + search.len()..]
        .iter()
        .skip_while(|b| b.is_ascii_whitespace())
        .take_while(|b| b.is_ascii_digit())
        .map(|&b| b as char)
        .collect();

    offset_str
        .parse::<u64>()
        .map_err(|_| Error::InvalidPdf("startxref is not followed by an offset".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_prev_xref_offset() {
        let pdf = b"%PDF-1.4\n...\nstartxref\n1234\n%%EOF\n";
        assert_eq!(find_prev_xref_offset(pdf).unwrap(), 1234);

        // The last occurrence wins after an earlier update
        let pdf = b"%PDF-1.4\nstartxref\n10\n%%EOF\nstartxref\r\n99\r\n%%EOF";
        assert_eq!(find_prev_xref_offset(pdf).unwrap(), 99);
    }

    #[test]
    fn test_find_prev_xref_offset_missing() {
        assert!(find_prev_xref_offset(b"%PDF-1.4\n%%EOF").is_err());
        assert!(find_prev_xref_offset(b"startxref\nabc").is_err());
    }

    #[test]
    fn test_append_info_object_layout() {
        let original = b"%PDF-1.4\nstartxref\n9\n%%EOF";
        let trailer = TrailerInfo {
            root: (1, 0),
            id: None,
            next_object_id: 7,
            prev_xref: 9,
        };
        let update = append_info_object(original, &trailer, b"<</Producer (x)>>").unwrap();
        let text = String::from_utf8_lossy(&update.bytes).to_string();

        assert!(update.bytes.starts_with(original));
        assert_eq!(&update.bytes[update.body_offset..update.body_offset + 3], b"<</");
        assert_eq!(update.object_id, (7, 0));
        assert!(text.contains("7 0 obj\n<</Producer (x)>>\nendobj\n"));
        assert!(text.contains("/Size 8/Root 1 0 R/Info 7 0 R/Prev 9>>"));

        // The xref entry points at the object header
        let object_offset = text.find("7 0 obj").unwrap();
        assert!(text.contains(&format!("xref\n7 1\n{:010} 00000 n \n", object_offset)));

        // startxref points at the new xref keyword
        let xref_offset = text.rfind("xref\n7 1").unwrap();
        assert_eq!(find_prev_xref_offset(&update.bytes).unwrap(), xref_offset as u64);
    }
}
