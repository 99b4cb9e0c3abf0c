//! PDF object serialization.
//!
//! Serializes `lopdf` objects to their byte representation for the
//! hand-written incremental update. Streams are never written inline.

use crate::error::{Error, Result};
use lopdf::{Dictionary, Object};
use std::io::Write;

/// Serializer for PDF objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectSerializer;

impl ObjectSerializer {
    /// Create a new object serializer.
    pub fn new() -> Self {
        Self
    }

    /// Serialize an object to bytes.
    pub fn serialize(&self, obj: &Object) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_object(&mut buf, obj)?;
        Ok(buf)
    }

    /// Write an object to a buffer.
    pub fn write_object(&self, w: &mut Vec<u8>, obj: &Object) -> Result<()> {
        match obj {
            Object::Null => w.extend_from_slice(b"null"),
            Object::Boolean(b) => w.extend_from_slice(if *b { b"true" } else { b"false" }),
            Object::Integer(i) => write!(w, "{}", i)?,
            Object::Real(r) => write_real(w, *r as f64)?,
            Object::String(s, _) => write_string(w, s),
            Object::Name(n) => write_name(w, n),
            Object::Array(arr) => {
                w.push(b'[');
                for (i, item) in arr.iter().enumerate() {
                    if i > 0 {
                        w.push(b' ');
                    }
                    self.write_object(w, item)?;
                }
                w.push(b']');
            },
            Object::Dictionary(dict) => self.write_dictionary(w, dict)?,
            Object::Stream(_) => {
                return Err(Error::Unsupported("stream objects cannot be written inline".to_string()))
            },
            Object::Reference((id, gen)) => write!(w, "{} {} R", id, gen)?,
        }
        Ok(())
    }

    /// Write a dictionary, preserving entry order.
    pub fn write_dictionary(&self, w: &mut Vec<u8>, dict: &Dictionary) -> Result<()> {
        w.extend_from_slice(b"<<");
        for (key, value) in dict.iter() {
            write_name(w, key);
            w.push(b' ');
            self.write_object(w, value)?;
        }
        w.extend_from_slice(b">>");
        Ok(())
    }
}

/// Write a real number, trimming trailing zeros.
fn write_real(w: &mut Vec<u8>, value: f64) -> std::io::Result<()> {
    if value.fract() == 0.0 {
        write!(w, "{}", value as i64)
    } else {
        let formatted = format!("{:.5}", value);
        let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
        write!(w, "{}", trimmed)
    }
}

/// Write a PDF string.
///
/// Printable text uses literal syntax `(...)`, anything else hex `<...>`.
pub fn write_string(w: &mut Vec<u8>, data: &[u8]) {
    let is_printable = data
        .iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..=0x7E).contains(&b));

    if is_printable {
        w.push(b'(');
        w.extend_from_slice(&escape_literal(data));
        w.push(b')');
    } else {
        w.push(b'<');
        for byte in data {
            // Writing to a Vec cannot fail
            let _ = write!(w, "{:02X}", byte);
        }
        w.push(b'>');
    }
}

/// Escape the body of a literal string.
pub fn escape_literal(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 8);
    for &byte in data {
        match byte {
            b'(' => out.extend_from_slice(b"\\("),
            b')' => out.extend_from_slice(b"\\)"),
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            _ => out.push(byte),
        }
    }
    out
}

/// Write a PDF name, escaping delimiters and non-regular bytes as `#xx`.
pub fn write_name(w: &mut Vec<u8>, name: &[u8]) {
    w.push(b'/');
    for &byte in name {
        match byte {
            b'!'
            | b'"'
            | b'$'
            | b'&'
            | b'\''
            | b'*'..=b'.'
            | b'0'..=b'9'
            | b':'
            | b';'
            | b'='
            | b'?'
            | b'@'
            | b'A'..=b'Z'
            | b'^'..=b'z'
            | b'|'
            | b'~' => w.push(byte),
            _ => {
                let _ = write!(w, "#{:02X}", byte);
            },
        }
    }
}
