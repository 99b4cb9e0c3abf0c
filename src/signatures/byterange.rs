//! ByteRange calculation for embedded signatures.
//!
//! The embedded signature block lives in a fixed-size slot inside the
//! document. A ByteRange names the bytes covered by the signature: everything
//! before the slot and everything after it.
//!
//! ## ByteRange Format
//!
//! The ByteRange is an array of four integers:
//! `[offset1, length1, offset2, length2]`
//!
//! Where:
//! - `offset1` = 0 (start of file)
//! - `length1` = byte offset where the slot begins
//! - `offset2` = byte offset where the slot ends
//! - `length2` = remaining bytes to end of file
//!
//! The array is written space-padded to [`BYTE_RANGE_FIELD_WIDTH`] so it can
//! be rewritten in place once the final offsets are known.

use crate::error::{Error, Result};

/// Width of the formatted ByteRange array, including brackets and padding.
pub const BYTE_RANGE_FIELD_WIDTH: usize = 48;

/// The two segments of a document covered by a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// Start of the first segment (always 0 for a well-formed range)
    pub offset1: usize,
    /// Length of the first segment
    pub length1: usize,
    /// Start of the second segment
    pub offset2: usize,
    /// Length of the second segment
    pub length2: usize,
}

impl ByteRange {
    /// Create a ByteRange from its four components.
    pub fn new(offset1: usize, length1: usize, offset2: usize, length2: usize) -> Self {
        Self {
            offset1,
            length1,
            offset2,
            length2,
        }
    }

    /// Build from a `[a b c d]` array of integers.
    pub fn from_array(values: &[i64]) -> Result<Self> {
        if values.len() != 4 {
            return Err(Error::InvalidPdf(format!(
                "ByteRange must have 4 entries, got {}",
                values.len()
            )));
        }
        let mut parts = [0usize; 4];
        for (slot, &value) in parts.iter_mut().zip(values) {
            *slot = usize::try_from(value)
                .map_err(|_| Error::InvalidPdf(format!("negative ByteRange entry: {}", value)))?;
        }
        Ok(Self::new(parts[0], parts[1], parts[2], parts[3]))
    }

    /// Total number of covered bytes.
    pub fn covered_len(&self) -> usize {
        self.length1 + self.length2
    }

    /// Borrow the two covered segments from the document.
    pub fn segments<'a>(&self, pdf_data: &'a [u8]) -> Result<(&'a [u8], &'a [u8])> {
        let end1 = self.offset1.checked_add(self.length1);
        let end2 = self.offset2.checked_add(self.length2);

        let end1 = match end1 {
            Some(end) if end <= pdf_data.len() => end,
            _ => {
                return Err(Error::InvalidPdf(format!(
                    "ByteRange first range exceeds file size: {} + {} > {}",
                    self.offset1,
                    self.length1,
                    pdf_data.len()
                )))
            },
        };
        let end2 = match end2 {
            Some(end) if end <= pdf_data.len() => end,
            _ => {
                return Err(Error::InvalidPdf(format!(
                    "ByteRange second range exceeds file size: {} + {} > {}",
                    self.offset2,
                    self.length2,
                    pdf_data.len()
                )))
            },
        };

        Ok((&pdf_data[self.offset1..end1], &pdf_data[self.offset2..end2]))
    }

    /// Concatenate the covered bytes.
    pub fn signed_bytes(&self, pdf_data: &[u8]) -> Result<Vec<u8>> {
        let (first, second) = self.segments(pdf_data)?;
        let mut signed = Vec::with_capacity(first.len() + second.len());
        signed.extend_from_slice(first);
        signed.extend_from_slice(second);
        Ok(signed)
    }

    /// Check that the range covers the whole document except one gap.
    ///
    /// A valid ByteRange must:
    /// - Start at offset 0
    /// - End at the file size
    /// - Have its first segment end before the second begins
    pub fn validate(&self, file_size: usize) -> Result<()> {
        if self.offset1 != 0 {
            return Err(Error::InvalidPdf(format!(
                "ByteRange must start at 0, got {}",
                self.offset1
            )));
        }

        let actual_end = self.offset2 + self.length2;
        if actual_end != file_size {
            return Err(Error::InvalidPdf(format!(
                "ByteRange must end at file size {}, got {}",
                file_size, actual_end
            )));
        }

        if self.length1 > self.offset2 {
            return Err(Error::InvalidPdf(format!(
                "ByteRange first range ({}) overlaps with second range start ({})",
                self.length1, self.offset2
            )));
        }

        Ok(())
    }

    /// Format as a PDF array, space-padded to the fixed field width.
    pub fn to_padded_string(&self) -> String {
        let text = format!("[{} {} {} {}]", self.offset1, self.length1, self.offset2, self.length2);
        format!("{:<width$}", text, width = BYTE_RANGE_FIELD_WIDTH)
    }
}

impl std::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} {} {} {}]", self.offset1, self.length1, self.offset2, self.length2)
    }
}

/// Calculator for the reserved signature slot and its ByteRange.
#[derive(Debug, Clone)]
pub struct ByteRangeCalculator {
    /// Size of the reserved slot in bytes
    slot_size: usize,
}

impl ByteRangeCalculator {
    /// Create a calculator for a slot of the given size.
    pub fn new(slot_size: usize) -> Self {
        Self { slot_size }
    }

    /// Get the slot size.
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Placeholder ByteRange text of the right width.
    pub fn placeholder_byte_range() -> String {
        ByteRange::new(0, 0, 0, 0).to_padded_string()
    }

    /// Calculate the ByteRange given the position of the slot.
    ///
    /// # Arguments
    ///
    /// * `file_size` - Total size of the final document
    /// * `slot_offset` - Byte offset where the slot starts
    pub fn calculate_byte_range(&self, file_size: usize, slot_offset: usize) -> Result<ByteRange> {
        let after_slot = slot_offset + self.slot_size;
        if after_slot > file_size {
            return Err(Error::InvalidPdf(format!(
                "Signature slot ({}..{}) exceeds file size {}",
                slot_offset, after_slot, file_size
            )));
        }
        Ok(ByteRange::new(0, slot_offset, after_slot, file_size - after_slot))
    }

    /// Overwrite a fixed-width field in place, padding with spaces.
    ///
    /// # Arguments
    ///
    /// * `pdf_data` - Mutable document bytes
    /// * `offset` - Start of the field
    /// * `width` - Reserved width of the field
    /// * `value` - Replacement text, at most `width` bytes
    pub fn overwrite_field(
        pdf_data: &mut [u8],
        offset: usize,
        width: usize,
        value: &[u8],
    ) -> Result<()> {
        if value.len() > width {
            return Err(Error::InvalidPdf(format!(
                "Value ({} bytes) exceeds reserved field ({} bytes)",
                value.len(),
                width
            )));
        }
        if offset + width > pdf_data.len() {
            return Err(Error::InvalidPdf("Field write would exceed file bounds".to_string()));
        }

        let field = &mut pdf_data[offset..offset + width];
        field[..value.len()].copy_from_slice(value);
        for byte in field[value.len()..].iter_mut() {
            *byte = b' ';
        }

        Ok(())
    }
}

impl Default for ByteRangeCalculator {
    fn default() -> Self {
        Self::new(8192)
    }
}
