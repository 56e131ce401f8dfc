//! Trailing entries at the end of text records.
//!
//! `extra_data_flags` in the MOBI header says which entries follow each
//! text record's compressed payload. Bits 1..=15 each add one entry whose
//! size (itself included) is a backward varint at the very end; bit 0 adds
//! the multibyte overlap, sized by the low two bits of its last byte.

use crate::error::{Error, Result};

use super::varint::decint_backward;

/// Flag bit for the multibyte overlap entry.
pub const FLAG_MULTIBYTE: u16 = 0b01;
/// Flag bit for the indexing (TBS) entry.
pub const FLAG_INDEXING: u16 = 0b10;

/// A text record split into its payload and trailing entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailingEntries<'a> {
    /// Compressed text payload.
    pub text: &'a [u8],
    /// Indexing entry (bit 1) without its size suffix.
    pub indexing: Option<&'a [u8]>,
    /// Multibyte overlap bytes (bit 0) without the count byte.
    pub overlap: Option<&'a [u8]>,
}

/// Strip all trailing entries named by `flags`, highest bit first, the
/// multibyte overlap last.
pub fn strip_trailing(record: &[u8], flags: u16) -> Result<TrailingEntries<'_>> {
    let mut end = record.len();
    let mut indexing = None;

    for bit in (1..16).rev() {
        if flags & (1 << bit) == 0 {
            continue;
        }
        let (size, consumed) = decint_backward(&record[..end])?;
        let size = size as usize;
        if size > end {
            return Err(Error::out_of_bounds(size, end));
        }
        if size < consumed {
            return Err(Error::out_of_bounds(consumed, size));
        }
        if bit == 1 {
            indexing = Some(&record[end - size..end - consumed]);
        }
        end -= size;
    }

    let mut overlap = None;
    if flags & FLAG_MULTIBYTE != 0 && end > 0 {
        let count = (record[end - 1] & 0b11) as usize + 1;
        if count > end {
            return Err(Error::out_of_bounds(count, end));
        }
        overlap = Some(&record[end - count..end - 1]);
        end -= count;
    }

    Ok(TrailingEntries {
        text: &record[..end],
        indexing,
        overlap,
    })
}

/// Record trailer for the writer: overlap bytes plus their count byte,
/// then the indexing entry.
pub fn build_trailer(overlap: &[u8], indexing: Option<&[u8]>) -> Vec<u8> {
    let mut out = Vec::with_capacity(overlap.len() + 8);
    out.extend_from_slice(overlap);
    out.push(overlap.len() as u8);
    if let Some(payload) = indexing {
        out.extend(super::varint::encode_trailing_entry(payload));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_flags() {
        let entries = strip_trailing(b"abc", 0).unwrap();
        assert_eq!(entries.text, b"abc");
        assert_eq!(entries.indexing, None);
        assert_eq!(entries.overlap, None);
    }

    #[test]
    fn test_overlap_only() {
        // Two overlap bytes, count byte 2.
        let entries = strip_trailing(b"text\xe2\x80\x02", FLAG_MULTIBYTE).unwrap();
        assert_eq!(entries.text, b"text");
        assert_eq!(entries.overlap, Some(&b"\xe2\x80"[..]));
    }

    #[test]
    fn test_writer_layout() {
        let mut record = b"compressed".to_vec();
        record.extend(build_trailer(b"\xa9", Some(&[0x99, 0x80])));
        let entries = strip_trailing(&record, FLAG_MULTIBYTE | FLAG_INDEXING).unwrap();
        assert_eq!(entries.text, b"compressed");
        assert_eq!(entries.overlap, Some(&b"\xa9"[..]));
        assert_eq!(entries.indexing, Some(&[0x99, 0x80][..]));
    }

    #[test]
    fn test_highest_bit_stripped_first() {
        // Bit 2 entry sits at the very end, bit 1 entry before it.
        let mut record = b"xx".to_vec();
        record.extend([0x11, 0x82]);
        record.extend([0x22, 0x22, 0x83]);
        let entries = strip_trailing(&record, 0b110).unwrap();
        assert_eq!(entries.text, b"xx");
        assert_eq!(entries.indexing, Some(&[0x11][..]));
    }

    #[test]
    fn test_oversized_entry() {
        assert!(matches!(
            strip_trailing(b"ab\x90", FLAG_INDEXING),
            Err(Error::OffsetOutOfBounds { offset: 16, limit: 3 })
        ));
        assert!(strip_trailing(b"\x03", FLAG_MULTIBYTE).is_err());
    }
}
