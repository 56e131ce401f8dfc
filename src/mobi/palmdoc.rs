//! PalmDOC LZ77 compression.
//!
//! Token bytes:
//! - `0x00`, `0x09..=0x7F`: literal byte
//! - `0x01..=0x08`: copy the next `n` bytes literally
//! - `0x80..=0xBF`: two-byte back-reference; with the next byte,
//!   `distance = (val & 0x3FFF) >> 3`, `length = (val & 7) + 3`
//! - `0xC0..=0xFF`: space followed by `byte ^ 0x80`

use memchr::memmem;

use crate::error::{Error, Result};

/// Uncompressed size of one text record.
pub const RECORD_SIZE: usize = 4096;

/// Farthest back-reference the 11-bit distance can express.
const MAX_DISTANCE: usize = 2047;
const MIN_MATCH: usize = 3;
const MAX_MATCH: usize = 10;

/// Decompress one PalmDOC record.
///
/// Fails with [`Error::PalmDocRecordOverflow`] if the output would exceed
/// [`RECORD_SIZE`], and with [`Error::OffsetOutOfBounds`] on truncated
/// tokens or back-references outside the output produced so far.
pub fn decompress(input: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(RECORD_SIZE);
    let mut i = 0;

    while i < input.len() {
        let c = input[i];
        i += 1;

        match c {
            1..=8 => {
                let end = i + c as usize;
                let literal = input
                    .get(i..end)
                    .ok_or(Error::out_of_bounds(end, input.len()))?;
                output.extend_from_slice(literal);
                i = end;
            }
            0 | 0x09..=0x7F => output.push(c),
            0xC0..=0xFF => {
                output.push(b' ');
                output.push(c ^ 0x80);
            }
            0x80..=0xBF => {
                let next = *input
                    .get(i)
                    .ok_or(Error::out_of_bounds(i + 1, input.len()))?;
                i += 1;

                let combined = (u16::from(c) << 8) | u16::from(next);
                let distance = ((combined & 0x3FFF) >> 3) as usize;
                let length = ((combined & 7) + 3) as usize;
                if distance == 0 || distance > output.len() {
                    return Err(Error::out_of_bounds(distance, output.len()));
                }
                // Byte-by-byte: the source may overlap the bytes being written.
                for _ in 0..length {
                    output.push(output[output.len() - distance]);
                }
            }
        }

        if output.len() > RECORD_SIZE {
            return Err(Error::PalmDocRecordOverflow { limit: RECORD_SIZE });
        }
    }

    Ok(output)
}

/// Compress one record (at most [`RECORD_SIZE`] bytes for readers to accept
/// it) with greedy longest matches.
pub fn compress(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        if let Some((distance, length)) = find_match(input, i) {
            let compound = (distance << 3) | (length - MIN_MATCH);
            output.push(0x80 | (compound >> 8) as u8);
            output.push((compound & 0xFF) as u8);
            i += length;
            continue;
        }

        let c = input[i];
        i += 1;

        if c == b' '
            && let Some(&next) = input.get(i)
            && (0x40..0x80).contains(&next)
        {
            output.push(next ^ 0x80);
            i += 1;
            continue;
        }

        if c == 0 || (0x09..0x80).contains(&c) {
            output.push(c);
            continue;
        }

        // Run of up to eight bytes that cannot stand alone.
        let start = i - 1;
        let mut end = i;
        while end < input.len() && end - start < 8 {
            let b = input[end];
            if b == 0 || (0x09..0x80).contains(&b) {
                break;
            }
            end += 1;
        }
        output.push((end - start) as u8);
        output.extend_from_slice(&input[start..end]);
        i = end;
    }

    output
}

/// Longest match of `MIN_MATCH..=MAX_MATCH` bytes at `pos` whose source
/// starts in the preceding window. Returns `(distance, length)`.
fn find_match(data: &[u8], pos: usize) -> Option<(usize, usize)> {
    if pos == 0 {
        return None;
    }
    let window_start = pos.saturating_sub(MAX_DISTANCE);
    let max_len = MAX_MATCH.min(data.len() - pos);

    let mut best = None;
    for len in MIN_MATCH..=max_len {
        // The source may run into the bytes being encoded, so the haystack
        // ends just short of a match starting at `pos` itself.
        let haystack = &data[window_start..pos + len - 1];
        match memmem::rfind(haystack, &data[pos..pos + len]) {
            Some(found) => best = Some((pos - (window_start + found), len)),
            None => break,
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decompress_literal() {
        assert_eq!(decompress(b"Hello").unwrap(), b"Hello");
    }

    #[test]
    fn test_decompress_space_ascii() {
        assert_eq!(decompress(&[0xC1]).unwrap(), b" A");
    }

    #[test]
    fn test_decompress_backref_overlap() {
        // "AB", then distance 2 length 3.
        assert_eq!(decompress(&[b'A', b'B', 0x80, 0x10]).unwrap(), b"ABABA");
    }

    #[test]
    fn test_decompress_literal_run() {
        assert_eq!(decompress(&[3, 0xE9, 0x01, 0xFF, b'z']).unwrap(), b"\xe9\x01\xffz");
    }

    #[test]
    fn test_decompress_rejects_bad_distance() {
        // Distance 4 with only two bytes of output.
        assert!(matches!(
            decompress(&[b'A', b'B', 0x80, 0x20]),
            Err(Error::OffsetOutOfBounds { offset: 4, limit: 2 })
        ));
        // Distance 0.
        assert!(decompress(&[b'A', 0x80, 0x00]).is_err());
    }

    #[test]
    fn test_decompress_rejects_truncated_tokens() {
        assert!(decompress(&[5, b'a']).is_err());
        assert!(decompress(&[b'a', 0x80]).is_err());
    }

    #[test]
    fn test_decompress_overflow() {
        let input = vec![b'x'; RECORD_SIZE + 1];
        assert!(matches!(
            decompress(&input),
            Err(Error::PalmDocRecordOverflow { limit: RECORD_SIZE })
        ));
    }

    #[test]
    fn test_compress_ababa() {
        let compressed = compress(b"ABABA");
        assert_eq!(decompress(&compressed).unwrap(), b"ABABA");
        assert!(compressed.len() < 5);
    }

    #[test]
    fn test_compress_shrinks_text() {
        let text = "<p>The quick brown fox jumps over the lazy dog.</p>".repeat(40);
        let compressed = compress(&text.as_bytes()[..RECORD_SIZE.min(text.len())]);
        assert!(compressed.len() < text.len() / 2);
    }

    proptest! {
        #[test]
        fn prop_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..RECORD_SIZE)) {
            let compressed = compress(&data);
            prop_assert_eq!(decompress(&compressed).unwrap(), data);
        }

        #[test]
        fn prop_roundtrip_text(text in "[a-e <>/]{0,2000}") {
            let compressed = compress(text.as_bytes());
            prop_assert_eq!(decompress(&compressed).unwrap(), text.as_bytes());
        }
    }
}
