//! HUFF/CDIC decompression.
//!
//! The HUFF record holds the canonical Huffman tables, the CDIC records the
//! phrase dictionary. A phrase is either literal bytes or itself compressed
//! with the same tables; compressed phrases are expanded on first use.

use crate::error::{Error, Result};

use super::be_u32;

const HUFF_MAGIC: &[u8] = b"HUFF\x00\x00\x00\x18";
const CDIC_MAGIC: &[u8] = b"CDIC\x00\x00\x00\x10";

#[derive(Debug, Clone)]
enum Phrase {
    /// Bytes still compressed.
    Packed(Vec<u8>),
    /// Being expanded further up the stack; reaching it again is a cycle.
    Expanding,
    /// Final bytes.
    Literal(Vec<u8>),
}

#[derive(Debug, Clone, Copy)]
struct Dict1Entry {
    codelen: u32,
    term: bool,
    maxcode: u64,
}

/// HUFF/CDIC decompressor for one book.
#[derive(Debug, Clone)]
pub struct HuffCdicReader {
    dict1: Vec<Dict1Entry>,
    /// Indexed by code length 0..=32.
    mincode: Vec<u64>,
    maxcode: Vec<u64>,
    dictionary: Vec<Phrase>,
}

fn corrupt(msg: impl Into<String>) -> Error {
    Error::CorruptHuffmanDict(msg.into())
}

impl HuffCdicReader {
    pub fn new(huff: &[u8], cdics: &[&[u8]]) -> Result<Self> {
        let mut reader = Self {
            dict1: Vec::with_capacity(256),
            mincode: Vec::with_capacity(33),
            maxcode: Vec::with_capacity(33),
            dictionary: Vec::new(),
        };
        reader.load_huff(huff)?;
        for cdic in cdics {
            reader.load_cdic(cdic)?;
        }
        tracing::debug!(
            phrases = reader.dictionary.len(),
            cdic_records = cdics.len(),
            "loaded HUFF/CDIC tables"
        );
        Ok(reader)
    }

    fn load_huff(&mut self, huff: &[u8]) -> Result<()> {
        if !huff.starts_with(HUFF_MAGIC) {
            return Err(corrupt("bad HUFF magic"));
        }
        let off1 = be_u32(huff, 8)? as usize;
        let off2 = be_u32(huff, 12)? as usize;
        if huff.len() < off1 + 256 * 4 {
            return Err(corrupt("HUFF code table truncated"));
        }
        if huff.len() < off2 + 64 * 4 {
            return Err(corrupt("HUFF min/max table truncated"));
        }

        for i in 0..256 {
            let v = be_u32(huff, off1 + i * 4)?;
            let codelen = v & 0x1F;
            let term = v & 0x80 != 0;
            if codelen == 0 {
                return Err(corrupt(format!("zero code length for byte {i:#04x}")));
            }
            if codelen <= 8 && !term {
                return Err(corrupt(format!(
                    "short code for byte {i:#04x} is not terminal"
                )));
            }
            let maxcode = ((u64::from(v >> 8) + 1) << (32 - codelen)) - 1;
            self.dict1.push(Dict1Entry {
                codelen,
                term,
                maxcode,
            });
        }

        self.mincode.push(0);
        self.maxcode.push(0);
        for codelen in 1..=32u32 {
            let pos = off2 + (codelen as usize - 1) * 8;
            let min = u64::from(be_u32(huff, pos)?);
            let max = u64::from(be_u32(huff, pos + 4)?);
            self.mincode.push(min << (32 - codelen));
            self.maxcode.push(((max + 1) << (32 - codelen)) - 1);
        }
        Ok(())
    }

    fn load_cdic(&mut self, cdic: &[u8]) -> Result<()> {
        if !cdic.starts_with(CDIC_MAGIC) {
            return Err(corrupt("bad CDIC magic"));
        }
        let phrases = be_u32(cdic, 8)? as usize;
        let bits = be_u32(cdic, 12)?;
        if bits > 16 {
            return Err(corrupt(format!("CDIC declares {bits} index bits")));
        }
        let n = (1usize << bits).min(phrases.saturating_sub(self.dictionary.len()));

        for i in 0..n {
            let off_pos = 16 + i * 2;
            let off = cdic
                .get(off_pos..off_pos + 2)
                .map(|b| u16::from_be_bytes([b[0], b[1]]) as usize)
                .ok_or_else(|| corrupt("CDIC offset table truncated"))?;
            let entry = 16 + off;
            let blen = cdic
                .get(entry..entry + 2)
                .map(|b| u16::from_be_bytes([b[0], b[1]]))
                .ok_or_else(|| corrupt(format!("CDIC phrase {i} out of range")))?;
            let len = (blen & 0x7FFF) as usize;
            let bytes = cdic
                .get(entry + 2..entry + 2 + len)
                .ok_or_else(|| corrupt(format!("CDIC phrase {i} truncated")))?
                .to_vec();

            self.dictionary.push(if blen & 0x8000 != 0 {
                Phrase::Literal(bytes)
            } else {
                Phrase::Packed(bytes)
            });
        }
        Ok(())
    }

    /// Decompress one text record.
    pub fn decompress(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() * 3);
        self.unpack_into(data, &mut out)?;
        Ok(out)
    }

    fn unpack_into(&mut self, data: &[u8], out: &mut Vec<u8>) -> Result<()> {
        let mut bits_left = data.len() as i64 * 8;
        let mut pos = 0usize;
        let mut x = window(data, pos);
        let mut n: i32 = 32;

        loop {
            if n <= 0 {
                pos += 4;
                x = window(data, pos);
                n += 32;
            }
            let code = (x >> n) & 0xFFFF_FFFF;

            let Dict1Entry {
                mut codelen,
                term,
                mut maxcode,
            } = self.dict1[(code >> 24) as usize];
            if !term {
                while code < self.mincode[codelen as usize] {
                    codelen += 1;
                    if codelen > 32 {
                        return Err(corrupt(format!("no code length fits {code:#010x}")));
                    }
                }
                maxcode = self.maxcode[codelen as usize];
            }

            n -= codelen as i32;
            bits_left -= i64::from(codelen);
            if bits_left < 0 {
                break;
            }

            let r = maxcode
                .checked_sub(code)
                .map(|d| (d >> (32 - codelen)) as usize)
                .ok_or_else(|| corrupt(format!("code {code:#010x} above maxcode")))?;
            let phrase = self
                .dictionary
                .get_mut(r)
                .ok_or_else(|| corrupt(format!("phrase {r} out of range")))?;

            match std::mem::replace(phrase, Phrase::Expanding) {
                Phrase::Literal(bytes) => {
                    out.extend_from_slice(&bytes);
                    self.dictionary[r] = Phrase::Literal(bytes);
                }
                Phrase::Packed(packed) => {
                    let mut expanded = Vec::new();
                    self.unpack_into(&packed, &mut expanded)?;
                    out.extend_from_slice(&expanded);
                    self.dictionary[r] = Phrase::Literal(expanded);
                }
                Phrase::Expanding => {
                    return Err(corrupt(format!("phrase {r} refers to itself")));
                }
            }
        }
        Ok(())
    }
}

/// 64 bits starting at byte `pos`, zero-padded past the end.
fn window(data: &[u8], pos: usize) -> u64 {
    let mut buf = [0u8; 8];
    if pos < data.len() {
        let avail = (data.len() - pos).min(8);
        buf[..avail].copy_from_slice(&data[pos..pos + avail]);
    }
    u64::from_be_bytes(buf)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// HUFF record with 8-bit terminal codes where byte `b` selects phrase
    /// `255 - b`.
    pub(crate) fn identity_huff() -> Vec<u8> {
        let mut huff = HUFF_MAGIC.to_vec();
        huff.extend_from_slice(&24u32.to_be_bytes());
        huff.extend_from_slice(&(24u32 + 1024).to_be_bytes());
        for _ in 0..256 {
            huff.extend_from_slice(&((255u32 << 8) | 0x80 | 8).to_be_bytes());
        }
        huff.extend_from_slice(&[0u8; 256]);
        huff
    }

    /// CDIC whose phrase `255 - b` is the literal byte `b`, with overrides.
    pub(crate) fn identity_cdic(overrides: &[(u8, bool, &[u8])]) -> Vec<u8> {
        let mut phrases: Vec<(bool, Vec<u8>)> = (0..256u32)
            .map(|r| (true, vec![(255 - r) as u8]))
            .collect();
        for &(byte, literal, bytes) in overrides {
            phrases[255 - byte as usize] = (literal, bytes.to_vec());
        }

        let mut offsets = Vec::new();
        let mut body = Vec::new();
        for (literal, bytes) in &phrases {
            offsets.extend_from_slice(&((512 + body.len()) as u16).to_be_bytes());
            let flag = if *literal { 0x8000 } else { 0 };
            body.extend_from_slice(&(bytes.len() as u16 | flag).to_be_bytes());
            body.extend_from_slice(bytes);
        }

        let mut cdic = CDIC_MAGIC.to_vec();
        cdic.extend_from_slice(&256u32.to_be_bytes());
        cdic.extend_from_slice(&8u32.to_be_bytes());
        cdic.extend(offsets);
        cdic.extend(body);
        cdic
    }

    #[test]
    fn test_window_pads() {
        assert_eq!(window(&[0x01], 0), 0x0100_0000_0000_0000);
        assert_eq!(window(&[0x01], 4), 0);
    }

    #[test]
    fn test_identity_table() {
        let huff = identity_huff();
        let cdic = identity_cdic(&[]);
        let mut reader = HuffCdicReader::new(&huff, &[&cdic]).unwrap();
        assert_eq!(reader.decompress(b"Hello").unwrap(), b"Hello");
    }

    #[test]
    fn test_nested_phrase_expands_once() {
        let huff = identity_huff();
        // Byte 0x01 selects a packed phrase that decodes to "xy".
        let cdic = identity_cdic(&[(0x01, false, b"xy")]);
        let mut reader = HuffCdicReader::new(&huff, &[&cdic]).unwrap();
        assert_eq!(reader.decompress(&[b'a', 0x01, 0x01]).unwrap(), b"axyxy");
    }

    #[test]
    fn test_self_reference_rejected() {
        let huff = identity_huff();
        let cdic = identity_cdic(&[(0x02, false, &[0x02])]);
        let mut reader = HuffCdicReader::new(&huff, &[&cdic]).unwrap();
        assert!(matches!(
            reader.decompress(&[0x02]),
            Err(Error::CorruptHuffmanDict(_))
        ));
    }

    #[test]
    fn test_zero_codelen_rejected() {
        let mut huff = identity_huff();
        huff[24..28].copy_from_slice(&0x80u32.to_be_bytes());
        assert!(matches!(
            HuffCdicReader::new(&huff, &[]),
            Err(Error::CorruptHuffmanDict(_))
        ));
    }

    #[test]
    fn test_bad_magic() {
        assert!(HuffCdicReader::new(b"HUFX\0\0\0\x18", &[]).is_err());
        let huff = identity_huff();
        assert!(HuffCdicReader::new(&huff, &[b"CDIX\0\0\0\x10"]).is_err());
    }
}
