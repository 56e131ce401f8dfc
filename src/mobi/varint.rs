//! Variable-width integers, hex idents, and trailing byte sequences.
//!
//! MOBI varints carry 7 data bits per byte, most significant group first.
//! The forward form marks the *last* byte with the high bit; the backward
//! form (used at the end of text records) marks the *first* byte, so a
//! reader walking back from the end of a record knows where to stop.

use crate::error::{Error, Result};

/// Longest varint accepted: five groups cover a u32.
const MAX_VARINT_BYTES: usize = 5;

/// Decode a forward varint from the start of `data`.
///
/// Returns the value and the number of bytes consumed.
pub fn decint(data: &[u8]) -> Result<(u32, usize)> {
    let mut val: u64 = 0;
    for (i, &byte) in data.iter().take(MAX_VARINT_BYTES).enumerate() {
        val = (val << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 != 0 {
            return narrow(val).map(|v| (v, i + 1));
        }
    }
    Err(Error::out_of_bounds(
        data.len().min(MAX_VARINT_BYTES),
        data.len(),
    ))
}

/// Decode a backward varint ending at the end of `data`.
///
/// Returns the value and the number of bytes consumed.
pub fn decint_backward(data: &[u8]) -> Result<(u32, usize)> {
    let mut count = 0;
    for &byte in data.iter().rev().take(MAX_VARINT_BYTES) {
        count += 1;
        if byte & 0x80 != 0 {
            let mut val: u64 = 0;
            for &b in &data[data.len() - count..] {
                val = (val << 7) | u64::from(b & 0x7F);
            }
            return narrow(val).map(|v| (v, count));
        }
    }
    Err(Error::out_of_bounds(count, data.len()))
}

fn narrow(val: u64) -> Result<u32> {
    u32::try_from(val).map_err(|_| Error::header(format!("varint {val} overflows u32")))
}

fn groups(mut value: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(MAX_VARINT_BYTES);
    loop {
        bytes.push((value & 0x7F) as u8);
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    bytes.reverse();
    bytes
}

/// Encode a forward varint (stop bit on the last byte).
pub fn encint(value: u32) -> Vec<u8> {
    let mut bytes = groups(value);
    if let Some(last) = bytes.last_mut() {
        *last |= 0x80;
    }
    bytes
}

/// Encode a backward varint (stop bit on the first byte).
pub fn encint_backward(value: u32) -> Vec<u8> {
    let mut bytes = groups(value);
    bytes[0] |= 0x80;
    bytes
}

/// Append a trailing entry: `payload` followed by a backward varint
/// holding the total entry size, the size bytes included.
pub fn encode_trailing_entry(payload: &[u8]) -> Vec<u8> {
    let mut lsize = 1;
    loop {
        let size = encint_backward((payload.len() + lsize) as u32);
        if size.len() == lsize {
            let mut out = Vec::with_capacity(payload.len() + lsize);
            out.extend_from_slice(payload);
            out.extend_from_slice(&size);
            return out;
        }
        lsize += 1;
    }
}

/// Decode a length-prefixed uppercase hex ident (`\x02` `0A` = 10).
///
/// Returns the value and the bytes consumed, length byte included.
pub fn decode_hex_id(data: &[u8]) -> Result<(u32, usize)> {
    let len = *data.first().ok_or(Error::out_of_bounds(0, 0))? as usize;
    let digits = data
        .get(1..1 + len)
        .ok_or(Error::out_of_bounds(1 + len, data.len()))?;
    let text = std::str::from_utf8(digits)
        .map_err(|_| Error::EntryLengthMismatch("index ident is not ASCII".into()))?;
    let value = u32::from_str_radix(text, 16)
        .map_err(|_| Error::EntryLengthMismatch(format!("index ident {text:?} is not hex")))?;
    Ok((value, len + 1))
}

/// Encode `value` as a length-prefixed uppercase hex ident with an even
/// number of digits.
pub fn encode_hex_id(value: u32) -> Vec<u8> {
    let mut digits = format!("{value:X}");
    if digits.len() % 2 != 0 {
        digits.insert(0, '0');
    }
    let mut out = Vec::with_capacity(digits.len() + 1);
    out.push(digits.len() as u8);
    out.extend_from_slice(digits.as_bytes());
    out
}

/// Optional fields of a trailing byte sequence, keyed by flag bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TbsExtras {
    /// Flag `0b1000`; carries no payload and only exists with 4-bit flags.
    pub terminator: bool,
    /// Flag `0b0010`; varint.
    pub relative_offset: Option<u32>,
    /// Flag `0b0100`; single byte.
    pub entry_count: Option<u8>,
    /// Flag `0b0001`; varint.
    pub span_offset: Option<u32>,
}

impl TbsExtras {
    fn flags(&self) -> u32 {
        let mut flags = 0;
        if self.terminator {
            flags |= 0b1000;
        }
        if self.relative_offset.is_some() {
            flags |= 0b0010;
        }
        if self.entry_count.is_some() {
            flags |= 0b0100;
        }
        if self.span_offset.is_some() {
            flags |= 0b0001;
        }
        flags
    }
}

/// A decoded trailing byte sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tbs {
    pub value: u32,
    pub extras: TbsExtras,
}

/// Decode a TBS with a `flag_size`-bit flag field (3 for books, 4 for
/// periodicals). Returns the sequence and the bytes consumed.
pub fn decode_tbs(data: &[u8], flag_size: u32) -> Result<(Tbs, usize)> {
    let (arg, mut consumed) = decint(data)?;
    let flags = arg & ((1 << flag_size) - 1);
    let mut tbs = Tbs {
        value: arg >> flag_size,
        extras: TbsExtras::default(),
    };

    if flags & 0b1000 != 0 && flag_size > 3 {
        tbs.extras.terminator = true;
    }
    if flags & 0b0010 != 0 {
        let (x, n) = decint(&data[consumed..])?;
        tbs.extras.relative_offset = Some(x);
        consumed += n;
    }
    if flags & 0b0100 != 0 {
        let byte = *data
            .get(consumed)
            .ok_or(Error::out_of_bounds(consumed, data.len()))?;
        tbs.extras.entry_count = Some(byte);
        consumed += 1;
    }
    if flags & 0b0001 != 0 {
        let (x, n) = decint(&data[consumed..])?;
        tbs.extras.span_offset = Some(x);
        consumed += n;
    }
    Ok((tbs, consumed))
}

/// Encode a TBS; exact inverse of [`decode_tbs`] for the same flag size.
///
/// The value shares a 32-bit varint with the flags, so it must fit in
/// `32 - flag_size` bits.
pub fn encode_tbs(tbs: &Tbs, flag_size: u32) -> Result<Vec<u8>> {
    let limit = u32::MAX >> flag_size;
    if tbs.value > limit {
        return Err(Error::out_of_bounds(tbs.value as usize, limit as usize));
    }
    let mask = (1 << flag_size) - 1;
    let mut out = encint((tbs.value << flag_size) | (tbs.extras.flags() & mask));
    if let Some(x) = tbs.extras.relative_offset {
        out.extend(encint(x));
    }
    if let Some(count) = tbs.extras.entry_count {
        out.push(count);
    }
    if let Some(x) = tbs.extras.span_offset {
        out.extend(encint(x));
    }
    Ok(out)
}
