//! Classification of the records that follow the text, and FONT records.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::book::ResourceKind;
use crate::error::{Error, Result};

use super::be_u32;
use super::headers::MobiHeader;

/// Last record of every MOBI image.
pub const EOF_MAGIC: &[u8] = b"\xe9\x8e\x0d\x0a";
/// Boundary record between the MOBI 6 and KF8 halves of a dual file.
pub const BOUNDARY_MAGIC: &[u8] = b"BOUNDARY";

/// Bytes at the start of a FONT payload that are XOR-obfuscated.
const FONT_XOR_EXTENT: usize = 1040;
const FONT_HEADER_LEN: usize = 24;
const FONT_KEY_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Webp,
}

/// What a post-text record holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Flis,
    Fcis,
    Srcs,
    Datp,
    Resc,
    Boundary,
    Fdst,
    Audio,
    Video,
    Cres,
    Cont,
    Cmet,
    Font,
    Eof,
    Indx,
    Huff,
    Cdic,
    Image(ImageFormat),
    Unknown,
}

impl RecordKind {
    /// The resource kind kept on the book, or `None` for auxiliary
    /// records the writer regenerates or drops.
    pub fn resource_kind(self) -> Option<ResourceKind> {
        match self {
            RecordKind::Image(ImageFormat::Jpeg) => Some(ResourceKind::Jpeg),
            RecordKind::Image(ImageFormat::Png) => Some(ResourceKind::Png),
            RecordKind::Image(ImageFormat::Gif) => Some(ResourceKind::Gif),
            RecordKind::Image(ImageFormat::Bmp) => Some(ResourceKind::Bmp),
            RecordKind::Image(ImageFormat::Webp) => Some(ResourceKind::Webp),
            RecordKind::Font => Some(ResourceKind::Font),
            RecordKind::Audio => Some(ResourceKind::Audio),
            RecordKind::Video => Some(ResourceKind::Video),
            RecordKind::Boundary => Some(ResourceKind::ContainerMarker),
            RecordKind::Unknown => Some(ResourceKind::Unknown),
            _ => None,
        }
    }
}

/// Classify record `position` of the file described by `header`.
///
/// Four-byte signatures decide first; records without one are sniffed for
/// image magic.
pub fn classify(record: &[u8], position: usize, header: &MobiHeader) -> RecordKind {
    if record.starts_with(BOUNDARY_MAGIC) {
        return RecordKind::Boundary;
    }
    if record.starts_with(EOF_MAGIC) {
        return RecordKind::Eof;
    }
    let position = position as u64;
    if position == u64::from(header.fdst_record) && record.starts_with(b"FDST") {
        return RecordKind::Fdst;
    }

    match record.get(..4) {
        Some(b"FLIS") => RecordKind::Flis,
        Some(b"FCIS") => RecordKind::Fcis,
        Some(b"SRCS") => RecordKind::Srcs,
        Some(b"DATP") => RecordKind::Datp,
        Some(b"RESC") => RecordKind::Resc,
        Some(b"BOUN") => RecordKind::Boundary,
        Some(b"FDST") => RecordKind::Fdst,
        Some(b"AUDI") => RecordKind::Audio,
        Some(b"VIDE") => RecordKind::Video,
        Some(b"CRES") => RecordKind::Cres,
        Some(b"CONT") => RecordKind::Cont,
        Some(b"CMET") => RecordKind::Cmet,
        Some(b"FONT") => RecordKind::Font,
        Some(b"INDX") => RecordKind::Indx,
        Some(b"HUFF") => RecordKind::Huff,
        Some(b"CDIC") => RecordKind::Cdic,
        _ => detect_image_format(record).map_or(RecordKind::Unknown, RecordKind::Image),
    }
}

pub fn detect_image_format(data: &[u8]) -> Option<ImageFormat> {
    if data.starts_with(&[0xFF, 0xD8]) {
        Some(ImageFormat::Jpeg)
    } else if data.starts_with(b"\x89PNG") {
        Some(ImageFormat::Png)
    } else if data.starts_with(b"GIF8") {
        Some(ImageFormat::Gif)
    } else if data.starts_with(b"BM") {
        Some(ImageFormat::Bmp)
    } else if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        Some(ImageFormat::Webp)
    } else {
        None
    }
}

/// Resource kind of an image payload, if it is one.
pub fn detect_image(data: &[u8]) -> Option<ResourceKind> {
    detect_image_format(data).and_then(|f| RecordKind::Image(f).resource_kind())
}

/// Recover the plain font bytes from a FONT record.
pub fn decode_font_record(record: &[u8]) -> Result<Vec<u8>> {
    if record.len() < FONT_HEADER_LEN || !record.starts_with(b"FONT") {
        return Err(Error::header("FONT record header truncated"));
    }
    let size = be_u32(record, 4)? as usize;
    let flags = be_u32(record, 8)?;
    let data_start = be_u32(record, 12)? as usize;
    let key_len = be_u32(record, 16)? as usize;
    let key_start = be_u32(record, 20)? as usize;

    let mut data = record
        .get(data_start..)
        .ok_or(Error::out_of_bounds(data_start, record.len()))?
        .to_vec();

    if flags & 0b10 != 0 && key_len > 0 {
        let key = record
            .get(key_start..key_start + key_len)
            .ok_or(Error::out_of_bounds(key_start + key_len, record.len()))?;
        let extent = FONT_XOR_EXTENT.min(data.len());
        for (n, byte) in data[..extent].iter_mut().enumerate() {
            *byte ^= key[n % key_len];
        }
    }

    if flags & 0b01 != 0 {
        // The declared size is untrusted; stop one byte past it.
        let mut inflated = Vec::with_capacity(size.min(data.len().saturating_mul(8)));
        ZlibDecoder::new(data.as_slice())
            .take(size as u64 + 1)
            .read_to_end(&mut inflated)?;
        data = inflated;
    }

    if data.len() != size {
        return Err(Error::header(format!(
            "FONT record declares {size} bytes, decoded {}",
            data.len()
        )));
    }
    Ok(data)
}

/// Build a FONT record: zlib-compressed, and XOR-obfuscated with a 4-byte
/// key derived from the font when the compressed data covers the
/// obfuscated extent.
pub fn encode_font_record(font: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(font)?;
    let mut compressed = encoder.finish()?;
    let mut flags: u32 = 0b01;

    let mut key = Vec::new();
    if compressed.len() >= FONT_XOR_EXTENT {
        flags |= 0b10;
        key = sha1_smol::Sha1::from(font).digest().bytes()[..FONT_KEY_LEN].to_vec();
        for (n, byte) in compressed[..FONT_XOR_EXTENT].iter_mut().enumerate() {
            *byte ^= key[n % FONT_KEY_LEN];
        }
    }

    let key_start = FONT_HEADER_LEN as u32;
    let data_start = key_start + key.len() as u32;
    let mut record = Vec::with_capacity(FONT_HEADER_LEN + key.len() + compressed.len());
    record.extend_from_slice(b"FONT");
    record.extend_from_slice(&(font.len() as u32).to_be_bytes());
    record.extend_from_slice(&flags.to_be_bytes());
    record.extend_from_slice(&data_start.to_be_bytes());
    record.extend_from_slice(&(key.len() as u32).to_be_bytes());
    record.extend_from_slice(&key_start.to_be_bytes());
    record.extend_from_slice(&key);
    record.extend_from_slice(&compressed);
    Ok(record)
}
