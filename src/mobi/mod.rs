//! The MOBI / KF8 codec.
//!
//! Bottom-up: [`pdb`] is the outer container, [`varint`] the primitive
//! integer encodings, [`palmdoc`] and [`huffcdic`] the text compressors,
//! [`trailing`] the per-record trailers, [`headers`] record 0, [`resources`]
//! the post-text records, [`index`] the INDX machinery and [`kf8`] the
//! KF8 text layout. [`reader`] and [`writer`] tie them together.

pub mod headers;
pub mod huffcdic;
pub mod index;
pub mod kf8;
pub mod palmdoc;
pub mod pdb;
mod reader;
pub mod resources;
pub mod trailing;
pub mod varint;
mod writer;

use crate::error::{Error, Result};

pub use reader::{parse_mobi, read_mobi, read_mobi_from_reader};
pub use resources::{detect_image, encode_font_record};
pub use varint::{Tbs, TbsExtras};
pub use writer::{
    TextCompression, WriteOptions, write_mobi, write_mobi_to_path, write_mobi_to_writer,
};

/// Big-endian u16 at `offset`.
pub(crate) fn be_u16(data: &[u8], offset: usize) -> Result<u16> {
    data.get(offset..offset + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or(Error::out_of_bounds(offset + 2, data.len()))
}

/// Big-endian u32 at `offset`.
pub(crate) fn be_u32(data: &[u8], offset: usize) -> Result<u32> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(Error::out_of_bounds(offset + 4, data.len()))
}
