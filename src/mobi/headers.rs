//! Record 0: the PalmDOC header, the MOBI header and the EXTH block.
//!
//! All MOBI header offsets below are absolute positions in record 0, so the
//! `MOBI` magic sits at 16 and a header of length `n` ends at `16 + n`.

use crate::book::{ExthRecord, Metadata, TextEncoding};
use crate::error::{Error, Result, Warning};

use super::{be_u16, be_u32};

pub const NULL_INDEX: u32 = 0xFFFF_FFFF;

/// MOBI header length written for MOBI 6 books.
pub const MOBI6_HEADER_LEN: u32 = 0xE8;
/// MOBI header length written for KF8 books.
pub const KF8_HEADER_LEN: u32 = 0x108;

/// EXTH flag: an EXTH block follows the MOBI header.
pub const EXTH_FLAG_PRESENT: u32 = 0x40;
/// EXTH flags the writer sets.
pub const EXTH_FLAGS_WRITTEN: u32 = 0x50;

pub const PALMDOC_HEADER_LEN: usize = 16;

/// Text compression named in the PalmDOC header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    PalmDoc,
    Huffman,
}

impl Compression {
    pub fn from_code(code: u16) -> Result<Self> {
        match code {
            1 => Ok(Compression::None),
            2 => Ok(Compression::PalmDoc),
            0x4448 => Ok(Compression::Huffman), // "DH"
            n => Err(Error::Unsupported(format!("compression type {n}"))),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            Compression::None => 1,
            Compression::PalmDoc => 2,
            Compression::Huffman => 0x4448,
        }
    }
}

/// The 16 bytes at the start of record 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PalmDocHeader {
    pub compression: Compression,
    /// Uncompressed text length.
    pub text_length: u32,
    /// Number of text records.
    pub record_count: u16,
    /// Maximum uncompressed record size, 4096.
    pub record_size: u16,
    pub encryption: u16,
}

impl PalmDocHeader {
    pub fn parse(record0: &[u8]) -> Result<Self> {
        if record0.len() < PALMDOC_HEADER_LEN {
            return Err(Error::header(format!(
                "record 0 is {} bytes, PalmDOC header needs {PALMDOC_HEADER_LEN}",
                record0.len()
            )));
        }
        Ok(Self {
            compression: Compression::from_code(be_u16(record0, 0)?)?,
            text_length: be_u32(record0, 4)?,
            record_count: be_u16(record0, 8)?,
            record_size: be_u16(record0, 10)?,
            encryption: be_u16(record0, 12)?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.compression.code().to_be_bytes());
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&self.text_length.to_be_bytes());
        out.extend_from_slice(&self.record_count.to_be_bytes());
        out.extend_from_slice(&self.record_size.to_be_bytes());
        out.extend_from_slice(&self.encryption.to_be_bytes());
        out.extend_from_slice(&[0, 0]);
    }
}

/// The MOBI header following the PalmDOC header in record 0.
///
/// Fields past the declared header length read as [`NULL_INDEX`] (or 0
/// for counts and flags).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MobiHeader {
    pub header_length: u32,
    pub mobi_type: u32,
    pub encoding: TextEncoding,
    pub unique_id: u32,
    pub file_version: u32,
    pub orth_index: u32,
    pub infl_index: u32,
    pub secondary_index: u32,
    pub first_non_book: u32,
    pub full_name_offset: u32,
    pub full_name_length: u32,
    /// Raw full name bytes, in `encoding`.
    pub full_name: Vec<u8>,
    pub locale: u32,
    pub input_language: u32,
    pub output_language: u32,
    pub min_version: u32,
    pub first_image: u32,
    pub huff_record: u32,
    pub huff_count: u32,
    pub datp_record: u32,
    pub datp_count: u32,
    pub exth_flags: u32,
    pub drm_offset: u32,
    pub drm_count: u32,
    /// MOBI 6 only.
    pub first_content: u16,
    /// MOBI 6 only.
    pub last_content: u16,
    /// KF8 only.
    pub fdst_record: u32,
    /// KF8 only.
    pub fdst_count: u32,
    pub fcis_record: u32,
    pub flis_record: u32,
    pub srcs_record: u32,
    pub srcs_count: u32,
    pub extra_data_flags: u16,
    /// Primary (NCX) index record.
    pub ncx_index: u32,
    pub fragment_index: u32,
    pub skeleton_index: u32,
    pub datp_index: u32,
    pub guide_index: u32,
}

impl MobiHeader {
    /// Defaults the writer starts from.
    pub fn new(kf8: bool) -> Self {
        Self {
            header_length: if kf8 { KF8_HEADER_LEN } else { MOBI6_HEADER_LEN },
            mobi_type: 2,
            encoding: TextEncoding::Utf8,
            unique_id: 0,
            file_version: if kf8 { 8 } else { 6 },
            orth_index: NULL_INDEX,
            infl_index: NULL_INDEX,
            secondary_index: NULL_INDEX,
            first_non_book: NULL_INDEX,
            full_name_offset: 0,
            full_name_length: 0,
            full_name: Vec::new(),
            locale: 0,
            input_language: 0,
            output_language: 0,
            min_version: if kf8 { 8 } else { 6 },
            first_image: NULL_INDEX,
            huff_record: 0,
            huff_count: 0,
            datp_record: 0,
            datp_count: 0,
            exth_flags: EXTH_FLAGS_WRITTEN,
            drm_offset: NULL_INDEX,
            drm_count: 0,
            first_content: 1,
            last_content: 0,
            fdst_record: NULL_INDEX,
            fdst_count: 0,
            fcis_record: NULL_INDEX,
            flis_record: NULL_INDEX,
            srcs_record: NULL_INDEX,
            srcs_count: 0,
            extra_data_flags: 0,
            ncx_index: NULL_INDEX,
            fragment_index: NULL_INDEX,
            skeleton_index: NULL_INDEX,
            datp_index: NULL_INDEX,
            guide_index: NULL_INDEX,
        }
    }

    /// Parse the MOBI header from record 0. Returns `None` for a plain
    /// PalmDOC record 0 without one.
    pub fn parse(record0: &[u8]) -> Result<Option<Self>> {
        if record0.len() < PALMDOC_HEADER_LEN + 8 || &record0[16..20] != b"MOBI" {
            return Ok(None);
        }

        let header_length = be_u32(record0, 20)?;
        let end = (PALMDOC_HEADER_LEN + header_length as usize).min(record0.len());
        let field = |offset: usize, default: u32| -> u32 {
            if offset + 4 <= end {
                be_u32(record0, offset).unwrap_or(default)
            } else {
                default
            }
        };
        let half = |offset: usize| -> u16 {
            if offset + 2 <= end {
                be_u16(record0, offset).unwrap_or(0)
            } else {
                0
            }
        };

        let codepage = field(28, 1252);
        let encoding = TextEncoding::from_codepage(codepage)
            .ok_or_else(|| Error::Unsupported(format!("text encoding {codepage}")))?;

        let full_name_offset = field(84, 0);
        let full_name_length = field(88, 0);
        let name_start = full_name_offset as usize;
        let name_end = name_start + full_name_length as usize;
        let full_name = record0
            .get(name_start..name_end)
            .ok_or(Error::out_of_bounds(name_end, record0.len()))?
            .to_vec();

        let file_version = field(36, 1);
        let kf8 = file_version >= 8;

        Ok(Some(Self {
            header_length,
            mobi_type: field(24, 2),
            encoding,
            unique_id: field(32, 0),
            file_version,
            orth_index: field(40, NULL_INDEX),
            infl_index: field(44, NULL_INDEX),
            secondary_index: field(48, NULL_INDEX),
            first_non_book: field(80, NULL_INDEX),
            full_name_offset,
            full_name_length,
            full_name,
            locale: field(92, 0),
            input_language: field(96, 0),
            output_language: field(100, 0),
            min_version: field(104, file_version),
            first_image: field(108, NULL_INDEX),
            huff_record: field(112, 0),
            huff_count: field(116, 0),
            datp_record: field(120, 0),
            datp_count: field(124, 0),
            exth_flags: field(128, 0),
            drm_offset: field(168, NULL_INDEX),
            drm_count: field(172, 0),
            first_content: if kf8 { 1 } else { half(192) },
            last_content: if kf8 { 0 } else { half(194) },
            fdst_record: if kf8 { field(192, NULL_INDEX) } else { NULL_INDEX },
            fdst_count: if kf8 { field(196, 0) } else { 0 },
            fcis_record: field(200, NULL_INDEX),
            flis_record: field(208, NULL_INDEX),
            srcs_record: field(224, NULL_INDEX),
            srcs_count: field(228, 0),
            extra_data_flags: half(242),
            ncx_index: field(244, NULL_INDEX),
            fragment_index: if kf8 { field(248, NULL_INDEX) } else { NULL_INDEX },
            skeleton_index: if kf8 { field(252, NULL_INDEX) } else { NULL_INDEX },
            datp_index: field(256, NULL_INDEX),
            guide_index: if kf8 { field(260, NULL_INDEX) } else { NULL_INDEX },
        }))
    }

    pub fn has_exth(&self) -> bool {
        self.exth_flags & EXTH_FLAG_PRESENT != 0
    }

    pub fn is_kf8(&self) -> bool {
        self.file_version >= 8
    }

    /// Periodical (newspaper/magazine) layouts use 4-bit TBS flags.
    pub fn is_periodical(&self) -> bool {
        (0x101..=0x103).contains(&self.mobi_type)
    }

    /// Offset of the EXTH block in record 0.
    pub fn exth_offset(&self) -> usize {
        PALMDOC_HEADER_LEN + self.header_length as usize
    }

    /// Serialize the header (`MOBI` through `16 + header_length`).
    pub fn to_bytes(&self) -> Vec<u8> {
        let base = PALMDOC_HEADER_LEN;
        let mut buf = vec![0u8; self.header_length as usize];
        let mut put = |offset: usize, value: u32| {
            let at = offset - base;
            if at + 4 <= buf.len() {
                buf[at..at + 4].copy_from_slice(&value.to_be_bytes());
            }
        };

        put(16, u32::from_be_bytes(*b"MOBI"));
        put(20, self.header_length);
        put(24, self.mobi_type);
        put(28, self.encoding.codepage());
        put(32, self.unique_id);
        put(36, self.file_version);
        put(40, self.orth_index);
        put(44, self.infl_index);
        put(48, self.secondary_index);
        for offset in (52..80).step_by(4) {
            put(offset, NULL_INDEX);
        }
        put(80, self.first_non_book);
        put(84, self.full_name_offset);
        put(88, self.full_name_length);
        put(92, self.locale);
        put(96, self.input_language);
        put(100, self.output_language);
        put(104, self.min_version);
        put(108, self.first_image);
        put(112, self.huff_record);
        put(116, self.huff_count);
        put(120, self.datp_record);
        put(124, self.datp_count);
        put(128, self.exth_flags);
        put(164, NULL_INDEX);
        put(168, self.drm_offset);
        put(172, self.drm_count);
        if self.is_kf8() {
            put(192, self.fdst_record);
            put(196, self.fdst_count);
        } else {
            put(
                192,
                (u32::from(self.first_content) << 16) | u32::from(self.last_content),
            );
            put(196, 1);
        }
        put(200, self.fcis_record);
        put(204, 1);
        put(208, self.flis_record);
        put(212, 1);
        put(224, self.srcs_record);
        put(228, self.srcs_count);
        put(232, NULL_INDEX);
        put(236, NULL_INDEX);
        put(240, u32::from(self.extra_data_flags));
        put(244, self.ncx_index);
        if self.is_kf8() {
            put(248, self.fragment_index);
            put(252, self.skeleton_index);
            put(256, self.datp_index);
            put(260, self.guide_index);
            put(264, NULL_INDEX);
            put(272, NULL_INDEX);
        }
        buf
    }
}

/// EXTH block: ordered raw records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExthHeader {
    pub records: Vec<ExthRecord>,
}

impl ExthHeader {
    /// Parse an EXTH block starting at `data[0]`. Any structural problem is
    /// fatal.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 12 {
            return Err(Error::header("EXTH block shorter than 12 bytes"));
        }
        if &data[0..4] != b"EXTH" {
            return Err(Error::header("missing EXTH magic"));
        }
        let header_length = be_u32(data, 4)? as usize;
        let count = be_u32(data, 8)?;
        if header_length < 12 {
            return Err(Error::header(format!("EXTH length {header_length} < 12")));
        }
        if header_length > data.len() {
            return Err(Error::header(format!(
                "EXTH length {header_length} overruns record 0"
            )));
        }

        let mut records = Vec::new();
        let mut pos = 12;
        for i in 0..count {
            if pos + 8 > header_length {
                return Err(Error::header(format!("EXTH record {i} runs past block")));
            }
            let code = be_u32(data, pos)?;
            let len = be_u32(data, pos + 4)? as usize;
            if len < 8 {
                return Err(Error::header(format!("EXTH record {i} length {len} < 8")));
            }
            if pos + len > header_length {
                return Err(Error::header(format!("EXTH record {i} runs past block")));
            }
            records.push(ExthRecord {
                code,
                data: data[pos + 8..pos + len].to_vec(),
            });
            pos += len;
        }
        Ok(Self { records })
    }

    /// Serialize, padding the block to a multiple of four bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::new();
        for record in &self.records {
            body.extend_from_slice(&record.code.to_be_bytes());
            body.extend_from_slice(&(8 + record.data.len() as u32).to_be_bytes());
            body.extend_from_slice(&record.data);
        }
        let padding = (4 - body.len() % 4) % 4;

        let mut out = Vec::with_capacity(12 + body.len() + padding);
        out.extend_from_slice(b"EXTH");
        out.extend_from_slice(&((12 + body.len() + padding) as u32).to_be_bytes());
        out.extend_from_slice(&(self.records.len() as u32).to_be_bytes());
        out.extend(body);
        out.extend(std::iter::repeat_n(0, padding));
        out
    }

    pub fn push(&mut self, code: u32, data: impl Into<Vec<u8>>) {
        self.records.push(ExthRecord {
            code,
            data: data.into(),
        });
    }

    pub fn push_u32(&mut self, code: u32, value: u32) {
        self.push(code, value.to_be_bytes().to_vec());
    }

    pub fn get(&self, code: u32) -> Option<&[u8]> {
        self.records
            .iter()
            .find(|r| r.code == code)
            .map(|r| r.data.as_slice())
    }

    /// First record `code` as a big-endian integer; [`NULL_INDEX`] reads
    /// as absent.
    pub fn get_u32(&self, code: u32) -> Option<u32> {
        let data = self.get(code)?;
        let value = match data.len() {
            4.. => u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
            2 => u32::from(u16::from_be_bytes([data[0], data[1]])),
            1 => u32::from(data[0]),
            _ => return None,
        };
        (value != NULL_INDEX).then_some(value)
    }
}

pub mod code {
    pub const AUTHOR: u32 = 100;
    pub const PUBLISHER: u32 = 101;
    pub const IMPRINT: u32 = 102;
    pub const DESCRIPTION: u32 = 103;
    pub const ISBN: u32 = 104;
    pub const SUBJECT: u32 = 105;
    pub const PUBDATE: u32 = 106;
    pub const REVIEW: u32 = 107;
    pub const CONTRIBUTOR: u32 = 108;
    pub const RIGHTS: u32 = 109;
    pub const SOURCE: u32 = 112;
    pub const ASIN: u32 = 113;
    pub const START_READING: u32 = 116;
    pub const KF8_BOUNDARY: u32 = 121;
    pub const RESOURCE_COUNT: u32 = 125;
    pub const MASTHEAD: u32 = 129;
    pub const COVER: u32 = 201;
    pub const THUMBNAIL: u32 = 202;
    pub const FAKE_COVER: u32 = 203;
    pub const CREATOR_SOFTWARE: u32 = 204;
    pub const CREATOR_MAJOR: u32 = 205;
    pub const CREATOR_MINOR: u32 = 206;
    pub const CREATOR_BUILD: u32 = 207;
    pub const CDE_TYPE: u32 = 501;
    pub const UPDATED_TITLE: u32 = 503;
    pub const ASIN_ALT: u32 = 504;
    pub const LANGUAGE: u32 = 524;
    pub const WRITING_MODE: u32 = 525;
    pub const CREATOR_BUILD_REV: u32 = 535;
}

/// Codes the reader and writer manage themselves; never copied through
/// `extra_exth`.
const COMPUTED: &[u32] = &[
    code::KF8_BOUNDARY,
    code::RESOURCE_COUNT,
    code::MASTHEAD,
    code::COVER,
    code::THUMBNAIL,
    code::FAKE_COVER,
];

/// Codes known to the format that the model does not break out; kept in
/// `extra_exth` without a warning.
const PASSTHROUGH: &[u32] = &[
    code::IMPRINT,
    code::REVIEW,
    code::START_READING,
    code::CREATOR_MAJOR,
    code::CREATOR_MINOR,
    code::CREATOR_BUILD,
    code::CDE_TYPE,
    code::ASIN_ALT,
    code::WRITING_MODE,
    code::CREATOR_BUILD_REV,
];

pub(crate) fn is_computed_code(code: u32) -> bool {
    COMPUTED.contains(&code)
}

/// Fill `metadata` from EXTH records. Returns the warnings raised.
pub(crate) fn read_metadata(
    exth: &ExthHeader,
    encoding: TextEncoding,
    metadata: &mut Metadata,
) -> Vec<Warning> {
    let mut warnings = Vec::new();
    let text = |data: &[u8]| encoding.decode(data).trim().to_string();

    for record in &exth.records {
        let data = record.data.as_slice();
        match record.code {
            code::AUTHOR => metadata.authors.push(text(data)),
            code::PUBLISHER => metadata.publisher = Some(text(data)),
            code::DESCRIPTION => metadata.description = Some(text(data)),
            code::ISBN => push_identifier(metadata, "isbn", text(data)),
            code::ASIN => push_identifier(metadata, "asin", text(data)),
            code::SUBJECT => metadata.subjects.extend(
                text(data)
                    .split(';')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            ),
            code::PUBDATE => metadata.pubdate = Some(text(data)),
            code::CONTRIBUTOR => metadata.contributors.push(text(data)),
            code::RIGHTS => metadata.rights = Some(text(data)),
            code::SOURCE => metadata.source = Some(text(data)),
            code::UPDATED_TITLE => metadata.title = text(data),
            code::LANGUAGE => metadata.language = Some(text(data)),
            code::CREATOR_SOFTWARE => {
                metadata.creator_software = exth_u32(data);
            }
            c if is_computed_code(c) => {}
            c if PASSTHROUGH.contains(&c) => metadata.extra_exth.push(record.clone()),
            c => {
                warnings.push(Warning::UnknownExthCode(c));
                metadata.extra_exth.push(record.clone());
            }
        }
    }
    warnings
}

fn push_identifier(metadata: &mut Metadata, scheme: &str, value: String) {
    if metadata.identifier(scheme).is_none() {
        metadata.identifiers.push(crate::book::Identifier {
            scheme: scheme.to_string(),
            value,
        });
    }
}

fn exth_u32(data: &[u8]) -> Option<u32> {
    data.get(..4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

/// EXTH records for the bibliographic part of `metadata`, in code order.
pub(crate) fn metadata_records(
    metadata: &Metadata,
    title: &str,
    encoding: TextEncoding,
) -> ExthHeader {
    let mut exth = ExthHeader::default();
    let mut text = |code: u32, value: &str| exth.push(code, encoding.encode(value));

    for author in &metadata.authors {
        text(code::AUTHOR, author);
    }
    if let Some(publisher) = &metadata.publisher {
        text(code::PUBLISHER, publisher);
    }
    if let Some(description) = &metadata.description {
        text(code::DESCRIPTION, description);
    }
    if let Some(isbn) = metadata.identifier("isbn") {
        text(code::ISBN, isbn);
    }
    for subject in &metadata.subjects {
        text(code::SUBJECT, subject);
    }
    if let Some(pubdate) = &metadata.pubdate {
        text(code::PUBDATE, pubdate);
    }
    for contributor in &metadata.contributors {
        text(code::CONTRIBUTOR, contributor);
    }
    if let Some(rights) = &metadata.rights {
        text(code::RIGHTS, rights);
    }
    if let Some(source) = &metadata.source {
        text(code::SOURCE, source);
    }
    if let Some(asin) = metadata.identifier("asin") {
        text(code::ASIN, asin);
    }
    text(code::UPDATED_TITLE, title);
    if let Some(language) = &metadata.language {
        text(code::LANGUAGE, language);
    }
    if let Some(software) = metadata.creator_software {
        exth.push_u32(code::CREATOR_SOFTWARE, software);
    }
    for record in &metadata.extra_exth {
        if !is_computed_code(record.code) {
            exth.records.push(record.clone());
        }
    }
    exth
}

/// Language tags and their Windows primary language ids.
const LANGUAGES: &[(&str, u32)] = &[
    ("ar", 0x01),
    ("bg", 0x02),
    ("ca", 0x03),
    ("zh", 0x04),
    ("cs", 0x05),
    ("da", 0x06),
    ("de", 0x07),
    ("el", 0x08),
    ("en", 0x09),
    ("es", 0x0A),
    ("fi", 0x0B),
    ("fr", 0x0C),
    ("he", 0x0D),
    ("hu", 0x0E),
    ("is", 0x0F),
    ("it", 0x10),
    ("ja", 0x11),
    ("ko", 0x12),
    ("nl", 0x13),
    ("nb", 0x14),
    ("pl", 0x15),
    ("pt", 0x16),
    ("ro", 0x18),
    ("ru", 0x19),
    ("hr", 0x1A),
    ("sk", 0x1B),
    ("sq", 0x1C),
    ("sv", 0x1D),
    ("th", 0x1E),
    ("tr", 0x1F),
    ("ur", 0x20),
    ("id", 0x21),
    ("uk", 0x22),
    ("be", 0x23),
    ("sl", 0x24),
    ("et", 0x25),
    ("lv", 0x26),
    ("lt", 0x27),
    ("fa", 0x29),
    ("vi", 0x2A),
    ("hy", 0x2B),
    ("eu", 0x2D),
    ("mk", 0x2F),
    ("af", 0x36),
    ("ka", 0x37),
    ("hi", 0x39),
    ("ms", 0x3E),
    ("sw", 0x41),
    ("bn", 0x45),
    ("ta", 0x49),
];

/// Regional variants as (language, region, sub-language id).
const REGIONS: &[(&str, &str, u32)] = &[
    ("en", "us", 1),
    ("en", "gb", 2),
    ("en", "au", 3),
    ("en", "ca", 4),
    ("en", "nz", 5),
    ("en", "ie", 6),
    ("fr", "fr", 1),
    ("fr", "be", 2),
    ("fr", "ca", 3),
    ("fr", "ch", 4),
    ("de", "de", 1),
    ("de", "ch", 2),
    ("de", "at", 3),
    ("es", "es", 1),
    ("es", "mx", 2),
    ("pt", "br", 1),
    ("pt", "pt", 2),
    ("zh", "tw", 1),
    ("zh", "cn", 2),
    ("zh", "hk", 3),
    ("nl", "nl", 1),
    ("nl", "be", 2),
    ("it", "it", 1),
    ("it", "ch", 2),
];

/// Windows LCID for an IANA language tag, 0 when unknown.
pub fn language_to_locale(tag: &str) -> u32 {
    let mut parts = tag.split(['-', '_']).map(str::to_ascii_lowercase);
    let Some(lang) = parts.next() else {
        return 0;
    };
    let lang = if lang == "no" { "nb".to_string() } else { lang };
    let Some(&(_, primary)) = LANGUAGES.iter().find(|(l, _)| *l == lang) else {
        return 0;
    };
    let sub = parts
        .next()
        .and_then(|region| {
            REGIONS
                .iter()
                .find(|(l, r, _)| *l == lang && *r == region)
                .map(|&(_, _, s)| s)
        })
        .unwrap_or(0);
    (sub << 10) | primary
}

/// IANA language tag for a Windows LCID.
pub fn locale_to_language(locale: u32) -> Option<String> {
    let primary = locale & 0x3FF;
    let sub = (locale >> 10) & 0x3F;
    let &(lang, _) = LANGUAGES.iter().find(|(_, p)| *p == primary)?;
    match REGIONS
        .iter()
        .find(|(l, _, s)| *l == lang && *s == sub)
    {
        Some((_, region, _)) => Some(format!("{lang}-{region}")),
        None => Some(lang.to_string()),
    }
}
