//! MOBI 6 / KF8 / dual-format writer.
//!
//! Record layout of a MOBI 6 image:
//!
//! ```text
//! record 0 | text 1..=N | EOF stub | NCX + CNCX | resources | FLIS | FCIS | EOF
//! ```
//!
//! A KF8 image keeps the layout the Kindle tools use:
//!
//! ```text
//! record 0 | text 1..=N | resources | NCX + CNCX | skeleton | fragment + CNCX | FDST | FLIS | FCIS | EOF
//! ```
//!
//! A dual file is a MOBI 6 image, a `BOUNDARY` record and a KF8 image
//! without resources of its own.

use std::io::{self, Write};
use std::ops::Range;
use std::path::Path;

use crate::book::{Book, FormatVersion, ResourceKind, TextEncoding, Toc};
use crate::error::{Error, Result};

use super::headers::{
    self, Compression, ExthHeader, MobiHeader, NULL_INDEX, PalmDocHeader, code,
};
use super::index::{book_tbs, build_ncx};
use super::kf8::{Kf8Layout, build_fdst};
use super::palmdoc::{self, RECORD_SIZE};
use super::pdb::PdbBuilder;
use super::resources::{BOUNDARY_MAGIC, EOF_MAGIC, encode_font_record};
use super::trailing::{FLAG_INDEXING, FLAG_MULTIBYTE, build_trailer};

/// 8 KiB of zeros after the full name in record 0, as the Kindle tools
/// leave room for in-place header edits.
const RECORD0_PADDING: usize = 8192;

const FLIS: &[u8] =
    b"FLIS\0\0\0\x08\0\x41\0\0\0\0\0\0\xff\xff\xff\xff\0\x01\0\x03\0\0\0\x03\0\0\0\x01\xff\xff\xff\xff";

/// Text compression applied to the text records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextCompression {
    None,
    #[default]
    PalmDoc,
}

impl From<TextCompression> for Compression {
    fn from(value: TextCompression) -> Self {
        match value {
            TextCompression::None => Compression::None,
            TextCompression::PalmDoc => Compression::PalmDoc,
        }
    }
}

/// Options for [`write_mobi`].
///
/// # Example
///
/// ```
/// use mobikit::{TextCompression, WriteOptions};
///
/// let options = WriteOptions::default()
///     .with_kf8(true)
///     .with_compression(TextCompression::None)
///     .with_title("Override");
/// assert!(options.emit_kf8);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub compression: TextCompression,
    /// Write KF8. A book read as dual-format is written as dual again,
    /// anything else as KF8 only.
    pub emit_kf8: bool,
    /// Title written instead of `metadata.title`.
    pub force_title: Option<String>,
    /// PalmDB creation and modification date; 0 keeps output reproducible.
    pub timestamp: u32,
}

impl WriteOptions {
    pub fn with_compression(mut self, compression: TextCompression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_kf8(mut self, emit_kf8: bool) -> Self {
        self.emit_kf8 = emit_kf8;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.force_title = Some(title.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }

    fn target(&self, book: &Book) -> FormatVersion {
        match (self.emit_kf8, book.format_version) {
            (false, _) => FormatVersion::Mobi6,
            (true, FormatVersion::Dual) => FormatVersion::Dual,
            (true, _) => FormatVersion::Kf8,
        }
    }
}

/// Serialize `book` into a MOBI file image.
///
/// Output is a pure function of `book` and `options`.
pub fn write_mobi(book: &Book, options: &WriteOptions) -> Result<Vec<u8>> {
    book.validate()?;

    let target = options.target(book);
    let title = options
        .force_title
        .clone()
        .unwrap_or_else(|| book.metadata.title.clone());
    let resources = ResourceTable::new(book)?;
    let shared = Shared {
        book,
        options,
        target,
        unique_id: unique_id(&title, &book.text_html),
        title,
        resources,
    };

    let records = match target {
        FormatVersion::Mobi6 => SectionBuilder::mobi6(&shared)?.finish()?,
        FormatVersion::Kf8 => SectionBuilder::kf8(&shared, true)?.finish()?,
        FormatVersion::Dual => {
            let kf8 = SectionBuilder::kf8(&shared, false)?.finish()?;
            let mut mobi6 = SectionBuilder::mobi6(&shared)?;
            // KF8 record 0 follows the boundary record.
            let kf8_base = mobi6.records.len() + 1;
            mobi6.exth_extra.push_u32(code::KF8_BOUNDARY, kf8_base as u32);
            let mut records = mobi6.finish()?;
            records.push(BOUNDARY_MAGIC.to_vec());
            records.extend(kf8);
            records
        }
    };

    let bytes = PdbBuilder::new(&shared.title, *b"BOOK", *b"MOBI")
        .with_timestamp(options.timestamp)
        .build(&records)?;
    tracing::debug!(
        format = ?target,
        records = records.len(),
        bytes = bytes.len(),
        "wrote MOBI"
    );
    Ok(bytes)
}

/// Write `book` to any [`Write`] destination.
pub fn write_mobi_to_writer<W: Write>(
    book: &Book,
    options: &WriteOptions,
    writer: &mut W,
) -> Result<()> {
    writer.write_all(&write_mobi(book, options)?)?;
    writer.flush()?;
    Ok(())
}

/// Write `book` to a file at `path`.
pub fn write_mobi_to_path<P: AsRef<Path>>(
    book: &Book,
    options: &WriteOptions,
    path: P,
) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let mut writer = io::BufWriter::new(file);
    write_mobi_to_writer(book, options, &mut writer)
}

fn unique_id(title: &str, text: &[u8]) -> u32 {
    let mut sha = sha1_smol::Sha1::new();
    sha.update(title.as_bytes());
    sha.update(text);
    let digest = sha.digest().bytes();
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// State common to both halves of a dual file.
struct Shared<'a> {
    book: &'a Book,
    options: &'a WriteOptions,
    target: FormatVersion,
    title: String,
    unique_id: u32,
    resources: ResourceTable,
}

/// Resource payloads in record order, and where each book resource went.
struct ResourceTable {
    payloads: Vec<Vec<u8>>,
    /// Offset from the first resource record, per `book.resources` index.
    offsets: Vec<Option<u32>>,
}

impl ResourceTable {
    fn new(book: &Book) -> Result<Self> {
        let mut payloads = Vec::new();
        let mut offsets = Vec::with_capacity(book.resources.len());
        for (i, resource) in book.resources.iter().enumerate() {
            // The boundary record is regenerated for dual output.
            if resource.kind == ResourceKind::ContainerMarker {
                offsets.push(None);
                continue;
            }
            let payload = match (&resource.font, resource.kind) {
                (Some(font), ResourceKind::Font) if !resource.payload.starts_with(b"FONT") => {
                    encode_font_record(font)?
                }
                _ => resource.payload.clone(),
            };
            if payload.is_empty() {
                return Err(Error::InvariantViolation(format!(
                    "resource {i} has an empty payload"
                )));
            }
            offsets.push(Some(payloads.len() as u32));
            payloads.push(payload);
        }
        Ok(Self { payloads, offsets })
    }

    fn offset(&self, index: Option<usize>) -> Option<u32> {
        index.and_then(|i| self.offsets.get(i).copied().flatten())
    }
}

/// Bytes after `end` that complete a UTF-8 sequence started before it.
fn multibyte_overlap(text: &[u8], end: usize) -> &[u8] {
    let tail = &text[end..text.len().min(end + 3)];
    let n = tail.iter().take_while(|&&b| b & 0xC0 == 0x80).count();
    &tail[..n]
}

/// Compress each window of `text` and append its trailer.
fn build_text_records(
    text: &[u8],
    ranges: &[Range<usize>],
    compression: TextCompression,
    encoding: TextEncoding,
    indexing: Option<&[Vec<u8>]>,
) -> Vec<Vec<u8>> {
    ranges
        .iter()
        .enumerate()
        .map(|(i, range)| {
            let chunk = &text[range.clone()];
            let mut record = match compression {
                TextCompression::None => chunk.to_vec(),
                TextCompression::PalmDoc => palmdoc::compress(chunk),
            };
            let overlap = match encoding {
                TextEncoding::Utf8 => multibyte_overlap(text, range.end),
                TextEncoding::Cp1252 => &[],
            };
            let tbs = indexing.map(|payloads| payloads.get(i).map_or(&[][..], Vec::as_slice));
            record.extend(build_trailer(overlap, tbs));
            record
        })
        .collect()
}

/// Record windows over a text of `len` bytes.
fn record_ranges(len: usize) -> Vec<Range<usize>> {
    (0..len)
        .step_by(RECORD_SIZE)
        .map(|start| start..(start + RECORD_SIZE).min(len))
        .collect()
}

/// Indexing trailers read from the book, when they describe exactly the
/// `count` text records about to be written.
fn passthrough_tbs(book: &Book, count: usize) -> Option<Vec<Vec<u8>>> {
    let trailing = &book.trailing_indexes;
    let covers = trailing.len() == count
        && trailing.iter().enumerate().all(|(i, t)| t.record == i + 1);
    covers.then(|| trailing.iter().map(|t| t.raw.clone()).collect())
}

fn fcis(text_length: u32) -> Vec<u8> {
    let mut fcis = b"FCIS\0\0\0\x14\0\0\0\x10\0\0\0\x01\0\0\0\0".to_vec();
    fcis.extend_from_slice(&text_length.to_be_bytes());
    fcis.extend_from_slice(b"\0\0\0\0\0\0\0\x20\0\0\0\x08\0\x01\0\x01\0\0\0\0");
    fcis
}

fn text_length(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::TextRecordTooLarge { len })
}

/// Builds the records of one MOBI image, numbered from its record 0.
struct SectionBuilder<'a> {
    shared: &'a Shared<'a>,
    records: Vec<Vec<u8>>,
    header: MobiHeader,
    palmdoc: PalmDocHeader,
    /// EXTH records beyond the metadata ones.
    exth_extra: ExthHeader,
}

impl<'a> SectionBuilder<'a> {
    fn new(shared: &'a Shared<'a>, kf8: bool) -> Self {
        let mut header = MobiHeader::new(kf8);
        header.encoding = shared.book.text_encoding;
        header.unique_id = shared.unique_id;
        if let Some(language) = &shared.book.metadata.language {
            header.locale = headers::language_to_locale(language);
        }
        Self {
            shared,
            records: vec![Vec::new()], // record 0, built last
            header,
            palmdoc: PalmDocHeader {
                compression: shared.options.compression.into(),
                text_length: 0,
                record_count: 0,
                record_size: RECORD_SIZE as u16,
                encryption: 0,
            },
            exth_extra: ExthHeader::default(),
        }
    }

    fn relative(&self) -> u32 {
        self.records.len() as u32
    }

    /// The MOBI 6 image, alone or as the first half of a dual file.
    fn mobi6(shared: &'a Shared<'a>) -> Result<Self> {
        let book = shared.book;
        let mut builder = Self::new(shared, false);
        let toc = prepared_toc(&book.toc, book.text_html.len());

        // 1. Text
        let passthrough = shared.target == FormatVersion::Mobi6
            && book.format_version == FormatVersion::Mobi6;
        builder.push_text(&book.text_html, &toc, passthrough)?;

        // 2. EOF stub and navigation
        builder.records.push(EOF_MAGIC.to_vec());
        if !toc.is_empty() {
            builder.header.ncx_index = builder.relative();
            builder
                .records
                .extend(build_ncx(&toc, book.text_encoding, false)?);
        }

        // 3. Resources
        builder.push_resources();
        builder.header.last_content = if builder.header.first_image == NULL_INDEX {
            builder.palmdoc.record_count
        } else {
            u16::try_from(builder.records.len() - 1).map_err(|_| Error::TooManyRecords {
                count: builder.records.len(),
            })?
        };

        builder.push_tail();
        tracing::debug!(records = builder.records.len(), "built MOBI 6 image");
        Ok(builder)
    }

    /// The KF8 image; resources are written into it unless it is the
    /// second half of a dual file.
    fn kf8(shared: &'a Shared<'a>, with_resources: bool) -> Result<Self> {
        let book = shared.book;
        let mut builder = Self::new(shared, true);
        let layout = Kf8Layout::build(&book.text_html, &book.spine)?;

        // NCX offsets point into the stored stream.
        let mut toc = prepared_toc(&book.toc, book.text_html.len());
        for i in 0..toc.len() {
            if let Some(entry) = toc.get_mut(i) {
                entry.pos_fid = layout.pos_fid(entry.target_offset);
                entry.target_offset = layout.map.to_stored(entry.target_offset);
            }
        }

        // 1. Text
        let passthrough = shared.target == book.format_version;
        builder.push_text(&layout.stored, &toc, passthrough)?;

        // 2. Resources
        if with_resources {
            builder.push_resources();
        }

        // 3. Indices
        if !toc.is_empty() {
            builder.header.ncx_index = builder.relative();
            builder
                .records
                .extend(build_ncx(&toc, book.text_encoding, true)?);
        }
        builder.header.skeleton_index = builder.relative();
        builder
            .records
            .extend(layout.skeleton_index(book.text_encoding)?);
        builder.header.fragment_index = builder.relative();
        builder
            .records
            .extend(layout.fragment_index(book.text_encoding)?);

        // 4. Flow table
        builder.header.fdst_record = builder.relative();
        builder.header.fdst_count = layout.flows.len() as u32;
        builder.records.push(build_fdst(&layout.flows));

        builder.push_tail();
        tracing::debug!(
            skeletons = layout.skeletons.len(),
            flows = layout.flows.len(),
            stored_len = layout.stored.len(),
            "built KF8 image"
        );
        Ok(builder)
    }

    fn push_text(&mut self, text: &[u8], toc: &Toc, passthrough: bool) -> Result<()> {
        let ranges = record_ranges(text.len());
        let record_count = u16::try_from(ranges.len())
            .map_err(|_| Error::TextRecordTooLarge { len: text.len() })?;

        let indexing = if toc.is_empty() {
            None
        } else {
            let reused = passthrough
                .then(|| passthrough_tbs(self.shared.book, ranges.len()))
                .flatten();
            match reused {
                Some(reused) => Some(reused),
                None => Some(
                    ranges
                        .iter()
                        .map(|r| book_tbs(toc, r.start, r.end))
                        .collect::<Result<Vec<_>>>()?,
                ),
            }
        };
        self.header.extra_data_flags = if indexing.is_some() {
            FLAG_MULTIBYTE | FLAG_INDEXING
        } else {
            FLAG_MULTIBYTE
        };

        let records = build_text_records(
            text,
            &ranges,
            self.shared.options.compression,
            self.shared.book.text_encoding,
            indexing.as_deref(),
        );

        self.palmdoc.text_length = text_length(text.len())?;
        self.palmdoc.record_count = record_count;
        self.records.extend(records);
        self.header.first_non_book = self.relative();

        tracing::trace!(
            records = record_count,
            text_len = text.len(),
            indexed = indexing.is_some(),
            "built text records"
        );
        Ok(())
    }

    fn push_resources(&mut self) {
        let payloads = &self.shared.resources.payloads;
        if payloads.is_empty() {
            return;
        }
        self.header.first_image = self.relative();
        self.records.extend(payloads.iter().cloned());
    }

    fn push_tail(&mut self) {
        self.header.flis_record = self.relative();
        self.records.push(FLIS.to_vec());
        self.header.fcis_record = self.relative();
        self.records.push(fcis(self.palmdoc.text_length));
        self.records.push(EOF_MAGIC.to_vec());
    }

    fn exth(&self) -> ExthHeader {
        let Shared {
            book,
            title,
            resources,
            ..
        } = self.shared;
        let mut exth = headers::metadata_records(&book.metadata, title, book.text_encoding);
        exth.push_u32(code::RESOURCE_COUNT, resources.payloads.len() as u32);
        if let Some(offset) = resources.offset(book.cover_index) {
            exth.push_u32(code::COVER, offset);
        }
        if let Some(offset) = resources.offset(book.thumbnail_index) {
            exth.push_u32(code::THUMBNAIL, offset);
        }
        if let Some(offset) = resources.offset(book.masthead_index) {
            exth.push_u32(code::MASTHEAD, offset);
        }
        exth.records.extend(self.exth_extra.records.iter().cloned());
        exth
    }

    /// Build record 0 and return the finished records.
    fn finish(mut self) -> Result<Vec<Vec<u8>>> {
        let full_name = self.shared.book.text_encoding.encode(&self.shared.title);
        let exth = self.exth().to_bytes();

        self.header.full_name_offset =
            (headers::PALMDOC_HEADER_LEN + self.header.header_length as usize + exth.len()) as u32;
        self.header.full_name_length = full_name.len() as u32;

        let mut record0 = Vec::with_capacity(
            self.header.full_name_offset as usize + full_name.len() + 4 + RECORD0_PADDING,
        );
        self.palmdoc.write(&mut record0);
        record0.extend(self.header.to_bytes());
        record0.extend(exth);
        record0.extend(&full_name);
        record0.extend_from_slice(&[0, 0]);
        record0.resize(record0.len().next_multiple_of(4) + RECORD0_PADDING, 0);

        self.records[0] = record0;
        Ok(self.records)
    }
}

/// Breadth-first TOC with every length filled in.
fn prepared_toc(toc: &Toc, text_len: usize) -> Toc {
    let mut toc = toc.canonical_order();
    toc.resolve_lengths(text_len);
    toc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{HtmlPart, Metadata, ResourceRecord, TocEntry};
    use crate::mobi::parse_mobi;
    use crate::mobi::pdb::PdbFile;
    use crate::mobi::trailing::strip_trailing;

    fn sample_book(text: &str) -> Book {
        Book::with_text(Metadata::new("Sample").with_author("An Author"), text)
    }

    #[test]
    fn test_overlap_completes_split_character() {
        let text = "ab\u{20AC}".as_bytes(); // euro sign: E2 82 AC
        assert_eq!(multibyte_overlap(text, 3), &[0x82, 0xAC]);
        assert_eq!(multibyte_overlap(text, 2), &[] as &[u8]);
        assert_eq!(multibyte_overlap(text, 5), &[] as &[u8]);
    }

    #[test]
    fn test_text_records_strip_back_to_text() {
        let mut text = "x".repeat(RECORD_SIZE - 1);
        text.push('\u{20AC}');
        text.push_str("tail");
        let records = build_text_records(
            text.as_bytes(),
            &record_ranges(text.len()),
            TextCompression::None,
            TextEncoding::Utf8,
            None,
        );
        assert_eq!(records.len(), 2);
        let first = strip_trailing(&records[0], FLAG_MULTIBYTE).unwrap();
        assert_eq!(first.overlap, Some(&[0x82, 0xAC][..]));
        assert_eq!(first.text.len(), RECORD_SIZE);
        let second = strip_trailing(&records[1], FLAG_MULTIBYTE).unwrap();
        assert_eq!(second.text, &text.as_bytes()[RECORD_SIZE..]);
    }

    #[test]
    fn test_record0_layout() {
        let book = sample_book("<html><body>Hi</body></html>");
        let bytes = write_mobi(&book, &WriteOptions::default()).unwrap();
        let pdb = PdbFile::open(&bytes).unwrap();
        let record0 = pdb.record(0).unwrap();
        let header = MobiHeader::parse(record0).unwrap().unwrap();
        assert_eq!(header.header_length, headers::MOBI6_HEADER_LEN);
        assert_eq!(header.first_non_book, 2);
        assert_eq!(header.first_image, NULL_INDEX);
        assert_eq!(header.extra_data_flags, FLAG_MULTIBYTE);
        assert_eq!(header.full_name, b"Sample");
        assert!(record0.len() >= RECORD0_PADDING);
        assert_eq!(pdb.record(2).unwrap(), EOF_MAGIC);
        assert!(pdb.record(3).unwrap().starts_with(b"FLIS"));
        assert!(pdb.record(4).unwrap().starts_with(b"FCIS"));
        assert_eq!(pdb.record(5).unwrap(), EOF_MAGIC);
    }

    #[test]
    fn test_deterministic() {
        let book = sample_book("<p>Same bytes every time</p>");
        let options = WriteOptions::default();
        assert_eq!(
            write_mobi(&book, &options).unwrap(),
            write_mobi(&book, &options).unwrap()
        );
    }

    #[test]
    fn test_resources_and_cover() {
        let mut book = sample_book("<p>cover</p>");
        book.add_resource(ResourceRecord::image(b"\x89PNG\r\n\x1a\nfake".to_vec()));
        let cover = book.add_resource(ResourceRecord::image(b"\xFF\xD8\xFF\xE0jpeg".to_vec()));
        book.cover_index = Some(cover);

        let bytes = write_mobi(&book, &WriteOptions::default()).unwrap();
        let parsed = parse_mobi(&bytes).unwrap();
        assert_eq!(parsed.resources.len(), 2);
        assert_eq!(parsed.resources[1].kind, ResourceKind::Jpeg);
        assert_eq!(parsed.cover_index, Some(1));
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_empty_resource_rejected() {
        let mut book = sample_book("x");
        book.add_resource(ResourceRecord::new(ResourceKind::Unknown, Vec::new()));
        assert!(matches!(
            write_mobi(&book, &WriteOptions::default()),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_toc_enables_indexing_trailers() {
        let mut book = sample_book(&"<p>chapter</p>".repeat(600));
        book.toc.push_root(TocEntry::new("One", 0));
        book.toc.push_root(TocEntry::new("Two", 5000));

        let bytes = write_mobi(&book, &WriteOptions::default()).unwrap();
        let pdb = PdbFile::open(&bytes).unwrap();
        let header = MobiHeader::parse(pdb.record(0).unwrap()).unwrap().unwrap();
        assert_eq!(header.extra_data_flags, FLAG_MULTIBYTE | FLAG_INDEXING);
        assert_eq!(header.ncx_index, header.first_non_book + 1);

        let parsed = parse_mobi(&bytes).unwrap();
        assert_eq!(parsed.toc.len(), 2);
        assert_eq!(parsed.toc.get(1).unwrap().target_offset, 5000);
        assert_eq!(parsed.trailing_indexes.len(), 3);
        assert!(parsed.trailing_indexes.iter().all(|t| t.decoded.is_some()));
    }

    #[test]
    fn test_kf8_layout_and_dual_boundary() {
        let html = "<html><body><p>KF8</p></body></html>";
        let mut book = sample_book(html);
        book.spine = vec![HtmlPart::new(0, html.len(), Some("text/html"))];
        book.add_resource(ResourceRecord::image(b"GIF89a....".to_vec()));
        book.format_version = FormatVersion::Dual;

        let bytes = write_mobi(&book, &WriteOptions::default().with_kf8(true)).unwrap();
        let pdb = PdbFile::open(&bytes).unwrap();
        let record0 = pdb.record(0).unwrap();
        let header = MobiHeader::parse(record0).unwrap().unwrap();
        assert!(!header.is_kf8());
        let exth = ExthHeader::parse(&record0[header.exth_offset()..]).unwrap();
        let kf8_base = exth.get_u32(code::KF8_BOUNDARY).unwrap() as usize;
        assert_eq!(pdb.record(kf8_base - 1).unwrap(), BOUNDARY_MAGIC);
        let kf8 = MobiHeader::parse(pdb.record(kf8_base).unwrap()).unwrap().unwrap();
        assert!(kf8.is_kf8());
        assert_eq!(kf8.first_image, NULL_INDEX);

        let parsed = parse_mobi(&bytes).unwrap();
        assert_eq!(parsed.format_version, FormatVersion::Dual);
        assert_eq!(parsed.text_html, html.as_bytes());
        assert_eq!(parsed.resources.len(), 2);
        assert_eq!(parsed.resources[1].kind, ResourceKind::ContainerMarker);
    }

    #[test]
    fn test_font_resource_encoded() {
        let mut book = sample_book("x");
        let mut font = ResourceRecord::new(ResourceKind::Font, b"OTTO raw".to_vec());
        font.font = Some(b"OTTO raw".to_vec());
        book.add_resource(font);
        let table = ResourceTable::new(&book).unwrap();
        assert!(table.payloads[0].starts_with(b"FONT"));
    }
}
