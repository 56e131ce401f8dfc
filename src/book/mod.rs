//! In-memory book model shared by the reader and the writer.
//!
//! The reader builds a [`Book`] in one pass, callers may mutate it freely,
//! and the writer consumes it in one pass. Table-of-contents entries live in
//! a single arena ([`Toc`]); parent/child links are arena indices.

mod toc;

pub use toc::{PosFid, Toc, TocEntry};

use crate::error::{Error, Result, Warning};
use crate::mobi::Tbs;

/// A MOBI book: metadata, the stitched text stream, resources, and
/// navigation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Book {
    pub metadata: Metadata,
    /// The whole decompressed text stream, byte-exact.
    pub text_html: Vec<u8>,
    /// Encoding of `text_html` and of every string stored in the file.
    pub text_encoding: TextEncoding,
    pub resources: Vec<ResourceRecord>,
    pub spine: Vec<HtmlPart>,
    pub toc: Toc,
    pub page_map: Option<Vec<PageEntry>>,
    /// Index into `resources` of the cover image (EXTH 201).
    pub cover_index: Option<usize>,
    /// Index into `resources` of the thumbnail image (EXTH 202).
    pub thumbnail_index: Option<usize>,
    /// Index into `resources` of the periodical masthead (EXTH 129).
    pub masthead_index: Option<usize>,
    pub format_version: FormatVersion,
    /// Indexing trailer of each text record that carried one.
    pub trailing_indexes: Vec<TrailingIndex>,
    pub warnings: Vec<Warning>,
}

impl Book {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a single-part book around `text_html`.
    pub fn with_text(metadata: Metadata, text_html: impl Into<Vec<u8>>) -> Self {
        let text_html = text_html.into();
        let spine = vec![HtmlPart::new(0, text_html.len(), Some("text/html"))];
        Self {
            metadata,
            text_html,
            spine,
            ..Default::default()
        }
    }

    /// Text decoded to a Rust string according to `text_encoding`.
    pub fn text_utf8(&self) -> String {
        self.text_encoding.decode(&self.text_html)
    }

    /// Append a resource and return its index.
    pub fn add_resource(&mut self, resource: ResourceRecord) -> usize {
        self.resources.push(resource);
        self.resources.len() - 1
    }

    /// The cover resource, if any.
    pub fn cover(&self) -> Option<&ResourceRecord> {
        self.cover_index.and_then(|i| self.resources.get(i))
    }

    pub(crate) fn warn(&mut self, warning: Warning) {
        tracing::warn!("{warning}");
        self.warnings.push(warning);
    }

    /// Check the model invariants the writer relies on.
    pub fn validate(&self) -> Result<()> {
        let text_len = self.text_html.len();

        self.toc.validate(text_len)?;

        if let Some(pages) = &self.page_map {
            let mut last = 0;
            for (i, page) in pages.iter().enumerate() {
                if page.offset < last {
                    return Err(Error::InvariantViolation(format!(
                        "page {i} offset {} precedes the previous page",
                        page.offset
                    )));
                }
                if page.offset > text_len {
                    return Err(Error::InvariantViolation(format!(
                        "page {i} offset {} past end of text ({text_len})",
                        page.offset
                    )));
                }
                last = page.offset;
            }
        }

        let markers = self
            .resources
            .iter()
            .filter(|r| r.kind == ResourceKind::ContainerMarker)
            .count();
        if markers > 1 {
            return Err(Error::InvariantViolation(format!(
                "{markers} container markers, at most one allowed"
            )));
        }

        for (name, index) in [
            ("cover", self.cover_index),
            ("thumbnail", self.thumbnail_index),
            ("masthead", self.masthead_index),
        ] {
            if let Some(i) = index
                && i >= self.resources.len()
            {
                return Err(Error::InvariantViolation(format!(
                    "{name} index {i} but only {} resources",
                    self.resources.len()
                )));
            }
        }

        for (i, part) in self.spine.iter().enumerate() {
            if part.offset + part.length > text_len {
                return Err(Error::InvariantViolation(format!(
                    "spine part {i} ends at {} past end of text ({text_len})",
                    part.offset + part.length
                )));
            }
        }

        Ok(())
    }
}

/// Bibliographic metadata, mostly carried in EXTH records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub title: String,
    pub authors: Vec<String>,
    pub publisher: Option<String>,
    /// IANA language tag, e.g. `en` or `en-gb`.
    pub language: Option<String>,
    pub identifiers: Vec<Identifier>,
    pub pubdate: Option<String>,
    pub rights: Option<String>,
    pub subjects: Vec<String>,
    pub description: Option<String>,
    pub contributors: Vec<String>,
    pub source: Option<String>,
    /// EXTH 204, the id of the producing software.
    pub creator_software: Option<u32>,
    /// EXTH records the reader did not interpret, re-emitted verbatim.
    pub extra_exth: Vec<ExthRecord>,
}

impl Metadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = Some(publisher.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subjects.push(subject.into());
        self
    }

    pub fn with_identifier(mut self, scheme: impl Into<String>, value: impl Into<String>) -> Self {
        self.identifiers.push(Identifier {
            scheme: scheme.into(),
            value: value.into(),
        });
        self
    }

    /// First identifier with the given scheme (case-insensitive).
    pub fn identifier(&self, scheme: &str) -> Option<&str> {
        self.identifiers
            .iter()
            .find(|id| id.scheme.eq_ignore_ascii_case(scheme))
            .map(|id| id.value.as_str())
    }
}

/// A scheme/value identifier pair such as `isbn:9780000000000`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    pub scheme: String,
    pub value: String,
}

/// A raw EXTH record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExthRecord {
    pub code: u32,
    pub data: Vec<u8>,
}

/// Character encoding of the text and header strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    Cp1252,
    #[default]
    Utf8,
}

impl TextEncoding {
    pub fn from_codepage(codepage: u32) -> Option<Self> {
        match codepage {
            1252 => Some(TextEncoding::Cp1252),
            65001 => Some(TextEncoding::Utf8),
            _ => None,
        }
    }

    pub fn codepage(self) -> u32 {
        match self {
            TextEncoding::Cp1252 => 1252,
            TextEncoding::Utf8 => 65001,
        }
    }

    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            TextEncoding::Cp1252 => encoding_rs::WINDOWS_1252
                .decode_without_bom_handling(bytes)
                .0
                .into_owned(),
        }
    }

    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Cp1252 => encoding_rs::WINDOWS_1252.encode(text).0.into_owned(),
        }
    }
}

/// Which MOBI dialect(s) a file carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatVersion {
    #[default]
    Mobi6,
    Kf8,
    /// MOBI6 image followed by a KF8 image behind a boundary record.
    Dual,
}

/// Kind of a post-text record kept as a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Jpeg,
    Gif,
    Png,
    Bmp,
    Webp,
    Font,
    Audio,
    Video,
    /// The KF8 boundary record of a dual-format file.
    ContainerMarker,
    Unknown,
}

impl ResourceKind {
    pub fn is_image(self) -> bool {
        matches!(
            self,
            ResourceKind::Jpeg
                | ResourceKind::Gif
                | ResourceKind::Png
                | ResourceKind::Bmp
                | ResourceKind::Webp
        )
    }

    pub fn media_type(self) -> Option<&'static str> {
        match self {
            ResourceKind::Jpeg => Some("image/jpeg"),
            ResourceKind::Gif => Some("image/gif"),
            ResourceKind::Png => Some("image/png"),
            ResourceKind::Bmp => Some("image/bmp"),
            ResourceKind::Webp => Some("image/webp"),
            ResourceKind::Font => Some("font/ttf"),
            _ => None,
        }
    }
}

/// A record following the text that the book keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub kind: ResourceKind,
    /// The record bytes as stored in the file.
    pub payload: Vec<u8>,
    /// Clean TTF/OTF bytes for FONT records.
    pub font: Option<Vec<u8>>,
    /// Record number in the file this resource was read from or written to.
    pub record_number: Option<usize>,
}

impl ResourceRecord {
    pub fn new(kind: ResourceKind, payload: Vec<u8>) -> Self {
        Self {
            kind,
            payload,
            font: None,
            record_number: None,
        }
    }

    /// An image resource; the kind is sniffed from the magic bytes.
    pub fn image(payload: Vec<u8>) -> Self {
        let kind = crate::mobi::detect_image(&payload).unwrap_or(ResourceKind::Unknown);
        Self::new(kind, payload)
    }

    /// A font resource built from plain TTF/OTF bytes.
    pub fn from_font(font: Vec<u8>) -> Result<Self> {
        let payload = crate::mobi::encode_font_record(&font)?;
        Ok(Self {
            kind: ResourceKind::Font,
            payload,
            font: Some(font),
            record_number: None,
        })
    }
}

/// One page boundary of a page map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageEntry {
    /// Byte offset into `text_html`.
    pub offset: usize,
    /// Number, roman numeral, or free text.
    pub label: String,
}

/// A slice of `text_html` forming one reading-order document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlPart {
    pub offset: usize,
    pub length: usize,
    pub media_type: Option<String>,
}

impl HtmlPart {
    pub fn new(offset: usize, length: usize, media_type: Option<&str>) -> Self {
        Self {
            offset,
            length,
            media_type: media_type.map(str::to_string),
        }
    }

    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// The indexing trailer of one text record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrailingIndex {
    /// Record number (1-based, like the text records).
    pub record: usize,
    /// Trailer payload without its size suffix.
    pub raw: Vec<u8>,
    pub decoded: Option<Tbs>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_text_builds_single_part() {
        let book = Book::with_text(Metadata::new("T"), "<p>x</p>");
        assert_eq!(book.spine, vec![HtmlPart::new(0, 8, Some("text/html"))]);
        assert!(book.validate().is_ok());
    }

    #[test]
    fn test_cp1252_roundtrip() {
        let bytes = TextEncoding::Cp1252.encode("caf\u{e9} \u{2019}");
        assert_eq!(bytes, b"caf\xe9 \x92");
        assert_eq!(TextEncoding::Cp1252.decode(&bytes), "caf\u{e9} \u{2019}");
    }

    #[test]
    fn test_validate_rejects_bad_cover() {
        let mut book = Book::with_text(Metadata::new("T"), "abc");
        book.cover_index = Some(0);
        assert!(matches!(
            book.validate(),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_decreasing_pages() {
        let mut book = Book::with_text(Metadata::new("T"), "abcdef");
        book.page_map = Some(vec![
            PageEntry { offset: 4, label: "1".into() },
            PageEntry { offset: 2, label: "2".into() },
        ]);
        assert!(book.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_two_markers() {
        let mut book = Book::with_text(Metadata::new("T"), "abc");
        book.add_resource(ResourceRecord::new(ResourceKind::ContainerMarker, b"BOUNDARY".to_vec()));
        book.add_resource(ResourceRecord::new(ResourceKind::ContainerMarker, b"BOUNDARY".to_vec()));
        assert!(book.validate().is_err());
    }

    #[test]
    fn test_metadata_identifier_lookup() {
        let meta = Metadata::new("T").with_identifier("ISBN", "123");
        assert_eq!(meta.identifier("isbn"), Some("123"));
        assert_eq!(meta.identifier("asin"), None);
    }
}
