//! Error and warning types for mobikit operations.
//!
//! Structural and capacity problems are [`Error`]s and abort the whole parse
//! or write. Semantic oddities are [`Warning`]s collected on the
//! [`Book`](crate::Book) and never raised.

use thiserror::Error;

/// Fatal errors raised while reading or writing a MOBI container.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt header: {0}")]
    CorruptHeader(String),

    #[error("bad index magic in record {record}: expected {expected}")]
    BadIndexMagic { record: usize, expected: &'static str },

    #[error("TAGX table is not EOF-terminated")]
    TagxNotEofTerminated,

    #[error("index entry length mismatch: {0}")]
    EntryLengthMismatch(String),

    #[error("PalmDOC record decompresses past {limit} bytes")]
    PalmDocRecordOverflow { limit: usize },

    #[error("corrupt HUFF/CDIC dictionary: {0}")]
    CorruptHuffmanDict(String),

    #[error("offset {offset} out of bounds (limit {limit})")]
    OffsetOutOfBounds { offset: usize, limit: usize },

    #[error("too many records: {count} (limit 65535)")]
    TooManyRecords { count: usize },

    #[error("text too large: {len} bytes")]
    TextRecordTooLarge { len: usize },

    #[error("book invariant violated: {0}")]
    InvariantViolation(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("invalid page pattern: {0}")]
    InvalidPattern(#[from] regex_lite::Error),
}

impl Error {
    pub(crate) fn header(msg: impl Into<String>) -> Self {
        Error::CorruptHeader(msg.into())
    }

    pub(crate) fn out_of_bounds(offset: usize, limit: usize) -> Self {
        Error::OffsetOutOfBounds { offset, limit }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Non-fatal problems found while reading a book.
///
/// The affected field is left empty and processing continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// EXTH record with a type the reader does not interpret. The record is
    /// kept verbatim in [`Metadata::extra_exth`](crate::Metadata::extra_exth).
    UnknownExthCode(u32),
    /// Index entry carried a tag id with no known meaning.
    UnknownTagId { entry: usize, tag: u8 },
    /// Index entry referenced a CNCX offset that holds no string.
    UnreadableCncx { entry: usize, offset: u32 },
    /// Index entry had non-zero bytes after its last tag value.
    TrailingIndexBytes { entry: usize, count: usize },
    /// EXTH 201 points at a record that is not a resource.
    MissingCoverResource { record: usize },
    /// EXTH 202 points at a record that is not a resource.
    MissingThumbnailResource { record: usize },
    /// EXTH 129 points at a record that is not a resource.
    MissingMastheadResource { record: usize },
    /// Decompressed text length differs from the PalmDOC header.
    TextLengthMismatch { declared: usize, actual: usize },
    /// FONT record could not be decoded; the raw payload is kept.
    FontDecodeFailed { record: usize },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::UnknownExthCode(code) => write!(f, "unknown EXTH code {code}"),
            Warning::UnknownTagId { entry, tag } => {
                write!(f, "index entry {entry}: unknown tag id {tag}")
            }
            Warning::UnreadableCncx { entry, offset } => {
                write!(f, "index entry {entry}: no CNCX string at {offset:#x}")
            }
            Warning::TrailingIndexBytes { entry, count } => {
                write!(f, "index entry {entry}: {count} unprocessed bytes")
            }
            Warning::MissingCoverResource { record } => {
                write!(f, "cover record {record} is not a resource")
            }
            Warning::MissingThumbnailResource { record } => {
                write!(f, "thumbnail record {record} is not a resource")
            }
            Warning::MissingMastheadResource { record } => {
                write!(f, "masthead record {record} is not a resource")
            }
            Warning::TextLengthMismatch { declared, actual } => {
                write!(f, "header declares {declared} text bytes, decoded {actual}")
            }
            Warning::FontDecodeFailed { record } => {
                write!(f, "font record {record} could not be decoded")
            }
        }
    }
}
