//! # mobikit
//!
//! Reader and writer for the Mobipocket family of ebook containers: PalmDOC
//! text, MOBI6 (`.mobi`), KF8 (`.azw3`) and dual MOBI6/KF8 files, plus APNX
//! page-map sidecars.
//!
//! ## Features
//!
//! - PalmDB container parsing and building
//! - PalmDOC (LZ77) and HUFF/CDIC text decompression, PalmDOC compression
//! - MOBI/EXTH headers, INDX navigation indices, KF8 skeleton/fragment layout
//! - Byte-exact text: `text_html` is never re-serialized
//! - APNX generation with several pagination strategies
//!
//! ## Quick Start
//!
//! ```no_run
//! use mobikit::{WriteOptions, read_mobi, write_mobi_to_path};
//!
//! let book = read_mobi("input.azw3")?;
//! println!("{} ({} bytes of text)", book.metadata.title, book.text_html.len());
//! write_mobi_to_path(&book, &WriteOptions::default().with_kf8(true), "output.azw3")?;
//! # Ok::<(), mobikit::Error>(())
//! ```
//!
//! ## Building a Book
//!
//! ```
//! use mobikit::{Book, Metadata, TocEntry, WriteOptions, parse_mobi, write_mobi};
//!
//! let text = "<html><body><h1>One</h1><p>First.</p><h1>Two</h1><p>Second.</p></body></html>";
//! let mut book = Book::with_text(
//!     Metadata::new("My Book").with_author("Author Name").with_language("en"),
//!     text,
//! );
//! book.toc.push_root(TocEntry::new("One", 12));
//! book.toc.push_root(TocEntry::new("Two", 37));
//!
//! let bytes = write_mobi(&book, &WriteOptions::default())?;
//! let back = parse_mobi(&bytes)?;
//! assert_eq!(back.text_html, book.text_html);
//! assert_eq!(back.toc.len(), 2);
//! # Ok::<(), mobikit::Error>(())
//! ```

pub mod apnx;
pub mod book;
pub mod error;
pub mod mobi;

pub use apnx::{ApnxFile, ApnxParams, ApnxPolicy, build_apnx, paginate, read_apnx};
pub use book::{
    Book, ExthRecord, FormatVersion, HtmlPart, Identifier, Metadata, PageEntry, PosFid,
    ResourceKind, ResourceRecord, TextEncoding, Toc, TocEntry, TrailingIndex,
};
pub use error::{Error, Result, Warning};
pub use mobi::{
    Tbs, TbsExtras, TextCompression, WriteOptions, parse_mobi, read_mobi, read_mobi_from_reader,
    write_mobi, write_mobi_to_path, write_mobi_to_writer,
};
