//! Write/read round trips for each container flavour.

use mobikit::{
    Book, ExthRecord, FormatVersion, HtmlPart, Metadata, ResourceKind, ResourceRecord,
    TextCompression, TextEncoding, Toc, TocEntry, Warning, WriteOptions, parse_mobi,
    read_mobi, read_mobi_from_reader, write_mobi, write_mobi_to_path, write_mobi_to_writer,
};

const CH1: &str = "<html><head><title>One</title></head><body><h1>One</h1><p>First chapter.</p></body></html>";
const CH2: &str = "<html><body class=\"c\"><h1>Two</h1><p>Second chapter, longer.</p></body></html>";
const CSS: &str = "h1 { text-align: center }";

fn chapter_book() -> Book {
    let text = format!("{CH1}{CH2}{CSS}");
    let mut book = Book::with_text(
        Metadata::new("Two Chapters")
            .with_author("First Author")
            .with_author("Second Author")
            .with_language("en-gb")
            .with_publisher("Small Press")
            .with_subject("Fiction")
            .with_identifier("isbn", "9780000000002"),
        text,
    );
    book.spine = vec![
        HtmlPart::new(0, CH1.len(), Some("text/html")),
        HtmlPart::new(CH1.len(), CH2.len(), Some("text/html")),
        HtmlPart::new(CH1.len() + CH2.len(), CSS.len(), Some("text/css")),
    ];
    book.toc.push_root(TocEntry::new("One", 0));
    book.toc.push_root(TocEntry::new("Two", CH1.len()));
    book
}

/// Long UTF-8 text so that multibyte characters straddle record edges.
fn long_utf8_book() -> Book {
    let paragraph = "<p>Ünïcödé text \u{2014} with a euro \u{20AC} sign.</p>\n";
    let mut text = String::from("<html><body>");
    let mut toc = Vec::new();
    for chapter in 0..8 {
        toc.push((format!("Chapter {chapter}"), text.len()));
        text.push_str(&format!("<h2>Chapter {chapter}</h2>"));
        text.push_str(&paragraph.repeat(60));
    }
    text.push_str("</body></html>");

    let mut book = Book::with_text(Metadata::new("Unicode"), text);
    for (title, offset) in toc {
        book.toc.push_root(TocEntry::new(title, offset));
    }
    book
}

fn toc_triples(book: &Book) -> Vec<(String, usize, usize)> {
    book.toc
        .iter()
        .map(|e| (e.title.clone(), e.target_offset, e.length))
        .collect()
}

#[test]
fn test_mobi6_multi_record_text() {
    let book = long_utf8_book();
    assert!(book.text_html.len() > 4 * 4096);

    for compression in [TextCompression::PalmDoc, TextCompression::None] {
        let options = WriteOptions::default().with_compression(compression);
        let parsed = parse_mobi(&write_mobi(&book, &options).unwrap()).unwrap();
        assert_eq!(parsed.text_html, book.text_html);
        assert_eq!(parsed.text_encoding, TextEncoding::Utf8);
        assert_eq!(parsed.format_version, FormatVersion::Mobi6);
        assert_eq!(parsed.toc.len(), 8);
        assert_eq!(parsed.toc.get(3).unwrap().target_offset, book.toc.get(3).unwrap().target_offset);
        assert!(!parsed.trailing_indexes.is_empty());
        assert!(parsed.warnings.is_empty(), "{:?}", parsed.warnings);
    }
}

#[test]
fn test_mobi6_rewrite_is_stable() {
    let book = long_utf8_book();
    let options = WriteOptions::default();
    let first = write_mobi(&book, &options).unwrap();
    let parsed = parse_mobi(&first).unwrap();
    let second = write_mobi(&parsed, &options).unwrap();
    let reparsed = parse_mobi(&second).unwrap();

    assert_eq!(reparsed.text_html, parsed.text_html);
    assert_eq!(toc_triples(&reparsed), toc_triples(&parsed));
    assert_eq!(reparsed.trailing_indexes, parsed.trailing_indexes);
}

#[test]
fn test_cp1252_text_and_metadata() {
    let mut book = Book::with_text(
        Metadata::new("Caf\u{e9}").with_author("Ren\u{e9}e"),
        TextEncoding::Cp1252.encode("<p>D\u{e9}j\u{e0} vu \u{2019}quoted\u{2019}</p>"),
    );
    book.text_encoding = TextEncoding::Cp1252;

    let parsed = parse_mobi(&write_mobi(&book, &WriteOptions::default()).unwrap()).unwrap();
    assert_eq!(parsed.text_encoding, TextEncoding::Cp1252);
    assert_eq!(parsed.text_html, book.text_html);
    assert_eq!(parsed.metadata.title, "Caf\u{e9}");
    assert_eq!(parsed.metadata.authors, vec!["Ren\u{e9}e".to_string()]);
    assert_eq!(parsed.text_utf8(), "<p>D\u{e9}j\u{e0} vu \u{2019}quoted\u{2019}</p>");
}

#[test]
fn test_metadata_roundtrip() {
    let mut book = chapter_book();
    book.metadata.description = Some("A short description".into());
    book.metadata.pubdate = Some("2020-01-01".into());
    book.metadata.rights = Some("CC0".into());
    book.metadata.extra_exth.push(ExthRecord {
        code: 9999,
        data: b"opaque".to_vec(),
    });

    let parsed = parse_mobi(&write_mobi(&book, &WriteOptions::default()).unwrap()).unwrap();
    let meta = &parsed.metadata;
    assert_eq!(meta.title, "Two Chapters");
    assert_eq!(meta.authors, book.metadata.authors);
    assert_eq!(meta.publisher.as_deref(), Some("Small Press"));
    assert_eq!(meta.language.as_deref(), Some("en-gb"));
    assert_eq!(meta.subjects, vec!["Fiction".to_string()]);
    assert_eq!(meta.identifier("ISBN"), Some("9780000000002"));
    assert_eq!(meta.description.as_deref(), Some("A short description"));
    assert_eq!(meta.pubdate.as_deref(), Some("2020-01-01"));
    assert_eq!(meta.rights.as_deref(), Some("CC0"));
    assert!(meta.extra_exth.iter().any(|r| r.code == 9999 && r.data == b"opaque"));
    assert!(parsed.warnings.contains(&Warning::UnknownExthCode(9999)));
}

#[test]
fn test_forced_title() {
    let book = chapter_book();
    let options = WriteOptions::default().with_title("Renamed");
    let parsed = parse_mobi(&write_mobi(&book, &options).unwrap()).unwrap();
    assert_eq!(parsed.metadata.title, "Renamed");
}

#[test]
fn test_kf8_only_roundtrip() {
    let mut book = chapter_book();
    book.format_version = FormatVersion::Kf8;
    book.add_resource(ResourceRecord::image(b"\x89PNG\r\n\x1a\nimage".to_vec()));
    book.cover_index = Some(0);

    let bytes = write_mobi(&book, &WriteOptions::default().with_kf8(true)).unwrap();
    let parsed = parse_mobi(&bytes).unwrap();

    assert_eq!(parsed.format_version, FormatVersion::Kf8);
    assert_eq!(parsed.text_html, book.text_html);
    assert_eq!(parsed.spine, book.spine);
    assert_eq!(parsed.resources.len(), 1);
    assert_eq!(parsed.resources[0].kind, ResourceKind::Png);
    assert_eq!(parsed.cover_index, Some(0));

    assert_eq!(
        parsed.toc.iter().map(|e| e.target_offset).collect::<Vec<_>>(),
        vec![0, CH1.len()]
    );
    assert!(parsed.toc.iter().all(|e| e.pos_fid.is_some()));
    assert!(parsed.warnings.is_empty(), "{:?}", parsed.warnings);
}

#[test]
fn test_dual_roundtrip() {
    let mut book = chapter_book();
    book.format_version = FormatVersion::Dual;
    book.add_resource(ResourceRecord::image(b"GIF89aimage".to_vec()));

    let options = WriteOptions::default().with_kf8(true);
    let parsed = parse_mobi(&write_mobi(&book, &options).unwrap()).unwrap();
    assert_eq!(parsed.format_version, FormatVersion::Dual);
    assert_eq!(parsed.text_html, book.text_html);
    assert_eq!(parsed.metadata.title, "Two Chapters");
    let kinds: Vec<_> = parsed.resources.iter().map(|r| r.kind).collect();
    assert_eq!(kinds, vec![ResourceKind::Gif, ResourceKind::ContainerMarker]);

    // The marker is regenerated, not duplicated.
    let again = parse_mobi(&write_mobi(&parsed, &options).unwrap()).unwrap();
    assert_eq!(again.text_html, book.text_html);
    assert_eq!(again.resources, parsed.resources);
    assert_eq!(toc_triples(&again), toc_triples(&parsed));
}

#[test]
fn test_dual_book_written_as_mobi6() {
    let mut book = chapter_book();
    book.format_version = FormatVersion::Dual;
    let parsed = parse_mobi(&write_mobi(&book, &WriteOptions::default()).unwrap()).unwrap();
    assert_eq!(parsed.format_version, FormatVersion::Mobi6);
    assert_eq!(parsed.text_html, book.text_html);
}

#[test]
fn test_font_resource_roundtrip() {
    let font = b"\0\x01\0\0 pretend truetype tables".repeat(20);
    let mut book = chapter_book();
    book.add_resource(ResourceRecord::from_font(font.clone()).unwrap());

    let parsed = parse_mobi(&write_mobi(&book, &WriteOptions::default()).unwrap()).unwrap();
    assert_eq!(parsed.resources.len(), 1);
    assert_eq!(parsed.resources[0].kind, ResourceKind::Font);
    assert_eq!(parsed.resources[0].font.as_deref(), Some(font.as_slice()));
}

#[test]
fn test_file_helpers() {
    let book = chapter_book();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("book.mobi");

    write_mobi_to_path(&book, &WriteOptions::default(), &path).unwrap();
    let from_path = read_mobi(&path).unwrap();
    assert_eq!(from_path.text_html, book.text_html);

    let mut buffer = Vec::new();
    write_mobi_to_writer(&book, &WriteOptions::default(), &mut buffer).unwrap();
    assert_eq!(buffer, std::fs::read(&path).unwrap());
    let from_reader = read_mobi_from_reader(buffer.as_slice()).unwrap();
    assert_eq!(from_reader, from_path);
}

#[test]
fn test_dangling_toc_link_rejected() {
    let mut book = chapter_book();
    book.toc = Toc::from_entries(vec![
        TocEntry {
            parent: Some(1),
            ..TocEntry::new("One", 0)
        },
        TocEntry {
            parent: Some(99),
            ..TocEntry::new("Two", 0)
        },
    ]);
    assert!(matches!(
        write_mobi(&book, &WriteOptions::default()),
        Err(mobikit::Error::InvariantViolation(_))
    ));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        read_mobi(dir.path().join("absent.mobi")),
        Err(mobikit::Error::Io(_))
    ));
}
