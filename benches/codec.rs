//! Benchmarks for the MOBI codec.
//!
//! Run with: cargo bench

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};

use mobikit::mobi::palmdoc;
use mobikit::{
    ApnxParams, ApnxPolicy, Book, FormatVersion, Metadata, TocEntry, WriteOptions, build_apnx,
    parse_mobi, write_mobi,
};

/// A synthetic book of `chapters` chapters, each a few KiB of HTML.
fn sample_book(chapters: usize) -> Book {
    let paragraph = "<p>It was a bright cold day in April, and the clocks were striking thirteen. \
                     Caf\u{e9} \u{2014} na\u{ef}ve.</p>\n";
    let mut text = String::from("<html><head><title>Bench</title></head><body>");
    let mut offsets = Vec::with_capacity(chapters);
    for chapter in 0..chapters {
        offsets.push(text.len());
        text.push_str(&format!("<h1>Chapter {chapter}</h1>"));
        text.push_str(&paragraph.repeat(40));
        text.push_str("<mbp:pagebreak/>");
    }
    text.push_str("</body></html>");

    let mut book = Book::with_text(Metadata::new("Bench").with_author("Someone"), text);
    for (chapter, offset) in offsets.into_iter().enumerate() {
        book.toc.push_root(TocEntry::new(format!("Chapter {chapter}"), offset));
    }
    book
}

// ============================================================================
// Text compression
// ============================================================================

fn bench_palmdoc(c: &mut Criterion) {
    let book = sample_book(1);
    let record = &book.text_html[..palmdoc::RECORD_SIZE.min(book.text_html.len())];
    let compressed = palmdoc::compress(record);

    c.bench_function("palmdoc_compress", |b| {
        b.iter(|| palmdoc::compress(black_box(record)));
    });
    c.bench_function("palmdoc_decompress", |b| {
        b.iter(|| palmdoc::decompress(black_box(&compressed)).unwrap());
    });
}

// ============================================================================
// Container I/O
// ============================================================================

fn bench_write(c: &mut Criterion) {
    let book = sample_book(50);
    let options = WriteOptions::default();
    c.bench_function("write_mobi6", |b| {
        b.iter(|| write_mobi(black_box(&book), &options).unwrap());
    });

    let mut dual = book.clone();
    dual.format_version = FormatVersion::Dual;
    let options = WriteOptions::default().with_kf8(true);
    c.bench_function("write_dual", |b| {
        b.iter(|| write_mobi(black_box(&dual), &options).unwrap());
    });
}

fn bench_parse(c: &mut Criterion) {
    let book = sample_book(50);
    let mobi6 = write_mobi(&book, &WriteOptions::default()).unwrap();
    c.bench_function("parse_mobi6", |b| {
        b.iter(|| parse_mobi(black_box(&mobi6)).unwrap());
    });

    let mut dual = book;
    dual.format_version = FormatVersion::Dual;
    let bytes = write_mobi(&dual, &WriteOptions::default().with_kf8(true)).unwrap();
    c.bench_function("parse_dual", |b| {
        b.iter(|| parse_mobi(black_box(&bytes)).unwrap());
    });
}

fn bench_apnx(c: &mut Criterion) {
    let book = sample_book(50);
    let params = ApnxParams::default();
    c.bench_function("apnx_accurate", |b| {
        b.iter(|| build_apnx(black_box(&book), ApnxPolicy::Accurate, &params).unwrap());
    });
}

criterion_group!(
    benches,
    bench_palmdoc,
    bench_write,
    bench_parse,
    bench_apnx,
);

criterion_main!(benches);
