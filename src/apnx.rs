//! APNX page-map sidecar files.
//!
//! An APNX file maps human-visible page numbers to byte offsets in a
//! book's text. Layout:
//!
//! ```text
//! u32 0x00010001 | u32 page header offset | u32 content header length | content header JSON
//! u16 1 | u16 page header length | u16 page count | u16 32 | page header JSON | u32 offset * page count
//! ```

use std::borrow::Cow;
use std::str::FromStr;

use regex_lite::Regex;
use serde_json::{Value, json};

use crate::book::{Book, FormatVersion, PageEntry, TextEncoding};
use crate::error::{Error, Result};
use crate::mobi::{be_u16, be_u32};

const APNX_MAGIC: u32 = 0x0001_0001;
const PAGE_HEADER_VERSION: u16 = 1;
const OFFSET_BITS: u16 = 32;

/// How page boundaries are estimated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApnxPolicy {
    /// Fixed-size byte chunks.
    #[default]
    Fast,
    /// Visible characters laid out in lines, breaking at paragraphs.
    Accurate,
    /// Explicit page-break tags.
    PageBreak,
    /// Matches of a caller-supplied pattern.
    Regex,
}

impl FromStr for ApnxPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(ApnxPolicy::Fast),
            "accurate" => Ok(ApnxPolicy::Accurate),
            "pagebreak" => Ok(ApnxPolicy::PageBreak),
            "regex" => Ok(ApnxPolicy::Regex),
            other => Err(Error::Unsupported(format!("pagination policy {other:?}"))),
        }
    }
}

/// Pagination parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApnxParams {
    pub chars_per_page: usize,
    pub lines_per_page: usize,
    pub chars_per_line: usize,
    /// Divide the text into exactly this many pages with [`ApnxPolicy::Fast`].
    pub page_count: Option<usize>,
    /// Tag prefixes marking a page break, matched case-insensitively.
    pub pagebreak_tags: Vec<String>,
    /// Pattern for [`ApnxPolicy::Regex`]. Capture group 1, when present,
    /// is the page label.
    pub pattern: Option<String>,
    pub asin: String,
    pub cde_type: String,
}

impl Default for ApnxParams {
    fn default() -> Self {
        Self {
            chars_per_page: 2300,
            lines_per_page: 32,
            chars_per_line: 70,
            page_count: None,
            pagebreak_tags: vec!["<mbp:pagebreak".to_string()],
            pattern: None,
            asin: String::new(),
            cde_type: "EBOK".to_string(),
        }
    }
}

impl ApnxParams {
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_page_count(mut self, count: usize) -> Self {
        self.page_count = Some(count);
        self
    }

    pub fn with_asin(mut self, asin: impl Into<String>) -> Self {
        self.asin = asin.into();
        self
    }
}

/// Text decoded for searching, with a map back to source byte offsets.
struct TextView<'a> {
    text: Cow<'a, str>,
    /// Source offset of each byte of `text`, plus one for its end. `None`
    /// when the two coincide.
    origin: Option<Vec<usize>>,
}

impl<'a> TextView<'a> {
    fn new(bytes: &'a [u8], encoding: TextEncoding) -> Self {
        if encoding == TextEncoding::Utf8
            && let Ok(text) = std::str::from_utf8(bytes)
        {
            return Self {
                text: Cow::Borrowed(text),
                origin: None,
            };
        }

        let mut text = String::with_capacity(bytes.len());
        let mut origin = Vec::with_capacity(bytes.len() + 1);
        let mut push = |c: char, source: usize, text: &mut String| {
            text.push(c);
            origin.extend(std::iter::repeat_n(source, c.len_utf8()));
        };
        match encoding {
            TextEncoding::Cp1252 => {
                let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
                // Single-byte encoding: one char per source byte.
                for (i, c) in decoded.chars().enumerate() {
                    push(c, i, &mut text);
                }
            }
            TextEncoding::Utf8 => {
                let mut source = 0;
                for chunk in bytes.utf8_chunks() {
                    for (i, c) in chunk.valid().char_indices() {
                        push(c, source + i, &mut text);
                    }
                    source += chunk.valid().len();
                    if !chunk.invalid().is_empty() {
                        push(char::REPLACEMENT_CHARACTER, source, &mut text);
                        source += chunk.invalid().len();
                    }
                }
            }
        }
        origin.push(bytes.len());
        Self {
            text: Cow::Owned(text),
            origin: Some(origin),
        }
    }

    fn source(&self, pos: usize) -> usize {
        match &self.origin {
            Some(origin) => origin.get(pos).copied().unwrap_or(pos),
            None => pos,
        }
    }
}

fn numbered(offsets: Vec<usize>) -> Vec<PageEntry> {
    offsets
        .into_iter()
        .enumerate()
        .map(|(i, offset)| PageEntry {
            offset,
            label: (i + 1).to_string(),
        })
        .collect()
}

fn pages_fast(len: usize, params: &ApnxParams) -> Vec<PageEntry> {
    let offsets = match params.page_count {
        Some(count) if count > 0 => (0..count).map(|i| i * len / count).collect(),
        _ => (0..=len).step_by(params.chars_per_page.max(1)).collect(),
    };
    numbered(offsets)
}

/// Lowercase element name of `tag`, prefixed with `/` for closing tags.
fn tag_name(tag: &str) -> String {
    let body = tag.trim_start_matches('<');
    let (slash, body) = match body.strip_prefix('/') {
        Some(rest) => ("/", rest),
        None => ("", body),
    };
    let name: String = body
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == ':')
        .collect();
    format!("{slash}{}", name.to_ascii_lowercase())
}

fn is_block(name: &str) -> bool {
    matches!(
        name,
        "p" | "div" | "li" | "blockquote" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
    )
}

fn pages_accurate(view: &TextView<'_>, params: &ApnxParams) -> Vec<PageEntry> {
    let text = view.text.as_ref();
    let chars_per_line = params.chars_per_line.max(1);
    let mut offsets = vec![0];
    let (mut lines, mut line_chars, mut visible) = (0, 0, 0usize);
    let mut tag_start = None;

    for (i, c) in text.char_indices() {
        if let Some(start) = tag_start {
            if c != '>' {
                continue;
            }
            tag_start = None;
            let name = tag_name(&text[start..=i]);
            if let Some(closing) = name.strip_prefix('/') {
                if is_block(closing) && line_chars > 0 {
                    lines += 1;
                    line_chars = 0;
                }
            } else if name == "br" {
                lines += 1;
                line_chars = 0;
            } else if is_block(&name) && lines >= params.lines_per_page {
                let offset = view.source(start);
                if offset > offsets[offsets.len() - 1] {
                    offsets.push(offset);
                }
                lines = 0;
            }
            continue;
        }
        match c {
            '<' => tag_start = Some(i),
            '\n' | '\r' => {}
            _ => {
                visible += 1;
                line_chars += 1;
                if line_chars >= chars_per_line {
                    lines += 1;
                    line_chars = 0;
                }
            }
        }
    }

    if visible == 0 {
        return Vec::new();
    }
    numbered(offsets)
}

fn pages_pagebreak(text: &[u8], params: &ApnxParams) -> Vec<PageEntry> {
    let lower = text.to_ascii_lowercase();
    let mut breaks: Vec<usize> = params
        .pagebreak_tags
        .iter()
        .filter(|tag| !tag.is_empty())
        .flat_map(|tag| {
            let needle = tag.to_ascii_lowercase().into_bytes();
            memchr::memmem::find_iter(&lower, &needle).collect::<Vec<_>>()
        })
        .collect();
    if breaks.is_empty() {
        return Vec::new();
    }
    breaks.push(0);
    breaks.sort_unstable();
    breaks.dedup();
    numbered(breaks)
}

fn pages_regex(view: &TextView<'_>, params: &ApnxParams) -> Result<Vec<PageEntry>> {
    let Some(pattern) = params.pattern.as_deref() else {
        return Ok(Vec::new());
    };
    let re = Regex::new(pattern)?;
    let mut pages: Vec<PageEntry> = re
        .captures_iter(&view.text)
        .enumerate()
        .filter_map(|(i, caps)| {
            let whole = caps.get(0)?;
            let label = caps
                .get(1)
                .map_or_else(|| (i + 1).to_string(), |m| m.as_str().trim().to_string());
            Some(PageEntry {
                offset: view.source(whole.start()),
                label,
            })
        })
        .collect();
    pages.sort_by_key(|p| p.offset);
    Ok(pages)
}

/// Estimate page boundaries with `policy`, falling back through
/// page-break tags, the line estimate and fixed chunks when a strategy
/// finds nothing.
pub fn paginate(book: &Book, policy: ApnxPolicy, params: &ApnxParams) -> Result<Vec<PageEntry>> {
    let view = TextView::new(&book.text_html, book.text_encoding);
    let chain = [
        policy,
        ApnxPolicy::PageBreak,
        ApnxPolicy::Accurate,
        ApnxPolicy::Fast,
    ];

    let mut tried = Vec::with_capacity(chain.len());
    for current in chain {
        if tried.contains(&current) {
            continue;
        }
        tried.push(current);
        let pages = match current {
            ApnxPolicy::Fast => pages_fast(book.text_html.len(), params),
            ApnxPolicy::Accurate => pages_accurate(&view, params),
            ApnxPolicy::PageBreak => pages_pagebreak(&book.text_html, params),
            ApnxPolicy::Regex => pages_regex(&view, params)?,
        };
        if !pages.is_empty() {
            tracing::debug!(policy = ?current, pages = pages.len(), "paginated");
            return Ok(pages);
        }
        tracing::debug!(policy = ?current, "no pages found, falling back");
    }
    Ok(Vec::new())
}

fn roman_value(c: char) -> Option<u32> {
    Some(match c {
        'i' => 1,
        'v' => 5,
        'x' => 10,
        'l' => 50,
        'c' => 100,
        'd' => 500,
        'm' => 1000,
        _ => return None,
    })
}

fn to_roman(mut n: u32) -> String {
    const TABLE: &[(u32, &str)] = &[
        (1000, "m"),
        (900, "cm"),
        (500, "d"),
        (400, "cd"),
        (100, "c"),
        (90, "xc"),
        (50, "l"),
        (40, "xl"),
        (10, "x"),
        (9, "ix"),
        (5, "v"),
        (4, "iv"),
        (1, "i"),
    ];
    let mut out = String::new();
    for &(value, digits) in TABLE {
        while n >= value {
            out.push_str(digits);
            n -= value;
        }
    }
    out
}

/// Value of a canonical lowercase Roman numeral.
fn parse_roman(label: &str) -> Option<u32> {
    if label.is_empty() {
        return None;
    }
    let values: Vec<u32> = label.chars().map(roman_value).collect::<Option<_>>()?;
    let mut total = 0;
    for (i, &v) in values.iter().enumerate() {
        match values.get(i + 1) {
            Some(&next) if next > v => total -= v as i64,
            _ => total += v as i64,
        }
    }
    let total = u32::try_from(total).ok().filter(|&t| t > 0)?;
    (to_roman(total) == label).then_some(total)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Label {
    Arabic(u32),
    Roman(u32),
    Custom(String),
}

impl Label {
    fn classify(label: &str) -> Self {
        if let Ok(n) = label.parse::<u32>() {
            Label::Arabic(n)
        } else if let Some(n) = parse_roman(label) {
            Label::Roman(n)
        } else {
            Label::Custom(label.replace(['|', '(', ')', ','], "_"))
        }
    }

    fn continues(&self, previous: &Label) -> bool {
        match (previous, self) {
            (Label::Arabic(a), Label::Arabic(b)) | (Label::Roman(a), Label::Roman(b)) => {
                a.checked_add(1) == Some(*b)
            }
            (Label::Custom(_), Label::Custom(_)) => true,
            _ => false,
        }
    }
}

/// Page-map string: runs of `(first page, type, value)` with type `a`
/// (arabic), `r` (roman) or `c` (custom labels joined by `|`).
fn page_map(pages: &[PageEntry]) -> String {
    struct Run {
        start: usize,
        first: Label,
        last: Label,
        customs: Vec<String>,
    }

    let mut runs: Vec<Run> = Vec::new();
    for (i, page) in pages.iter().enumerate() {
        let label = Label::classify(page.label.trim());
        if let Some(run) = runs.last_mut()
            && label.continues(&run.last)
        {
            if let Label::Custom(text) = &label {
                run.customs.push(text.clone());
            }
            run.last = label;
            continue;
        }
        let customs = match &label {
            Label::Custom(text) => vec![text.clone()],
            _ => Vec::new(),
        };
        runs.push(Run {
            start: i + 1,
            first: label.clone(),
            last: label,
            customs,
        });
    }

    runs.iter()
        .map(|run| match run.first {
            Label::Arabic(n) => format!("({},a,{n})", run.start),
            Label::Roman(n) => format!("({},r,{n})", run.start),
            Label::Custom(_) => format!("({},c,{})", run.start, run.customs.join("|")),
        })
        .collect()
}

fn content_guid(text: &[u8]) -> String {
    let digest = sha1_smol::Sha1::from(text).digest().to_string();
    digest[..8].to_string()
}

/// Build an APNX sidecar for `book`.
pub fn build_apnx(book: &Book, policy: ApnxPolicy, params: &ApnxParams) -> Result<Vec<u8>> {
    let pages = paginate(book, policy, params)?;
    let format = match book.format_version {
        FormatVersion::Mobi6 => "MOBI_7",
        FormatVersion::Kf8 | FormatVersion::Dual => "MOBI_8",
    };

    let content_header = json!({
        "contentGuid": content_guid(&book.text_html),
        "asin": params.asin,
        "cdeType": params.cde_type,
        "format": format,
        "fileRevisionId": "1",
        "acr": "",
    })
    .to_string();
    let page_header = json!({
        "asin": params.asin,
        "pageMap": page_map(&pages),
    })
    .to_string();

    let too_long = |len: usize| Error::out_of_bounds(len, u16::MAX as usize);
    let page_header_len = u16::try_from(page_header.len()).map_err(|_| too_long(page_header.len()))?;
    let page_count = u16::try_from(pages.len()).map_err(|_| too_long(pages.len()))?;

    let mut out = Vec::with_capacity(24 + content_header.len() + page_header.len() + 4 * pages.len());
    out.extend_from_slice(&APNX_MAGIC.to_be_bytes());
    out.extend_from_slice(&(12 + content_header.len() as u32).to_be_bytes());
    out.extend_from_slice(&(content_header.len() as u32).to_be_bytes());
    out.extend_from_slice(content_header.as_bytes());
    out.extend_from_slice(&PAGE_HEADER_VERSION.to_be_bytes());
    out.extend_from_slice(&page_header_len.to_be_bytes());
    out.extend_from_slice(&page_count.to_be_bytes());
    out.extend_from_slice(&OFFSET_BITS.to_be_bytes());
    out.extend_from_slice(page_header.as_bytes());
    for page in &pages {
        let offset =
            u32::try_from(page.offset).map_err(|_| Error::out_of_bounds(page.offset, u32::MAX as usize))?;
        out.extend_from_slice(&offset.to_be_bytes());
    }

    tracing::debug!(pages = pages.len(), bytes = out.len(), "built APNX");
    Ok(out)
}

/// A parsed APNX file.
#[derive(Debug, Clone, PartialEq)]
pub struct ApnxFile {
    pub content_header: Value,
    pub page_header: Value,
    pub offsets: Vec<u32>,
}

impl ApnxFile {
    pub fn page_map(&self) -> Option<&str> {
        self.page_header.get("pageMap").and_then(Value::as_str)
    }

    pub fn format(&self) -> Option<&str> {
        self.content_header.get("format").and_then(Value::as_str)
    }
}

fn json_at(data: &[u8], start: usize, len: usize) -> Result<Value> {
    let bytes = data
        .get(start..start + len)
        .ok_or(Error::out_of_bounds(start + len, data.len()))?;
    serde_json::from_slice(bytes).map_err(|e| Error::header(format!("APNX header JSON: {e}")))
}

/// Parse an APNX file.
pub fn read_apnx(data: &[u8]) -> Result<ApnxFile> {
    let magic = be_u32(data, 0)?;
    if magic != APNX_MAGIC {
        return Err(Error::header(format!("APNX magic {magic:#010x}")));
    }
    let page_start = be_u32(data, 4)? as usize;
    let content_len = be_u32(data, 8)? as usize;
    let content_header = json_at(data, 12, content_len)?;

    let version = be_u16(data, page_start)?;
    if version != PAGE_HEADER_VERSION {
        return Err(Error::header(format!("APNX page header version {version}")));
    }
    let header_len = be_u16(data, page_start + 2)? as usize;
    let count = be_u16(data, page_start + 4)? as usize;
    let bits = be_u16(data, page_start + 6)?;
    if bits != OFFSET_BITS {
        return Err(Error::Unsupported(format!("{bits}-bit APNX offsets")));
    }
    let page_header = json_at(data, page_start + 8, header_len)?;

    let table = page_start + 8 + header_len;
    let offsets = (0..count)
        .map(|i| be_u32(data, table + 4 * i))
        .collect::<Result<Vec<_>>>()?;

    Ok(ApnxFile {
        content_header,
        page_header,
        offsets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::Metadata;

    fn book(text: &str) -> Book {
        Book::with_text(Metadata::new("Pages"), text)
    }

    fn offsets(pages: &[PageEntry]) -> Vec<usize> {
        pages.iter().map(|p| p.offset).collect()
    }

    #[test]
    fn test_fast_includes_text_end() {
        let pages = paginate(&book(&"a".repeat(11500)), ApnxPolicy::Fast, &ApnxParams::default())
            .unwrap();
        assert_eq!(offsets(&pages), vec![0, 2300, 4600, 6900, 9200, 11500]);
        assert_eq!(pages[5].label, "6");
    }

    #[test]
    fn test_fast_page_count() {
        let params = ApnxParams::default().with_page_count(4);
        let pages = paginate(&book(&"a".repeat(100)), ApnxPolicy::Fast, &params).unwrap();
        assert_eq!(offsets(&pages), vec![0, 25, 50, 75]);
    }

    #[test]
    fn test_pagebreak_tags() {
        let text = "<p>one</p><MBP:PAGEBREAK/><p>two</p><mbp:pagebreak/>";
        let pages = paginate(&book(text), ApnxPolicy::PageBreak, &ApnxParams::default()).unwrap();
        assert_eq!(offsets(&pages), vec![0, 10, 36]);
    }

    #[test]
    fn test_pagebreak_falls_back_to_accurate() {
        let text = "<p>short</p>";
        let pages = paginate(&book(text), ApnxPolicy::PageBreak, &ApnxParams::default()).unwrap();
        assert_eq!(offsets(&pages), vec![0]);
    }

    #[test]
    fn test_empty_text_falls_back_to_fast() {
        let pages = paginate(&book(""), ApnxPolicy::Accurate, &ApnxParams::default()).unwrap();
        assert_eq!(offsets(&pages), vec![0]);
    }

    #[test]
    fn test_accurate_breaks_at_paragraphs() {
        let params = ApnxParams {
            lines_per_page: 2,
            chars_per_line: 10,
            ..Default::default()
        };
        // Each paragraph is one line; a page holds two.
        let para = "<p>abcdefgh</p>";
        let text = para.repeat(5);
        let pages = paginate(&book(&text), ApnxPolicy::Accurate, &params).unwrap();
        assert_eq!(offsets(&pages), vec![0, 2 * para.len(), 4 * para.len()]);
    }

    #[test]
    fn test_regex_labels_and_cp1252_offsets() {
        let mut b = book("");
        b.text_encoding = TextEncoding::Cp1252;
        b.text_html = b"\xe9<a id=\"page-ii\"/>x<a id=\"page-7\"/>".to_vec();
        let params = ApnxParams::default().with_pattern(r#"id="page-([^"]+)""#);
        let pages = paginate(&b, ApnxPolicy::Regex, &params).unwrap();
        assert_eq!(offsets(&pages), vec![4, 22]);
        assert_eq!(pages[0].label, "ii");
        assert_eq!(pages[1].label, "7");
    }

    #[test]
    fn test_regex_invalid_pattern() {
        let params = ApnxParams::default().with_pattern("(unclosed");
        assert!(matches!(
            paginate(&book("x"), ApnxPolicy::Regex, &params),
            Err(Error::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_roman_numerals() {
        assert_eq!(parse_roman("xiv"), Some(14));
        assert_eq!(parse_roman("mcmxc"), Some(1990));
        assert_eq!(parse_roman("iiii"), None);
        assert_eq!(parse_roman("ab"), None);
        assert_eq!(to_roman(49), "xlix");
    }

    #[test]
    fn test_page_map_runs() {
        let pages: Vec<PageEntry> = ["i", "ii", "iii", "1", "2", "Plate", "Map", "3"]
            .iter()
            .enumerate()
            .map(|(i, label)| PageEntry {
                offset: i * 10,
                label: label.to_string(),
            })
            .collect();
        assert_eq!(page_map(&pages), "(1,r,1)(4,a,1)(6,c,Plate|Map)(8,a,3)");
    }

    #[test]
    fn test_build_and_read() {
        let b = book(&"a".repeat(11500));
        let params = ApnxParams::default().with_asin("B00TEST");
        let bytes = build_apnx(&b, ApnxPolicy::Fast, &params).unwrap();
        let apnx = read_apnx(&bytes).unwrap();
        assert_eq!(apnx.offsets, vec![0, 2300, 4600, 6900, 9200, 11500]);
        assert_eq!(apnx.page_map(), Some("(1,a,1)"));
        assert_eq!(apnx.format(), Some("MOBI_7"));
        assert_eq!(apnx.content_header["asin"], "B00TEST");
        assert_eq!(apnx.content_header["cdeType"], "EBOK");
        // Deterministic guid.
        assert_eq!(bytes, build_apnx(&b, ApnxPolicy::Fast, &params).unwrap());
    }

    #[test]
    fn test_read_rejects_bad_magic() {
        assert!(matches!(
            read_apnx(&[0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0]),
            Err(Error::CorruptHeader(_))
        ));
        assert!(read_apnx(&[0, 1]).is_err());
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("PageBreak".parse::<ApnxPolicy>().unwrap(), ApnxPolicy::PageBreak);
        assert!("nope".parse::<ApnxPolicy>().is_err());
    }
}
