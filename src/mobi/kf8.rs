//! KF8 text layout.
//!
//! A KF8 text stream is split into flows by the FDST record. Flow 0 holds
//! the HTML files, each stored as a skeleton (the document with its body
//! content cut out) followed by the fragments that get inserted back into
//! it. The skeleton and fragment indices describe where each piece lives.
//! Later flows hold stylesheets and SVG images verbatim.
//!
//! [`Book::text_html`](crate::Book::text_html) holds the reassembled files
//! followed by the extra flows; [`OffsetMap`] translates between those
//! positions and positions in the stored stream.

use std::ops::Range;

use crate::book::{HtmlPart, PosFid, TextEncoding};
use crate::error::{Error, Result, Warning};

use super::be_u32;
use super::index::{CncxBuilder, IndexBuilder, TagMap, Tagx, TagxEntry, read_index};
use super::pdb::PdbFile;

/// Media type given to reassembled HTML files.
pub const HTML_MEDIA_TYPE: &str = "text/html";
const FRAGMENT_SELECTOR: &str = "P-//body";

const SKELETON_TAGX: &[TagxEntry] = &[
    TagxEntry::new(1, 1, 0x03),
    TagxEntry::new(6, 2, 0x0C),
    TagxEntry::EOF,
];

const FRAGMENT_TAGX: &[TagxEntry] = &[
    TagxEntry::new(2, 1, 0x01),
    TagxEntry::new(3, 1, 0x02),
    TagxEntry::new(4, 1, 0x04),
    TagxEntry::new(6, 2, 0x08),
    TagxEntry::EOF,
];

/// One skeleton index entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skeleton {
    pub name: String,
    pub fragment_count: usize,
    /// Position of the skeleton in the stored stream.
    pub start: usize,
    pub length: usize,
}

/// One fragment index entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Absolute insertion point: skeleton start plus the offset inside the
    /// partially assembled file.
    pub insert_pos: usize,
    pub selector: String,
    pub file_number: u32,
    pub sequence: u32,
    /// Offset among the fragments of the same skeleton.
    pub start: usize,
    pub length: usize,
}

// ============================================================================
// FDST
// ============================================================================

/// Parse an FDST record into flow ranges.
pub fn parse_fdst(record: &[u8]) -> Result<Vec<Range<usize>>> {
    if !record.starts_with(b"FDST") {
        return Err(Error::header("FDST record has wrong magic"));
    }
    let table = be_u32(record, 4)? as usize;
    let count = be_u32(record, 8)? as usize;
    let mut flows = Vec::with_capacity(count.min(record.len() / 8));
    for i in 0..count {
        let at = table + 8 * i;
        let start = be_u32(record, at)? as usize;
        let end = be_u32(record, at + 4)? as usize;
        if end < start {
            return Err(Error::header(format!("FDST flow {i} ends before it starts")));
        }
        flows.push(start..end);
    }
    Ok(flows)
}

pub fn build_fdst(flows: &[Range<usize>]) -> Vec<u8> {
    let mut record = Vec::with_capacity(12 + 8 * flows.len());
    record.extend_from_slice(b"FDST");
    record.extend_from_slice(&12u32.to_be_bytes());
    record.extend_from_slice(&(flows.len() as u32).to_be_bytes());
    for flow in flows {
        record.extend_from_slice(&(flow.start as u32).to_be_bytes());
        record.extend_from_slice(&(flow.end as u32).to_be_bytes());
    }
    record
}

// ============================================================================
// Offset translation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    stored: usize,
    assembled: usize,
    len: usize,
}

/// Piecewise mapping between stored-stream and assembled-text positions.
/// Positions outside every segment map to themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetMap {
    segments: Vec<Segment>,
}

impl OffsetMap {
    fn push(&mut self, stored: usize, assembled: usize, len: usize) {
        if len > 0 {
            self.segments.push(Segment {
                stored,
                assembled,
                len,
            });
        }
    }

    pub fn to_assembled(&self, stored: usize) -> usize {
        self.segments
            .iter()
            .find(|s| (s.stored..s.stored + s.len).contains(&stored))
            .map_or(stored, |s| s.assembled + (stored - s.stored))
    }

    pub fn to_stored(&self, assembled: usize) -> usize {
        self.segments
            .iter()
            .find(|s| (s.assembled..s.assembled + s.len).contains(&assembled))
            .map_or(assembled, |s| s.stored + (assembled - s.assembled))
    }
}

// ============================================================================
// Reading
// ============================================================================

pub fn read_skeletons(pdb: &PdbFile<'_>, record: usize) -> Result<(Vec<Skeleton>, Vec<Warning>)> {
    let index = read_index(pdb, record)?;
    let mut skeletons = Vec::with_capacity(index.entries.len());
    for (i, entry) in index.entries.iter().enumerate() {
        let [start, length, ..] = *entry.values(6) else {
            return Err(Error::EntryLengthMismatch(format!(
                "skeleton {i} has no geometry"
            )));
        };
        skeletons.push(Skeleton {
            name: entry.ident_str(),
            fragment_count: entry.first(1).unwrap_or(0) as usize,
            start: start as usize,
            length: length as usize,
        });
    }
    Ok((skeletons, index.warnings))
}

pub fn read_fragments(
    pdb: &PdbFile<'_>,
    record: usize,
    encoding: TextEncoding,
) -> Result<(Vec<Fragment>, Vec<Warning>)> {
    let index = read_index(pdb, record)?;
    let mut warnings = index.warnings.clone();
    let mut fragments = Vec::with_capacity(index.entries.len());
    for (i, entry) in index.entries.iter().enumerate() {
        let ident = entry.ident_str();
        let insert_pos = ident.trim().parse::<usize>().map_err(|_| {
            Error::EntryLengthMismatch(format!("fragment {i} ident {ident:?} is not a position"))
        })?;
        let [start, length, ..] = *entry.values(6) else {
            return Err(Error::EntryLengthMismatch(format!(
                "fragment {i} has no geometry"
            )));
        };
        let selector = match entry.first(2) {
            Some(offset) => match index.cncx.get(offset) {
                Some(bytes) => encoding.decode(bytes),
                None => {
                    warnings.push(Warning::UnreadableCncx { entry: i, offset });
                    String::new()
                }
            },
            None => String::new(),
        };
        fragments.push(Fragment {
            insert_pos,
            selector,
            file_number: entry.first(3).unwrap_or(0),
            sequence: entry.first(4).unwrap_or(i as u32),
            start: start as usize,
            length: length as usize,
        });
    }
    Ok((fragments, warnings))
}

/// Reassembled KF8 text.
#[derive(Debug, Clone, Default)]
pub struct Assembled {
    pub text: Vec<u8>,
    pub spine: Vec<HtmlPart>,
    /// Assembled position of each fragment's first byte.
    pub fragment_starts: Vec<usize>,
    pub map: OffsetMap,
}

fn flow_media_type(bytes: &[u8]) -> &'static str {
    let head = &bytes[..bytes.len().min(256)];
    if memchr::memmem::find(head, b"<svg").is_some() {
        "image/svg+xml"
    } else {
        "text/css"
    }
}

/// Rebuild the HTML files of a stored stream.
pub fn assemble(
    stored: &[u8],
    flows: &[Range<usize>],
    skeletons: &[Skeleton],
    fragments: &[Fragment],
) -> Result<Assembled> {
    let flow0 = flows.first().cloned().unwrap_or(0..stored.len());
    for flow in flows {
        if flow.end > stored.len() {
            return Err(Error::out_of_bounds(flow.end, stored.len()));
        }
    }

    let mut out = Assembled {
        fragment_starts: vec![0; fragments.len()],
        ..Default::default()
    };
    let mut cursor = 0;
    let mut consumed = flow0.start;

    for skeleton in skeletons {
        let skel_end = skeleton.start + skeleton.length;
        if skel_end > flow0.end {
            return Err(Error::out_of_bounds(skel_end, flow0.end));
        }
        let mut doc = stored[skeleton.start..skel_end].to_vec();
        // (stored start, length, fragment id) in document order.
        let mut pieces = vec![(skeleton.start, skeleton.length, None)];
        let mut base = skel_end;

        for _ in 0..skeleton.fragment_count {
            let fragment = fragments.get(cursor).ok_or_else(|| {
                Error::EntryLengthMismatch(format!(
                    "skeleton {} needs more than {} fragments",
                    skeleton.name,
                    fragments.len()
                ))
            })?;
            let insert = fragment
                .insert_pos
                .checked_sub(skeleton.start)
                .filter(|&at| at <= doc.len())
                .ok_or(Error::out_of_bounds(fragment.insert_pos, skeleton.start + doc.len()))?;
            let piece_end = base + fragment.length;
            if piece_end > flow0.end {
                return Err(Error::out_of_bounds(piece_end, flow0.end));
            }
            doc.splice(insert..insert, stored[base..piece_end].iter().copied());

            // Split the piece that contains the insertion point.
            let mut at = 0;
            for i in 0..pieces.len() {
                let (p_start, p_len, p_fid) = pieces[i];
                if insert < at + p_len || (insert == at + p_len && i + 1 == pieces.len()) {
                    let head = insert - at;
                    let mut replacement = Vec::with_capacity(3);
                    if head > 0 {
                        replacement.push((p_start, head, p_fid));
                    }
                    replacement.push((base, fragment.length, Some(cursor)));
                    if p_len > head {
                        replacement.push((p_start + head, p_len - head, p_fid));
                    }
                    pieces.splice(i..=i, replacement);
                    break;
                }
                at += p_len;
            }

            base = piece_end;
            cursor += 1;
        }

        let file_start = out.text.len();
        let mut at = file_start;
        let mut placed = vec![false; fragments.len()];
        for (p_start, p_len, p_fid) in pieces {
            // A later insertion may split a fragment; its first piece is
            // where it starts.
            if let Some(fid) = p_fid
                && !placed[fid]
            {
                placed[fid] = true;
                out.fragment_starts[fid] = at;
            }
            out.map.push(p_start, at, p_len);
            at += p_len;
        }
        out.spine
            .push(HtmlPart::new(file_start, doc.len(), Some(HTML_MEDIA_TYPE)));
        out.text.extend(doc);
        consumed = base;
    }

    if consumed < flow0.end {
        let start = out.text.len();
        out.map.push(consumed, start, flow0.end - consumed);
        out.text.extend_from_slice(&stored[consumed..flow0.end]);
        out.spine
            .push(HtmlPart::new(start, flow0.end - consumed, Some(HTML_MEDIA_TYPE)));
    }

    for flow in flows.iter().skip(1) {
        let start = out.text.len();
        out.map.push(flow.start, start, flow.len());
        let bytes = &stored[flow.clone()];
        out.spine
            .push(HtmlPart::new(start, bytes.len(), Some(flow_media_type(bytes))));
        out.text.extend_from_slice(bytes);
    }

    let covered = flows.last().map_or(flow0.end, |f| f.end);
    if covered < stored.len() {
        out.text.extend_from_slice(&stored[covered..]);
    }

    tracing::debug!(
        skeletons = skeletons.len(),
        fragments = fragments.len(),
        flows = flows.len(),
        "assembled KF8 text"
    );
    Ok(out)
}

// ============================================================================
// Writing
// ============================================================================

/// Stored-stream layout the writer derives from the spine.
#[derive(Debug, Clone, Default)]
pub struct Kf8Layout {
    pub stored: Vec<u8>,
    pub flows: Vec<Range<usize>>,
    pub skeletons: Vec<Skeleton>,
    pub fragments: Vec<Fragment>,
    pub map: OffsetMap,
    /// Assembled range of each HTML part and its fragment's assembled range.
    parts: Vec<(Range<usize>, Range<usize>)>,
}

fn is_html(part: &HtmlPart) -> bool {
    part.media_type
        .as_deref()
        .is_none_or(|m| m.contains("html"))
}

/// Positions of the end of the opening `<body ...>` tag and the start of
/// `</body>`, or the whole part when there is no body.
fn body_split(part: &[u8]) -> (usize, usize) {
    let lower = part.to_ascii_lowercase();
    let Some(open) = memchr::memmem::find(&lower, b"<body") else {
        return (0, part.len());
    };
    let Some(close_angle) = memchr::memchr(b'>', &lower[open..]) else {
        return (0, part.len());
    };
    let head = open + close_angle + 1;
    let tail = memchr::memmem::rfind(&lower[head..], b"</body")
        .map_or(part.len(), |at| head + at);
    (head, tail)
}

impl Kf8Layout {
    /// Split `text` into skeletons, fragments and flows.
    ///
    /// The spine must tile the text, HTML parts first. An empty spine is
    /// one HTML part covering everything.
    pub fn build(text: &[u8], spine: &[HtmlPart]) -> Result<Self> {
        let whole = [HtmlPart::new(0, text.len(), Some(HTML_MEDIA_TYPE))];
        let spine = if spine.is_empty() { &whole[..] } else { spine };

        let mut expected = 0;
        let mut seen_flow = false;
        for (i, part) in spine.iter().enumerate() {
            if part.offset != expected {
                return Err(Error::InvariantViolation(format!(
                    "spine part {i} starts at {} but the previous part ends at {expected}",
                    part.offset
                )));
            }
            if is_html(part) && seen_flow {
                return Err(Error::InvariantViolation(format!(
                    "spine part {i} is HTML but follows a stylesheet or image flow"
                )));
            }
            seen_flow |= !is_html(part);
            expected = part.end();
        }
        if expected != text.len() {
            return Err(Error::InvariantViolation(format!(
                "spine covers {expected} of {} text bytes",
                text.len()
            )));
        }

        let mut layout = Self::default();
        for part in spine.iter().filter(|p| is_html(p)) {
            let bytes = &text[part.offset..part.end()];
            let (head, tail) = body_split(bytes);
            let file_number = layout.skeletons.len();
            let skel_start = layout.stored.len();
            let skel_len = head + (bytes.len() - tail);

            layout.stored.extend_from_slice(&bytes[..head]);
            layout.stored.extend_from_slice(&bytes[tail..]);
            layout.stored.extend_from_slice(&bytes[head..tail]);

            layout.map.push(skel_start, part.offset, head);
            layout
                .map
                .push(skel_start + skel_len, part.offset + head, tail - head);
            layout
                .map
                .push(skel_start + head, part.offset + tail, bytes.len() - tail);

            layout.skeletons.push(Skeleton {
                name: format!("SKEL{file_number:010}"),
                fragment_count: 1,
                start: skel_start,
                length: skel_len,
            });
            layout.fragments.push(Fragment {
                insert_pos: skel_start + head,
                selector: FRAGMENT_SELECTOR.to_string(),
                file_number: file_number as u32,
                sequence: file_number as u32,
                start: 0,
                length: tail - head,
            });
            layout.parts.push((
                part.offset..part.end(),
                part.offset + head..part.offset + tail,
            ));
        }
        layout.flows.push(0..layout.stored.len());

        for part in spine.iter().filter(|p| !is_html(p)) {
            let start = layout.stored.len();
            layout.map.push(start, part.offset, part.length);
            layout
                .stored
                .extend_from_slice(&text[part.offset..part.end()]);
            layout.flows.push(start..layout.stored.len());
        }
        Ok(layout)
    }

    /// Fragment id and offset for an assembled position inside an HTML
    /// part. Positions in a skeleton clamp to the fragment's edges.
    pub fn pos_fid(&self, assembled: usize) -> Option<PosFid> {
        let (fid, (_, fragment)) = self
            .parts
            .iter()
            .enumerate()
            .find(|(_, (part, _))| part.contains(&assembled))?;
        let offset = assembled.clamp(fragment.start, fragment.end) - fragment.start;
        Some(PosFid {
            fid: fid as u32,
            offset: offset as u32,
        })
    }

    /// Skeleton index records (header and children).
    pub fn skeleton_index(&self, encoding: TextEncoding) -> Result<Vec<Vec<u8>>> {
        let tagx = Tagx {
            control_byte_count: 1,
            entries: SKELETON_TAGX.to_vec(),
        };
        let mut builder = IndexBuilder::new(tagx, 2, encoding);
        for skeleton in &self.skeletons {
            let count = skeleton.fragment_count as u32;
            let (start, len) = (skeleton.start as u32, skeleton.length as u32);
            let mut tags = TagMap::new();
            tags.insert(1, vec![count, count]);
            tags.insert(6, vec![start, len, start, len]);
            builder.add_entry(skeleton.name.as_bytes(), &tags)?;
        }
        builder.build()
    }

    /// Fragment index records (header, children and CNCX).
    pub fn fragment_index(&self, encoding: TextEncoding) -> Result<Vec<Vec<u8>>> {
        let tagx = Tagx {
            control_byte_count: 1,
            entries: FRAGMENT_TAGX.to_vec(),
        };
        let mut cncx = CncxBuilder::new();
        let mut entries = Vec::with_capacity(self.fragments.len());
        for fragment in &self.fragments {
            let mut tags = TagMap::new();
            tags.insert(2, vec![cncx.add(&encoding.encode(&fragment.selector))]);
            tags.insert(3, vec![fragment.file_number]);
            tags.insert(4, vec![fragment.sequence]);
            tags.insert(6, vec![fragment.start as u32, fragment.length as u32]);
            entries.push((format!("{:010}", fragment.insert_pos), tags));
        }

        let mut builder = IndexBuilder::new(tagx, 2, encoding);
        builder.set_cncx_count(cncx.record_count());
        for (ident, tags) in &entries {
            builder.add_entry(ident.as_bytes(), tags)?;
        }
        let mut records = builder.build()?;
        records.extend(cncx.into_records());
        Ok(records)
    }
}
