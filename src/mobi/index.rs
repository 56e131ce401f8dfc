//! INDX / TAGX / IDXT / CNCX index records.
//!
//! An index is a header INDX record (with the TAGX tag table), one or more
//! child INDX records holding the entries, and optional CNCX string
//! records placed right after the children. The NCX (table of contents),
//! and in KF8 files the skeleton and fragment tables, are all indices.

use std::collections::{BTreeMap, HashMap};

use crate::book::{PosFid, TextEncoding, Toc, TocEntry};
use crate::error::{Error, Result, Warning};

use super::be_u32;
use super::pdb::PdbFile;
use super::varint::{Tbs, TbsExtras, decint, encint, encode_hex_id, encode_tbs};

/// Length of the fixed INDX header the writer emits.
pub const INDX_HEADER_LEN: usize = 192;
/// Hard cap on one INDX record.
const MAX_INDEX_RECORD: usize = 0x10000;
/// CNCX records are closed before they reach this size.
const CNCX_RECORD_LIMIT: usize = 0xFBF8;

/// Index tag ids.
pub mod tag {
    pub const OFFSET: u8 = 1;
    pub const LENGTH: u8 = 2;
    pub const LABEL: u8 = 3;
    pub const DEPTH: u8 = 4;
    pub const CLASS: u8 = 5;
    pub const POS_FID: u8 = 6;
    pub const SECONDARY: u8 = 11;
    pub const PARENT: u8 = 21;
    pub const FIRST_CHILD: u8 = 22;
    pub const LAST_CHILD: u8 = 23;
    pub const IMAGE_INDEX: u8 = 69;
    pub const DESCRIPTION: u8 = 70;
    pub const AUTHOR: u8 = 71;
    pub const CAPTION: u8 = 72;
    pub const ATTRIBUTION: u8 = 73;
}

const KNOWN_NCX_TAGS: &[u8] = &[
    tag::OFFSET,
    tag::LENGTH,
    tag::LABEL,
    tag::DEPTH,
    tag::CLASS,
    tag::POS_FID,
    tag::SECONDARY,
    tag::PARENT,
    tag::FIRST_CHILD,
    tag::LAST_CHILD,
    tag::IMAGE_INDEX,
    tag::DESCRIPTION,
    tag::AUTHOR,
    tag::CAPTION,
    tag::ATTRIBUTION,
];

/// Values of one entry, keyed by tag id.
pub type TagMap = BTreeMap<u8, Vec<u32>>;

fn mismatch(msg: impl Into<String>) -> Error {
    Error::EntryLengthMismatch(msg.into())
}

// ============================================================================
// TAGX
// ============================================================================

/// One row of the TAGX table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagxEntry {
    pub tag: u8,
    pub values_per_entry: u8,
    pub mask: u8,
    pub eof: bool,
}

impl TagxEntry {
    pub const EOF: TagxEntry = TagxEntry {
        tag: 0,
        values_per_entry: 0,
        mask: 0,
        eof: true,
    };

    pub const fn new(tag: u8, values_per_entry: u8, mask: u8) -> Self {
        Self {
            tag,
            values_per_entry,
            mask,
            eof: false,
        }
    }
}

/// Tag table: which tags an entry may carry and how the control bytes
/// signal them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tagx {
    pub control_byte_count: usize,
    pub entries: Vec<TagxEntry>,
}

impl Tagx {
    /// Build a table from groups of `(tag, values_per_entry)`; each group
    /// gets its own control byte and single-bit masks in order.
    pub fn from_groups(groups: &[&[(u8, u8)]]) -> Self {
        let mut entries = Vec::new();
        for group in groups {
            for (i, &(tag, vpe)) in group.iter().enumerate() {
                entries.push(TagxEntry::new(tag, vpe, 1 << i));
            }
            entries.push(TagxEntry::EOF);
        }
        Self {
            control_byte_count: groups.len(),
            entries,
        }
    }

    /// Parse a TAGX block; `record` names the INDX record for errors.
    pub fn parse(data: &[u8], record: usize) -> Result<Self> {
        if !data.starts_with(b"TAGX") {
            return Err(Error::BadIndexMagic {
                record,
                expected: "TAGX",
            });
        }
        let length = be_u32(data, 4)? as usize;
        let control_byte_count = be_u32(data, 8)? as usize;
        if length < 12 || length > data.len() || (length - 12) % 4 != 0 {
            return Err(Error::header(format!("TAGX length {length} is invalid")));
        }

        let entries: Vec<TagxEntry> = data[12..length]
            .chunks_exact(4)
            .map(|q| TagxEntry {
                tag: q[0],
                values_per_entry: q[1],
                mask: q[2],
                eof: q[3] == 1,
            })
            .collect();

        match entries.last() {
            Some(last) if last.eof && last.tag == 0 && last.mask == 0 => {}
            _ => return Err(Error::TagxNotEofTerminated),
        }
        let eofs = entries.iter().filter(|e| e.eof).count();
        if eofs > control_byte_count {
            return Err(Error::header(format!(
                "TAGX has {eofs} tag groups but {control_byte_count} control bytes"
            )));
        }
        Ok(Self {
            control_byte_count,
            entries,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(12 + 4 * self.entries.len());
        out.extend_from_slice(b"TAGX");
        out.extend_from_slice(&(12 + 4 * self.entries.len() as u32).to_be_bytes());
        out.extend_from_slice(&(self.control_byte_count as u32).to_be_bytes());
        for e in &self.entries {
            out.extend_from_slice(&[e.tag, e.values_per_entry, e.mask, u8::from(e.eof)]);
        }
        out
    }
}

// ============================================================================
// Reading
// ============================================================================

/// Fields of an INDX record header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndxHeader {
    pub header_length: u32,
    pub index_type: u32,
    pub idxt_offset: u32,
    /// Child record count in a header record, entry count in a child.
    pub count: u32,
    pub encoding: u32,
    pub language: u32,
    pub total_entries: u32,
    pub ordt_offset: u32,
    pub ligt_offset: u32,
    pub ligt_count: u32,
    pub cncx_count: u32,
    pub tagx_offset: u32,
}

impl IndxHeader {
    pub fn parse(data: &[u8], record: usize) -> Result<Self> {
        if !data.starts_with(b"INDX") {
            return Err(Error::BadIndexMagic {
                record,
                expected: "INDX",
            });
        }
        if data.len() < INDX_HEADER_LEN {
            return Err(Error::header(format!(
                "INDX record {record} is only {} bytes",
                data.len()
            )));
        }
        Ok(Self {
            header_length: be_u32(data, 4)?,
            index_type: be_u32(data, 12)?,
            idxt_offset: be_u32(data, 20)?,
            count: be_u32(data, 24)?,
            encoding: be_u32(data, 28)?,
            language: be_u32(data, 32)?,
            total_entries: be_u32(data, 36)?,
            ordt_offset: be_u32(data, 40)?,
            ligt_offset: be_u32(data, 44)?,
            ligt_count: be_u32(data, 48)?,
            cncx_count: be_u32(data, 52)?,
            tagx_offset: be_u32(data, 180)?,
        })
    }
}

/// Decode the tag values of one entry (the bytes after its ident).
///
/// Returns the values and the number of non-zero bytes left unread.
pub fn get_tag_map(tagx: &Tagx, data: &[u8]) -> Result<(TagMap, usize)> {
    struct Pending {
        tag: u8,
        count: Option<usize>,
        bytes: Option<usize>,
        values_per_entry: usize,
    }

    let cbc = tagx.control_byte_count;
    let control = data
        .get(..cbc)
        .ok_or_else(|| mismatch(format!("entry shorter than {cbc} control bytes")))?;
    let mut pos = cbc;
    let mut control_idx = 0;
    let mut pending = Vec::new();

    for entry in &tagx.entries {
        if entry.eof {
            control_idx += 1;
            continue;
        }
        let byte = *control
            .get(control_idx)
            .ok_or_else(|| mismatch(format!("tag {} has no control byte", entry.tag)))?;
        let mut value = byte & entry.mask;
        if value == 0 {
            continue;
        }

        let (count, bytes) = if value == entry.mask {
            if entry.mask.count_ones() > 1 {
                // All bits of a wide mask set: a byte count follows.
                let (n, used) = decint(&data[pos..])
                    .map_err(|_| mismatch(format!("tag {} byte count truncated", entry.tag)))?;
                pos += used;
                (None, Some(n as usize))
            } else {
                (Some(1), None)
            }
        } else {
            let mut mask = entry.mask;
            while mask & 1 == 0 {
                mask >>= 1;
                value >>= 1;
            }
            (Some(value as usize), None)
        };
        pending.push(Pending {
            tag: entry.tag,
            count,
            bytes,
            values_per_entry: entry.values_per_entry as usize,
        });
    }

    let mut tags = TagMap::new();
    for p in pending {
        let mut values = Vec::new();
        let read = |pos: &mut usize| -> Result<u32> {
            let (v, used) = decint(&data[*pos..])
                .map_err(|_| mismatch(format!("tag {} values run past entry", p.tag)))?;
            *pos += used;
            Ok(v)
        };
        if let Some(count) = p.count {
            for _ in 0..count * p.values_per_entry {
                values.push(read(&mut pos)?);
            }
        } else if let Some(bytes) = p.bytes {
            let start = pos;
            while pos - start < bytes {
                values.push(read(&mut pos)?);
            }
            if pos - start != bytes {
                return Err(mismatch(format!(
                    "tag {} declared {bytes} value bytes, read {}",
                    p.tag,
                    pos - start
                )));
            }
        }
        tags.insert(p.tag, values);
    }

    let leftover = data[pos..].iter().filter(|&&b| b != 0).count();
    Ok((tags, leftover))
}

/// CNCX string pool, addressed by `record * 0x10000 + offset`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cncx {
    strings: BTreeMap<u32, Vec<u8>>,
}

impl Cncx {
    pub fn parse(records: &[&[u8]]) -> Self {
        let mut strings = BTreeMap::new();
        for (i, raw) in records.iter().enumerate() {
            let base = (i as u32) << 16;
            let mut pos = 0;
            while pos < raw.len() {
                let Ok((len, used)) = decint(&raw[pos..]) else {
                    break;
                };
                let start = pos + used;
                let Some(bytes) = raw.get(start..start + len as usize) else {
                    break;
                };
                strings.insert(base + pos as u32, bytes.to_vec());
                pos = start + len as usize;
            }
        }
        Self { strings }
    }

    pub fn get(&self, offset: u32) -> Option<&[u8]> {
        self.strings.get(&offset).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// One index entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Raw ident bytes (without the length prefix).
    pub ident: Vec<u8>,
    pub tags: TagMap,
}

impl IndexEntry {
    pub fn values(&self, tag: u8) -> &[u32] {
        self.tags.get(&tag).map_or(&[], Vec::as_slice)
    }

    pub fn first(&self, tag: u8) -> Option<u32> {
        self.values(tag).first().copied()
    }

    /// The ident read as text (KF8 fragment idents are decimal positions).
    pub fn ident_str(&self) -> String {
        String::from_utf8_lossy(&self.ident).into_owned()
    }
}

/// A fully read index.
#[derive(Debug, Clone)]
pub struct Index {
    pub header: IndxHeader,
    pub tagx: Tagx,
    pub entries: Vec<IndexEntry>,
    pub cncx: Cncx,
    pub warnings: Vec<Warning>,
}

/// Read the index whose header INDX is record `record` of `pdb`.
pub fn read_index(pdb: &PdbFile<'_>, record: usize) -> Result<Index> {
    let data = pdb.record(record)?;
    let header = IndxHeader::parse(data, record)?;

    let tagx_offset = match header.tagx_offset {
        0 => header.header_length,
        n if n == header.header_length => n,
        n => {
            return Err(Error::header(format!(
                "TAGX at {n} but INDX header is {} bytes",
                header.header_length
            )));
        }
    } as usize;
    let tagx = Tagx::parse(
        data.get(tagx_offset..)
            .ok_or(Error::out_of_bounds(tagx_offset, data.len()))?,
        record,
    )?;

    let cncx_start = record + header.count as usize + 1;
    let cncx_records = (cncx_start..cncx_start + header.cncx_count as usize)
        .map(|i| pdb.record(i))
        .collect::<Result<Vec<_>>>()?;
    let cncx = Cncx::parse(&cncx_records);

    // Counts come from the file; grow as entries are actually parsed.
    let mut entries = Vec::new();
    let mut warnings = Vec::new();
    for child in record + 1..=record + header.count as usize {
        let data = pdb.record(child)?;
        let child_header = IndxHeader::parse(data, child)?;
        let idxt = child_header.idxt_offset as usize;
        if data.get(idxt..idxt + 4) != Some(&b"IDXT"[..]) {
            return Err(Error::BadIndexMagic {
                record: child,
                expected: "IDXT",
            });
        }

        let count = child_header.count as usize;
        let room = data.len().saturating_sub(idxt + 4) / 2;
        if count > room {
            return Err(Error::out_of_bounds(idxt + 4 + 2 * count, data.len()));
        }
        let mut starts = Vec::with_capacity(count + 1);
        for j in 0..count {
            let at = idxt + 4 + 2 * j;
            let bytes = data
                .get(at..at + 2)
                .ok_or(Error::out_of_bounds(at + 2, data.len()))?;
            starts.push(u16::from_be_bytes([bytes[0], bytes[1]]) as usize);
        }
        starts.push(idxt);

        for pair in starts.windows(2) {
            let (start, end) = (pair[0], pair[1]);
            if start >= end || end > data.len() {
                return Err(mismatch(format!(
                    "record {child}: entry span {start}..{end} is invalid"
                )));
            }
            let raw = &data[start..end];
            let ident_len = raw[0] as usize;
            let ident = raw
                .get(1..1 + ident_len)
                .ok_or_else(|| mismatch(format!("record {child}: ident overruns entry")))?
                .to_vec();
            let (tags, leftover) = get_tag_map(&tagx, &raw[1 + ident_len..])?;
            if leftover > 0 {
                warnings.push(Warning::TrailingIndexBytes {
                    entry: entries.len(),
                    count: leftover,
                });
            }
            entries.push(IndexEntry { ident, tags });
        }
    }

    tracing::debug!(
        record,
        entries = entries.len(),
        children = header.count,
        cncx_records = header.cncx_count,
        "read index"
    );

    Ok(Index {
        header,
        tagx,
        entries,
        cncx,
        warnings,
    })
}

fn cncx_string(
    index: &Index,
    encoding: TextEncoding,
    entry: usize,
    offset: Option<u32>,
    warnings: &mut Vec<Warning>,
) -> Option<String> {
    let offset = offset?;
    match index.cncx.get(offset) {
        Some(bytes) => Some(encoding.decode(bytes)),
        None => {
            warnings.push(Warning::UnreadableCncx { entry, offset });
            None
        }
    }
}

/// Build the table of contents from an NCX index.
///
/// Explicit parent/child tags are used when present; otherwise each entry's
/// parent is the nearest earlier entry one level up that contains it.
pub fn toc_from_index(index: &Index, encoding: TextEncoding) -> (Toc, Vec<Warning>) {
    let mut warnings = Vec::new();
    let n = index.entries.len();
    let mut entries: Vec<TocEntry> = Vec::with_capacity(n);

    for (i, e) in index.entries.iter().enumerate() {
        for &t in e.tags.keys() {
            if !KNOWN_NCX_TAGS.contains(&t) {
                warnings.push(Warning::UnknownTagId { entry: i, tag: t });
            }
        }
        let title = cncx_string(index, encoding, i, e.first(tag::LABEL), &mut warnings)
            .unwrap_or_default();
        let pos_fid = match e.values(tag::POS_FID) {
            [fid, offset, ..] => Some(PosFid {
                fid: *fid,
                offset: *offset,
            }),
            _ => None,
        };

        entries.push(TocEntry {
            title,
            target_offset: e.first(tag::OFFSET).unwrap_or(0) as usize,
            length: e.first(tag::LENGTH).unwrap_or(0) as usize,
            pos_fid,
            depth: e.first(tag::DEPTH).unwrap_or(0),
            parent: None,
            first_child: None,
            last_child: None,
            class_name: cncx_string(index, encoding, i, e.first(tag::CLASS), &mut warnings),
            description: cncx_string(index, encoding, i, e.first(tag::DESCRIPTION), &mut warnings),
            author: cncx_string(index, encoding, i, e.first(tag::AUTHOR), &mut warnings),
            caption: cncx_string(index, encoding, i, e.first(tag::CAPTION), &mut warnings),
            attribution: cncx_string(index, encoding, i, e.first(tag::ATTRIBUTION), &mut warnings),
            image_index: e.first(tag::IMAGE_INDEX),
        });
    }

    let valid = |p: u32, i: usize| (p as usize) < n && p as usize != i;
    let has = |t: u8| index.entries.iter().any(|e| e.tags.contains_key(&t));

    if has(tag::PARENT) {
        for (i, e) in index.entries.iter().enumerate() {
            entries[i].parent = e
                .first(tag::PARENT)
                .filter(|&p| valid(p, i))
                .map(|p| p as usize);
        }
    } else if has(tag::FIRST_CHILD) && has(tag::LAST_CHILD) {
        for (p, e) in index.entries.iter().enumerate() {
            if let (Some(first), Some(last)) = (e.first(tag::FIRST_CHILD), e.first(tag::LAST_CHILD))
            {
                for c in first as usize..=(last as usize).min(n.saturating_sub(1)) {
                    if c != p {
                        entries[c].parent = Some(p);
                    }
                }
            }
        }
    } else {
        for i in 0..n {
            let depth = entries[i].depth;
            if depth == 0 {
                continue;
            }
            let offset = entries[i].target_offset;
            let contains = |j: &usize| {
                let p = &entries[*j];
                p.depth + 1 == depth
                    && p.target_offset <= offset
                    && (p.length == 0 || offset < p.end())
            };
            let parent = (0..i)
                .rev()
                .find(contains)
                .or_else(|| (0..i).rev().find(|&j| entries[j].depth < depth));
            entries[i].parent = parent;
        }
    }

    // Drop parent links that would form a cycle.
    for i in 0..n {
        let mut cursor = entries[i].parent;
        let mut steps = 0;
        while let Some(p) = cursor {
            steps += 1;
            if p == i || steps > n {
                entries[i].parent = None;
                break;
            }
            cursor = entries[p].parent;
        }
    }

    for i in 0..n {
        if let Some(p) = entries[i].parent {
            let parent = &mut entries[p];
            parent.first_child = Some(parent.first_child.map_or(i, |f| f.min(i)));
            parent.last_child = Some(parent.last_child.map_or(i, |l| l.max(i)));
        }
    }

    (Toc::from_entries(entries), warnings)
}

// ============================================================================
// Writing
// ============================================================================

/// Accumulates CNCX strings, deduplicating and splitting records.
#[derive(Debug, Default)]
pub struct CncxBuilder {
    records: Vec<Vec<u8>>,
    seen: HashMap<Vec<u8>, u32>,
}

impl CncxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `bytes` and return its CNCX offset.
    pub fn add(&mut self, bytes: &[u8]) -> u32 {
        if let Some(&offset) = self.seen.get(bytes) {
            return offset;
        }
        let mut encoded = encint(bytes.len() as u32);
        encoded.extend_from_slice(bytes);

        let needs_new = match self.records.last() {
            None => true,
            Some(current) => {
                !current.is_empty() && current.len() + encoded.len() > CNCX_RECORD_LIMIT
            }
        };
        if needs_new {
            self.records.push(Vec::new());
        }
        let record_idx = self.records.len() - 1;
        let current = &mut self.records[record_idx];
        let offset = ((record_idx as u32) << 16) | current.len() as u32;
        current.extend(encoded);
        self.seen.insert(bytes.to_vec(), offset);
        offset
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn into_records(self) -> Vec<Vec<u8>> {
        self.records
            .into_iter()
            .map(|mut r| {
                pad4(&mut r);
                r
            })
            .collect()
    }
}

fn pad4(buf: &mut Vec<u8>) {
    while !buf.len().is_multiple_of(4) {
        buf.push(0);
    }
}

fn aligned(len: usize) -> usize {
    len.div_ceil(4) * 4
}

/// Encode the control bytes and values of one entry.
pub fn encode_entry(tagx: &Tagx, tags: &TagMap) -> Result<Vec<u8>> {
    let mut control = vec![0u8; tagx.control_byte_count];
    let mut prefixes = Vec::new();
    let mut values = Vec::new();
    let mut control_idx = 0;

    for entry in &tagx.entries {
        if entry.eof {
            control_idx += 1;
            continue;
        }
        let Some(vals) = tags.get(&entry.tag).filter(|v| !v.is_empty()) else {
            continue;
        };
        let vpe = usize::from(entry.values_per_entry.max(1));
        if vals.len() % vpe != 0 {
            return Err(Error::InvariantViolation(format!(
                "tag {} needs a multiple of {vpe} values, got {}",
                entry.tag,
                vals.len()
            )));
        }
        let count = vals.len() / vpe;
        let shift = entry.mask.trailing_zeros();
        let max_count = usize::from(entry.mask >> shift);

        let encoded: Vec<u8> = vals.iter().flat_map(|&v| encint(v)).collect();
        let bits = if count < max_count || (count == 1 && max_count == 1) {
            (count as u8) << shift
        } else if entry.mask.count_ones() > 1 {
            prefixes.extend(encint(encoded.len() as u32));
            entry.mask
        } else {
            return Err(Error::InvariantViolation(format!(
                "tag {} cannot carry {count} value groups",
                entry.tag
            )));
        };
        control[control_idx] |= bits;
        values.extend(encoded);
    }

    let mut out = control;
    out.extend(prefixes);
    out.extend(values);
    Ok(out)
}

/// Assembles header and child INDX records for one index.
#[derive(Debug)]
pub struct IndexBuilder {
    tagx: Tagx,
    index_type: u32,
    encoding: TextEncoding,
    cncx_count: usize,
    /// Prefixed ident and full entry bytes.
    entries: Vec<(Vec<u8>, Vec<u8>)>,
}

impl IndexBuilder {
    pub fn new(tagx: Tagx, index_type: u32, encoding: TextEncoding) -> Self {
        Self {
            tagx,
            index_type,
            encoding,
            cncx_count: 0,
            entries: Vec::new(),
        }
    }

    pub fn set_cncx_count(&mut self, count: usize) {
        self.cncx_count = count;
    }

    /// Add an entry; `ident` is the raw ident without its length byte.
    pub fn add_entry(&mut self, ident: &[u8], tags: &TagMap) -> Result<()> {
        let mut prefixed = Vec::with_capacity(ident.len() + 1);
        prefixed.push(ident.len() as u8);
        prefixed.extend_from_slice(ident);
        let mut bytes = prefixed.clone();
        bytes.extend(encode_entry(&self.tagx, tags)?);
        self.entries.push((prefixed, bytes));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Header record followed by the child records.
    pub fn build(&self) -> Result<Vec<Vec<u8>>> {
        // Group entries so that each child stays within one record.
        let mut groups: Vec<std::ops::Range<usize>> = Vec::new();
        let mut start = 0;
        let mut body = 0;
        for (i, (_, bytes)) in self.entries.iter().enumerate() {
            let count = i - start + 1;
            let size = INDX_HEADER_LEN + aligned(body + bytes.len()) + aligned(4 + 2 * count);
            if size > MAX_INDEX_RECORD && i > start {
                groups.push(start..i);
                start = i;
                body = 0;
            }
            body += bytes.len();
            let single = INDX_HEADER_LEN + aligned(bytes.len()) + aligned(6);
            if single > MAX_INDEX_RECORD {
                return Err(Error::InvariantViolation(format!(
                    "index entry {i} does not fit in one record"
                )));
            }
        }
        if start < self.entries.len() {
            groups.push(start..self.entries.len());
        }

        let mut children = Vec::with_capacity(groups.len());
        for group in &groups {
            children.push(self.build_child(&self.entries[group.clone()]));
        }

        let mut records = Vec::with_capacity(children.len() + 1);
        records.push(self.build_header(&groups));
        records.extend(children);
        Ok(records)
    }

    fn write_header_fields(
        &self,
        record: &mut Vec<u8>,
        index_type: u32,
        idxt_offset: usize,
        count: usize,
        total: usize,
        cncx_count: usize,
        tagx_offset: usize,
    ) {
        record.extend_from_slice(b"INDX");
        record.extend_from_slice(&(INDX_HEADER_LEN as u32).to_be_bytes());
        record.extend_from_slice(&0u32.to_be_bytes());
        record.extend_from_slice(&index_type.to_be_bytes());
        record.extend_from_slice(&0u32.to_be_bytes());
        record.extend_from_slice(&(idxt_offset as u32).to_be_bytes());
        record.extend_from_slice(&(count as u32).to_be_bytes());
        record.extend_from_slice(&self.encoding.codepage().to_be_bytes());
        record.extend_from_slice(&0xFFFF_FFFFu32.to_be_bytes());
        record.extend_from_slice(&(total as u32).to_be_bytes());
        record.extend_from_slice(&[0u8; 12]); // ORDT, LIGT, LIGT count
        record.extend_from_slice(&(cncx_count as u32).to_be_bytes());
        record.resize(180, 0);
        record.extend_from_slice(&(tagx_offset as u32).to_be_bytes());
        record.resize(INDX_HEADER_LEN, 0);
    }

    fn build_header(&self, groups: &[std::ops::Range<usize>]) -> Vec<u8> {
        let mut record = Vec::new();
        self.write_header_fields(
            &mut record,
            self.index_type,
            0,
            groups.len(),
            self.entries.len(),
            self.cncx_count,
            INDX_HEADER_LEN,
        );
        record.extend(self.tagx.to_bytes());

        // Last ident and entry count of each child.
        let mut offsets = Vec::with_capacity(groups.len());
        for group in groups {
            offsets.push(record.len() as u16);
            let (last_ident, _) = &self.entries[group.end - 1];
            record.extend_from_slice(last_ident);
            record.extend_from_slice(&(group.len() as u16).to_be_bytes());
        }
        pad4(&mut record);

        let idxt = record.len();
        record.extend_from_slice(b"IDXT");
        for off in offsets {
            record.extend_from_slice(&off.to_be_bytes());
        }
        pad4(&mut record);
        record[20..24].copy_from_slice(&(idxt as u32).to_be_bytes());
        record
    }

    fn build_child(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> Vec<u8> {
        let mut body = Vec::new();
        let mut offsets = Vec::with_capacity(entries.len());
        for (_, bytes) in entries {
            offsets.push((INDX_HEADER_LEN + body.len()) as u16);
            body.extend_from_slice(bytes);
        }
        pad4(&mut body);

        let idxt = INDX_HEADER_LEN + body.len();
        let mut record = Vec::with_capacity(idxt + 4 + 2 * entries.len() + 2);
        self.write_header_fields(&mut record, 1, idxt, entries.len(), entries.len(), 0, 0);
        record.extend(body);
        record.extend_from_slice(b"IDXT");
        for off in offsets {
            record.extend_from_slice(&off.to_be_bytes());
        }
        pad4(&mut record);
        record
    }
}

/// Canonical NCX tag table for a TOC shape.
pub fn ncx_tagx(kf8: bool, hierarchical: bool, periodical: bool) -> Tagx {
    const FLAT: &[(u8, u8)] = &[(tag::OFFSET, 1), (tag::LENGTH, 1), (tag::LABEL, 1), (tag::DEPTH, 1)];
    const MOBI6_TREE: &[(u8, u8)] = &[
        (tag::OFFSET, 1),
        (tag::LENGTH, 1),
        (tag::LABEL, 1),
        (tag::DEPTH, 1),
        (tag::CLASS, 1),
        (tag::PARENT, 1),
        (tag::FIRST_CHILD, 1),
        (tag::LAST_CHILD, 1),
    ];
    const KF8_TREE: &[(u8, u8)] = &[
        (tag::OFFSET, 1),
        (tag::LENGTH, 1),
        (tag::LABEL, 1),
        (tag::DEPTH, 1),
        (tag::PARENT, 1),
        (tag::FIRST_CHILD, 1),
        (tag::LAST_CHILD, 1),
        (tag::POS_FID, 2),
    ];
    const PERIODICAL: &[(u8, u8)] = &[
        (tag::IMAGE_INDEX, 1),
        (tag::DESCRIPTION, 1),
        (tag::AUTHOR, 1),
        (tag::CAPTION, 1),
        (tag::ATTRIBUTION, 1),
    ];
    const KF8_PERIODICAL: &[(u8, u8)] = &[
        (tag::IMAGE_INDEX, 1),
        (tag::DESCRIPTION, 1),
        (tag::AUTHOR, 1),
        (tag::CAPTION, 1),
        (tag::ATTRIBUTION, 1),
        (tag::CLASS, 1),
    ];

    match (kf8, hierarchical || periodical, periodical) {
        (true, _, false) => Tagx::from_groups(&[KF8_TREE]),
        (true, _, true) => Tagx::from_groups(&[KF8_TREE, KF8_PERIODICAL]),
        (false, false, _) => Tagx::from_groups(&[FLAT]),
        (false, true, false) => Tagx::from_groups(&[MOBI6_TREE]),
        (false, true, true) => Tagx::from_groups(&[MOBI6_TREE, PERIODICAL]),
    }
}

fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::TextRecordTooLarge { len: value })
}

/// Build the NCX index records (header, children, CNCX) for `toc`.
///
/// `toc` must be in canonical order with lengths resolved.
pub fn build_ncx(toc: &Toc, encoding: TextEncoding, kf8: bool) -> Result<Vec<Vec<u8>>> {
    let hierarchical = toc.iter().any(|e| e.parent.is_some());
    let periodical = toc.iter().any(TocEntry::is_periodical);
    let tagx = ncx_tagx(kf8, hierarchical, periodical);

    let mut cncx = CncxBuilder::new();
    let mut tag_maps = Vec::with_capacity(toc.len());
    for entry in toc.iter() {
        let mut tags = TagMap::new();
        tags.insert(tag::OFFSET, vec![to_u32(entry.target_offset)?]);
        tags.insert(tag::LENGTH, vec![to_u32(entry.length)?]);
        tags.insert(tag::LABEL, vec![cncx.add(&encoding.encode(&entry.title))]);
        tags.insert(tag::DEPTH, vec![entry.depth]);

        if hierarchical || periodical || kf8 {
            if let Some(p) = entry.parent {
                tags.insert(tag::PARENT, vec![to_u32(p)?]);
            }
            if let (Some(f), Some(l)) = (entry.first_child, entry.last_child) {
                tags.insert(tag::FIRST_CHILD, vec![to_u32(f)?]);
                tags.insert(tag::LAST_CHILD, vec![to_u32(l)?]);
            }
        }
        if kf8 && let Some(pf) = entry.pos_fid {
            tags.insert(tag::POS_FID, vec![pf.fid, pf.offset]);
        }
        if periodical {
            let mut string = |t: u8, value: &Option<String>| {
                if let Some(s) = value {
                    tags.insert(t, vec![cncx.add(&encoding.encode(s))]);
                }
            };
            string(tag::CLASS, &entry.class_name);
            string(tag::DESCRIPTION, &entry.description);
            string(tag::AUTHOR, &entry.author);
            string(tag::CAPTION, &entry.caption);
            string(tag::ATTRIBUTION, &entry.attribution);
            if let Some(image) = entry.image_index {
                tags.insert(tag::IMAGE_INDEX, vec![image]);
            }
        }
        tag_maps.push(tags);
    }

    let mut builder = IndexBuilder::new(tagx, if kf8 { 2 } else { 0 }, encoding);
    builder.set_cncx_count(cncx.record_count());
    for (i, tags) in tag_maps.iter().enumerate() {
        builder.add_entry(&encode_hex_id(to_u32(i)?)[1..], tags)?;
    }

    let mut records = builder.build()?;
    records.extend(cncx.into_records());
    tracing::debug!(
        entries = toc.len(),
        records = records.len(),
        hierarchical,
        periodical,
        "built NCX index"
    );
    Ok(records)
}

/// Indexing trailer for the text record covering `start..end`, in the
/// book (3-bit flag) form. Only top-level entries are described.
pub fn book_tbs(toc: &Toc, start: usize, end: usize) -> Result<Vec<u8>> {
    let mut spanner = None;
    let mut nodes = Vec::new();
    for (i, entry) in toc.iter().enumerate() {
        if entry.parent.is_some() {
            continue;
        }
        let (e_start, e_end) = (entry.target_offset, entry.end().max(entry.target_offset + 1));
        if e_start < start && e_end > end {
            spanner.get_or_insert(i);
        } else if e_start < end && e_end > start {
            nodes.push(i);
        }
    }

    let tbs = match (nodes.as_slice(), spanner) {
        ([], Some(i)) => Tbs {
            value: i as u32,
            extras: TbsExtras {
                relative_offset: Some(0),
                span_offset: Some(0),
                ..Default::default()
            },
        },
        ([], None) => return Ok(Vec::new()),
        ([i], _) => Tbs {
            value: *i as u32,
            extras: TbsExtras {
                relative_offset: Some(0),
                ..Default::default()
            },
        },
        ([first, ..], _) => Tbs {
            value: *first as u32,
            extras: TbsExtras {
                relative_offset: Some(0),
                entry_count: Some(nodes.len().min(255) as u8),
                ..Default::default()
            },
        },
    };
    encode_tbs(&tbs, 3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mobi::pdb::PdbBuilder;
    use crate::mobi::varint::decode_tbs;
    use proptest::prelude::*;

    /// A PalmDB whose record 0 is a stub and whose index starts at 1.
    fn pdb_bytes(index_records: Vec<Vec<u8>>) -> Vec<u8> {
        let mut records = vec![b"stub".to_vec()];
        records.extend(index_records);
        PdbBuilder::new("idx", *b"BOOK", *b"MOBI")
            .build(&records)
            .unwrap()
    }

    /// Hand-built INDX header record with the given TAGX block.
    fn raw_header(children: u32, tagx: &[u8]) -> Vec<u8> {
        let mut r = b"INDX".to_vec();
        r.extend_from_slice(&192u32.to_be_bytes());
        r.resize(24, 0);
        r.extend_from_slice(&children.to_be_bytes());
        r.resize(180, 0);
        r.extend_from_slice(&192u32.to_be_bytes());
        r.resize(192, 0);
        r.extend_from_slice(tagx);
        r
    }

    /// Hand-built child record holding `entries` (ident + tag bytes).
    fn raw_child(entries: &[Vec<u8>]) -> Vec<u8> {
        let mut body = Vec::new();
        let mut offsets = Vec::new();
        for e in entries {
            offsets.push((192 + body.len()) as u16);
            body.extend_from_slice(e);
        }
        let idxt = 192 + body.len();
        let mut r = b"INDX".to_vec();
        r.extend_from_slice(&192u32.to_be_bytes());
        r.resize(20, 0);
        r.extend_from_slice(&(idxt as u32).to_be_bytes());
        r.extend_from_slice(&(entries.len() as u32).to_be_bytes());
        r.resize(192, 0);
        r.extend(body);
        r.extend_from_slice(b"IDXT");
        for o in offsets {
            r.extend_from_slice(&o.to_be_bytes());
        }
        r
    }

    fn offset_size_depth_tagx() -> Vec<u8> {
        let mut tagx = b"TAGX".to_vec();
        tagx.extend_from_slice(&28u32.to_be_bytes());
        tagx.extend_from_slice(&1u32.to_be_bytes());
        tagx.extend_from_slice(&[1, 1, 1, 0, 2, 1, 2, 0, 4, 1, 4, 0, 0, 0, 0, 1]);
        tagx
    }

    fn triple_entry(ident: u8, offset: u32, size: u32, depth: u32) -> Vec<u8> {
        let mut e = vec![1, ident, 7];
        e.extend(encint(offset));
        e.extend(encint(size));
        e.extend(encint(depth));
        e
    }

    #[test]
    fn test_synthetic_offset_size_depth_index() {
        let bytes = pdb_bytes(vec![
            raw_header(1, &offset_size_depth_tagx()),
            raw_child(&[
                triple_entry(b'0', 0, 100, 0),
                triple_entry(b'1', 100, 200, 1),
                triple_entry(b'2', 300, 50, 1),
            ]),
        ]);
        let pdb = PdbFile::open(&bytes).unwrap();
        let index = read_index(&pdb, 1).unwrap();
        assert!(index.warnings.is_empty());

        let (toc, warnings) = toc_from_index(&index, TextEncoding::Utf8);
        // No label tag, so no CNCX lookups and no warnings.
        assert!(warnings.is_empty());
        let triples: Vec<_> = toc
            .iter()
            .map(|e| (e.target_offset, e.length, e.depth))
            .collect();
        assert_eq!(triples, vec![(0, 100, 0), (100, 200, 1), (300, 50, 1)]);
        assert_eq!(toc.get(1).unwrap().parent, Some(0));
    }

    #[test]
    fn test_tagx_must_end_with_eof() {
        let mut tagx = b"TAGX".to_vec();
        tagx.extend_from_slice(&16u32.to_be_bytes());
        tagx.extend_from_slice(&1u32.to_be_bytes());
        tagx.extend_from_slice(&[1, 1, 1, 0]);
        assert!(matches!(
            Tagx::parse(&tagx, 3),
            Err(Error::TagxNotEofTerminated)
        ));
        assert!(matches!(
            Tagx::parse(b"TAGY\0\0\0\x0c\0\0\0\x01", 3),
            Err(Error::BadIndexMagic { record: 3, expected: "TAGX" })
        ));
    }

    #[test]
    fn test_bad_index_magic() {
        let bytes = pdb_bytes(vec![b"NOPE".repeat(60)]);
        let pdb = PdbFile::open(&bytes).unwrap();
        assert!(matches!(
            read_index(&pdb, 1),
            Err(Error::BadIndexMagic { record: 1, expected: "INDX" })
        ));
    }

    #[test]
    fn test_tagx_offset_must_match_header() {
        let mut header = raw_header(0, &offset_size_depth_tagx());
        header[180..184].copy_from_slice(&200u32.to_be_bytes());
        let bytes = pdb_bytes(vec![header]);
        let pdb = PdbFile::open(&bytes).unwrap();
        assert!(matches!(read_index(&pdb, 1), Err(Error::CorruptHeader(_))));
    }

    #[test]
    fn test_inflated_total_entries_ignored() {
        let mut header = raw_header(1, &offset_size_depth_tagx());
        header[36..40].copy_from_slice(&u32::MAX.to_be_bytes());
        let bytes = pdb_bytes(vec![
            header,
            raw_child(&[triple_entry(b'0', 0, 100, 0)]),
        ]);
        let pdb = PdbFile::open(&bytes).unwrap();
        let index = read_index(&pdb, 1).unwrap();
        assert_eq!(index.header.total_entries, u32::MAX);
        assert_eq!(index.entries.len(), 1);
    }

    #[test]
    fn test_inflated_child_count_is_out_of_bounds() {
        let mut child = raw_child(&[triple_entry(b'0', 0, 100, 0)]);
        child[24..28].copy_from_slice(&u32::MAX.to_be_bytes());
        let bytes = pdb_bytes(vec![raw_header(1, &offset_size_depth_tagx()), child]);
        let pdb = PdbFile::open(&bytes).unwrap();
        assert!(matches!(
            read_index(&pdb, 1),
            Err(Error::OffsetOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_entry_overrun_is_length_mismatch() {
        // Control byte claims three values, only one present.
        let bytes = pdb_bytes(vec![
            raw_header(1, &offset_size_depth_tagx()),
            raw_child(&[vec![1, b'0', 7, 0x81]]),
        ]);
        let pdb = PdbFile::open(&bytes).unwrap();
        assert!(matches!(
            read_index(&pdb, 1),
            Err(Error::EntryLengthMismatch(_))
        ));
    }

    #[test]
    fn test_trailing_bytes_warn() {
        let mut entry = triple_entry(b'0', 1, 2, 0);
        entry.extend_from_slice(&[0, 0x55]);
        let bytes = pdb_bytes(vec![
            raw_header(1, &offset_size_depth_tagx()),
            raw_child(&[entry]),
        ]);
        let pdb = PdbFile::open(&bytes).unwrap();
        let index = read_index(&pdb, 1).unwrap();
        assert_eq!(
            index.warnings,
            vec![Warning::TrailingIndexBytes { entry: 0, count: 1 }]
        );
    }

    #[test]
    fn test_multi_bit_mask_counts() {
        // Skeleton-style table: tag 1 with mask 0x03, tag 6 (two values)
        // with mask 0x0C.
        let tagx = Tagx {
            control_byte_count: 1,
            entries: vec![
                TagxEntry::new(1, 1, 0x03),
                TagxEntry::new(6, 2, 0x0C),
                TagxEntry::EOF,
            ],
        };
        let mut tags = TagMap::new();
        tags.insert(1, vec![4, 4]);
        tags.insert(6, vec![10, 20, 10, 20]);
        let encoded = encode_entry(&tagx, &tags).unwrap();
        assert_eq!(encoded[0], 0x0A);
        let (decoded, leftover) = get_tag_map(&tagx, &encoded).unwrap();
        assert_eq!(decoded, tags);
        assert_eq!(leftover, 0);

        // Three groups of tag 1 saturate the mask: a byte count is written.
        let mut tags = TagMap::new();
        tags.insert(1, vec![1, 2, 300]);
        let encoded = encode_entry(&tagx, &tags).unwrap();
        assert_eq!(encoded[0], 0x03);
        assert_eq!(get_tag_map(&tagx, &encoded).unwrap().0, tags);
    }

    #[test]
    fn test_cncx_builder_splits_and_dedups() {
        let mut cncx = CncxBuilder::new();
        let a = cncx.add(b"alpha");
        assert_eq!(cncx.add(b"alpha"), a);
        let big = vec![b'x'; 0x8000];
        let first = cncx.add(&big);
        let mut second_big = big.clone();
        second_big[0] = b'y';
        let second = cncx.add(&second_big);
        assert_eq!(first >> 16, 0);
        assert_eq!(second >> 16, 1);
        assert_eq!(second & 0xFFFF, 0);

        let records = cncx.into_records();
        let refs: Vec<&[u8]> = records.iter().map(Vec::as_slice).collect();
        let parsed = Cncx::parse(&refs);
        assert_eq!(parsed.get(a), Some(&b"alpha"[..]));
        assert_eq!(parsed.get(second), Some(second_big.as_slice()));
    }

    fn sample_toc() -> Toc {
        let mut toc = Toc::new();
        let a = toc.push_root(TocEntry::new("Part One", 0).with_length(500));
        toc.push_child(a, TocEntry::new("Chapter 1", 0).with_length(200));
        toc.push_child(a, TocEntry::new("Chapter 2", 200).with_length(300));
        toc.push_root(TocEntry::new("Part Two", 500).with_length(100));
        toc.canonical_order()
    }

    fn read_back(records: Vec<Vec<u8>>) -> (Toc, Vec<Warning>) {
        let bytes = pdb_bytes(records);
        let pdb = PdbFile::open(&bytes).unwrap();
        let index = read_index(&pdb, 1).unwrap();
        assert!(index.warnings.is_empty());
        toc_from_index(&index, TextEncoding::Utf8)
    }

    #[test]
    fn test_ncx_roundtrip_hierarchical() {
        let toc = sample_toc();
        let records = build_ncx(&toc, TextEncoding::Utf8, false).unwrap();
        let (parsed, warnings) = read_back(records);
        assert!(warnings.is_empty());
        assert_eq!(parsed, toc);
    }

    #[test]
    fn test_ncx_roundtrip_flat_cp1252() {
        let mut toc = Toc::new();
        toc.push_root(TocEntry::new("Caf\u{e9}", 0).with_length(10));
        toc.push_root(TocEntry::new("Na\u{ef}ve", 10).with_length(10));
        let records = build_ncx(&toc, TextEncoding::Cp1252, false).unwrap();
        let tagx = Tagx::parse(&records[0][192..], 1).unwrap();
        assert_eq!(tagx, ncx_tagx(false, false, false));
        let bytes = pdb_bytes(records);
        let pdb = PdbFile::open(&bytes).unwrap();
        let index = read_index(&pdb, 1).unwrap();
        let (parsed, _) = toc_from_index(&index, TextEncoding::Cp1252);
        assert_eq!(parsed, toc);
    }

    #[test]
    fn test_ncx_roundtrip_periodical_kf8() {
        let mut toc = Toc::new();
        let s = toc.push_root(
            TocEntry::new("Section", 0)
                .with_length(100)
                .with_class("section"),
        );
        let mut article = TocEntry::new("Article", 10)
            .with_length(50)
            .with_class("article")
            .with_description("About things")
            .with_author("Reporter");
        article.pos_fid = Some(PosFid { fid: 0, offset: 10 });
        article.image_index = Some(2);
        toc.push_child(s, article);
        toc.get_mut(0).unwrap().pos_fid = Some(PosFid { fid: 0, offset: 0 });
        let toc = toc.canonical_order();

        let records = build_ncx(&toc, TextEncoding::Utf8, true).unwrap();
        let (parsed, warnings) = read_back(records);
        assert!(warnings.is_empty());
        assert_eq!(parsed, toc);
    }

    #[test]
    fn test_large_index_splits_children() {
        let mut toc = Toc::new();
        let title = "A fairly long chapter title used to fill records ".repeat(4);
        for i in 0..2000 {
            toc.push_root(TocEntry::new(format!("{title}{i}"), i * 10).with_length(10));
        }
        let records = build_ncx(&toc, TextEncoding::Utf8, false).unwrap();
        let header = IndxHeader::parse(&records[0], 1).unwrap();
        assert!(header.count > 1);
        assert!(header.cncx_count > 1);
        assert_eq!(header.total_entries, 2000);
        assert!(records.iter().all(|r| r.len() <= MAX_INDEX_RECORD));

        let (parsed, _) = read_back(records);
        assert_eq!(parsed, toc);
    }

    #[test]
    fn test_book_tbs_shapes() {
        let mut toc = Toc::new();
        toc.push_root(TocEntry::new("a", 0).with_length(5000));
        toc.push_root(TocEntry::new("b", 5000).with_length(10000));
        toc.push_root(TocEntry::new("c", 15000).with_length(100));

        // Record 0 holds only "a".
        let (tbs, _) = decode_tbs(&book_tbs(&toc, 0, 4096).unwrap(), 3).unwrap();
        assert_eq!(tbs.value, 0);
        assert_eq!(tbs.extras.relative_offset, Some(0));
        assert_eq!(tbs.extras.entry_count, None);

        // Record 1 sees "a" end and "b" start.
        let (tbs, _) = decode_tbs(&book_tbs(&toc, 4096, 8192).unwrap(), 3).unwrap();
        assert_eq!((tbs.value, tbs.extras.entry_count), (0, Some(2)));

        // Record 2 is spanned by "b".
        let (tbs, _) = decode_tbs(&book_tbs(&toc, 8192, 12288).unwrap(), 3).unwrap();
        assert_eq!(tbs.value, 1);
        assert_eq!(tbs.extras.span_offset, Some(0));

        // Nothing past the end.
        assert!(book_tbs(&toc, 20480, 24576).unwrap().is_empty());
    }

    fn arb_toc() -> impl Strategy<Value = Toc> {
        // A list of (depth delta, span) pairs laid out left to right.
        proptest::collection::vec((0u8..3, 1usize..50, "[A-Za-z ]{0,12}"), 1..40).prop_map(
            |items| {
                let mut toc = Toc::new();
                let mut stack: Vec<usize> = Vec::new();
                let mut offset = 0;
                for (step, span, title) in items {
                    let entry = TocEntry::new(title, offset);
                    match step {
                        0 => {
                            stack.clear();
                            stack.push(toc.push_root(entry));
                        }
                        1 if !stack.is_empty() => {
                            let parent = *stack.last().unwrap_or(&0);
                            stack.push(toc.push_child(parent, entry));
                        }
                        _ => {
                            stack.pop();
                            let idx = match stack.last() {
                                Some(&p) => toc.push_child(p, entry),
                                None => toc.push_root(entry),
                            };
                            stack.push(idx);
                        }
                    }
                    offset += span;
                }
                let mut toc = toc.canonical_order();
                toc.resolve_lengths(offset);
                toc
            },
        )
    }

    proptest! {
        #[test]
        fn prop_ncx_tree_roundtrip(toc in arb_toc(), kf8 in any::<bool>()) {
            let records = build_ncx(&toc, TextEncoding::Utf8, kf8).unwrap();
            let (parsed, warnings) = read_back(records);
            prop_assert!(warnings.is_empty());
            prop_assert_eq!(parsed, toc);
        }
    }
}
