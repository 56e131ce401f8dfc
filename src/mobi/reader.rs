use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use crate::book::{
    Book, FormatVersion, HtmlPart, Identifier, Metadata, ResourceKind, ResourceRecord,
    TextEncoding, TrailingIndex,
};
use crate::error::{Error, Result, Warning};

use super::headers::{self, Compression, ExthHeader, MobiHeader, NULL_INDEX, PalmDocHeader, code};
use super::huffcdic::HuffCdicReader;
use super::index::{self, read_index, toc_from_index};
use super::kf8::{self, Assembled, HTML_MEDIA_TYPE};
use super::palmdoc;
use super::pdb::PdbFile;
use super::resources::{BOUNDARY_MAGIC, classify, decode_font_record};
use super::trailing::strip_trailing;
use super::varint::decode_tbs;

/// Read a MOBI/AZW/AZW3 file into a Book
pub fn read_mobi<P: AsRef<Path>>(path: P) -> Result<Book> {
    let data = std::fs::read(path)?;
    parse_mobi(&data)
}

/// Read a MOBI from any Read source
pub fn read_mobi_from_reader<R: Read>(mut reader: R) -> Result<Book> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    parse_mobi(&data)
}

/// Parse a MOBI/AZW/AZW3 image held in memory.
///
/// Structural problems abort with an [`Error`]; semantic ones are pushed
/// to [`Book::warnings`].
pub fn parse_mobi(data: &[u8]) -> Result<Book> {
    // 1. Container and record 0
    let pdb = PdbFile::open(data)?;
    if pdb.is_empty() {
        return Err(Error::header("PalmDB has no records"));
    }
    if !pdb.is_book() {
        tracing::debug!(
            type_code = ?pdb.header.type_code,
            creator = ?pdb.header.creator,
            "not a BOOKMOBI database, reading anyway"
        );
    }
    let Some(first) = Section::open(&pdb, 0)? else {
        return read_plain_palmdoc(&pdb);
    };

    // 2. Locate the KF8 image of a dual file
    let kf8 = if first.mobi.is_kf8() {
        None
    } else {
        find_kf8_section(&pdb, &first)?
    };
    let format_version = match (&kf8, first.mobi.is_kf8()) {
        (Some(_), _) => FormatVersion::Dual,
        (None, true) => FormatVersion::Kf8,
        (None, false) => FormatVersion::Mobi6,
    };
    let primary = kf8.as_ref().unwrap_or(&first);
    tracing::debug!(
        ?format_version,
        records = pdb.len(),
        compression = ?primary.palmdoc.compression,
        encoding = ?primary.mobi.encoding,
        "reading MOBI"
    );

    let mut book = Book::new();
    book.format_version = format_version;
    book.text_encoding = primary.mobi.encoding;

    // 3. Metadata, KF8 first with the MOBI 6 half filling gaps
    let (mut metadata, warnings) = section_metadata(primary);
    if kf8.is_some() {
        let (fallback, _) = section_metadata(&first);
        merge_metadata(&mut metadata, fallback);
    }
    book.metadata = metadata;
    for warning in warnings {
        book.warn(warning);
    }

    // 4. Text records
    let (stored, trailing) = decompress_text(
        &pdb,
        primary.base,
        &primary.palmdoc,
        Some(&primary.mobi),
    )?;
    check_text_length(&mut book, primary.palmdoc.text_length, stored.len());
    book.trailing_indexes = trailing;

    // 5. Reassemble KF8 files
    let assembled = if primary.mobi.is_kf8() {
        let assembled = read_kf8_text(primary, &stored, &mut book)?;
        book.text_html = assembled.text.clone();
        book.spine = assembled.spine.clone();
        Some(assembled)
    } else {
        book.spine = vec![HtmlPart::new(0, stored.len(), Some(HTML_MEDIA_TYPE))];
        book.text_html = stored;
        None
    };

    // 6. Navigation
    if let Some(ncx) = primary.absolute(primary.mobi.ncx_index) {
        read_toc(&pdb, ncx, primary.mobi.encoding, assembled.as_ref(), &mut book)?;
    }

    // 7. Resources live in the first image; the KF8 half of a dual file
    //    shares them.
    let resource_offsets = read_resources(&first, kf8.as_ref().map(|s| s.base), &mut book);
    book.cover_index = resolve_resource(&primary.exth, code::COVER, &resource_offsets)
        .unwrap_or_else(|record| {
            book.warn(Warning::MissingCoverResource { record });
            None
        });
    book.thumbnail_index = resolve_resource(&primary.exth, code::THUMBNAIL, &resource_offsets)
        .unwrap_or_else(|record| {
            book.warn(Warning::MissingThumbnailResource { record });
            None
        });
    book.masthead_index = resolve_resource(&primary.exth, code::MASTHEAD, &resource_offsets)
        .unwrap_or_else(|record| {
            book.warn(Warning::MissingMastheadResource { record });
            None
        });

    tracing::debug!(
        text_len = book.text_html.len(),
        resources = book.resources.len(),
        toc_entries = book.toc.len(),
        warnings = book.warnings.len(),
        "parsed MOBI"
    );
    Ok(book)
}

/// One MOBI image inside the database: the whole file, or one half of a
/// dual file. Record numbers in its headers are relative to `base`.
struct Section<'a> {
    pdb: &'a PdbFile<'a>,
    base: usize,
    palmdoc: PalmDocHeader,
    mobi: MobiHeader,
    exth: ExthHeader,
}

impl<'a> Section<'a> {
    /// Parse the headers at record `base`; `None` when record 0 carries
    /// no MOBI header.
    fn open(pdb: &'a PdbFile<'a>, base: usize) -> Result<Option<Self>> {
        let record0 = pdb.record(base)?;
        let palmdoc = PalmDocHeader::parse(record0)?;
        if palmdoc.encryption != 0 {
            return Err(Error::Unsupported(format!(
                "encrypted book (encryption type {})",
                palmdoc.encryption
            )));
        }
        let Some(mobi) = MobiHeader::parse(record0)? else {
            return Ok(None);
        };
        let exth = if mobi.has_exth() {
            let at = mobi.exth_offset();
            let data = record0
                .get(at..)
                .ok_or_else(|| Error::header(format!("EXTH at {at} is past the end of record 0")))?;
            ExthHeader::parse(data)?
        } else {
            ExthHeader::default()
        };
        Ok(Some(Self {
            pdb,
            base,
            palmdoc,
            mobi,
            exth,
        }))
    }

    /// Absolute record number of a header field, `None` for a null or
    /// out-of-range index.
    fn absolute(&self, relative: u32) -> Option<usize> {
        (relative != NULL_INDEX)
            .then(|| self.base + relative as usize)
            .filter(|&i| i < self.pdb.len())
    }
}

fn find_kf8_section<'a>(pdb: &'a PdbFile<'a>, first: &Section<'a>) -> Result<Option<Section<'a>>> {
    let follows_boundary =
        |i: usize| i > 0 && i < pdb.len() && pdb.record(i - 1).is_ok_and(|r| r.starts_with(BOUNDARY_MAGIC));

    let base = first
        .exth
        .get_u32(code::KF8_BOUNDARY)
        .map(|i| i as usize)
        .filter(|&i| follows_boundary(i))
        .or_else(|| (2..pdb.len()).find(|&i| follows_boundary(i)));
    let Some(base) = base else {
        return Ok(None);
    };

    match Section::open(pdb, base)? {
        Some(section) if section.mobi.is_kf8() => {
            tracing::debug!(base, "found KF8 image");
            Ok(Some(section))
        }
        _ => Ok(None),
    }
}

/// A file whose record 0 is a bare PalmDOC header.
fn read_plain_palmdoc(pdb: &PdbFile<'_>) -> Result<Book> {
    let palmdoc = PalmDocHeader::parse(pdb.record(0)?)?;
    if palmdoc.encryption != 0 {
        return Err(Error::Unsupported(format!(
            "encrypted book (encryption type {})",
            palmdoc.encryption
        )));
    }
    let (text, _) = decompress_text(pdb, 0, &palmdoc, None)?;
    tracing::debug!(text_len = text.len(), "read plain PalmDOC");

    let mut book = Book::with_text(Metadata::new(pdb.header.name.clone()), text);
    book.text_encoding = TextEncoding::Cp1252;
    let actual = book.text_html.len();
    check_text_length(&mut book, palmdoc.text_length, actual);
    Ok(book)
}

fn check_text_length(book: &mut Book, declared: u32, actual: usize) {
    if declared as usize != actual {
        book.warn(Warning::TextLengthMismatch {
            declared: declared as usize,
            actual,
        });
    }
}

enum Decoder {
    Plain,
    PalmDoc,
    Huff(HuffCdicReader),
}

impl Decoder {
    fn decode(&mut self, data: &[u8], out: &mut Vec<u8>) -> Result<()> {
        match self {
            Decoder::Plain => out.extend_from_slice(data),
            Decoder::PalmDoc => out.extend(palmdoc::decompress(data)?),
            Decoder::Huff(reader) => out.extend(reader.decompress(data)?),
        }
        Ok(())
    }
}

/// Decompress the text records of the image at `base`, collecting each
/// record's indexing trailer.
fn decompress_text(
    pdb: &PdbFile<'_>,
    base: usize,
    palmdoc: &PalmDocHeader,
    mobi: Option<&MobiHeader>,
) -> Result<(Vec<u8>, Vec<TrailingIndex>)> {
    let flags = mobi.map_or(0, |m| m.extra_data_flags);
    let flag_size = if mobi.is_some_and(MobiHeader::is_periodical) { 4 } else { 3 };

    let mut decoder = match palmdoc.compression {
        Compression::None => Decoder::Plain,
        Compression::PalmDoc => Decoder::PalmDoc,
        Compression::Huffman => {
            let mobi = mobi.ok_or_else(|| Error::header("HUFF/CDIC text without a MOBI header"))?;
            let first = base + mobi.huff_record as usize;
            let huff = pdb.record(first)?;
            let cdics = (1..mobi.huff_count as usize)
                .map(|i| pdb.record(first + i))
                .collect::<Result<Vec<_>>>()?;
            Decoder::Huff(HuffCdicReader::new(huff, &cdics)?)
        }
    };

    let mut text = Vec::with_capacity(
        (palmdoc.text_length as usize).min(palmdoc.record_count as usize * palmdoc::RECORD_SIZE),
    );
    let mut trailing = Vec::new();
    for i in 1..=palmdoc.record_count as usize {
        let record = pdb.record(base + i)?;
        let entries = strip_trailing(record, flags)?;
        if let Some(raw) = entries.indexing {
            let decoded = if raw.is_empty() {
                None
            } else {
                decode_tbs(raw, flag_size).ok().map(|(tbs, _)| tbs)
            };
            trailing.push(TrailingIndex {
                record: i,
                raw: raw.to_vec(),
                decoded,
            });
        }
        decoder.decode(entries.text, &mut text)?;
    }

    tracing::trace!(
        records = palmdoc.record_count,
        text_len = text.len(),
        flags,
        "decompressed text"
    );
    Ok((text, trailing))
}

fn section_metadata(section: &Section<'_>) -> (Metadata, Vec<Warning>) {
    let encoding = section.mobi.encoding;
    let mut metadata = Metadata::new(encoding.decode(&section.mobi.full_name));
    if metadata.title.is_empty() {
        metadata.title = section.pdb.header.name.clone();
    }
    let warnings = headers::read_metadata(&section.exth, encoding, &mut metadata);
    if metadata.language.is_none() {
        metadata.language = headers::locale_to_language(section.mobi.locale);
    }
    (metadata, warnings)
}

/// Fill fields `primary` leaves empty from `fallback`.
fn merge_metadata(primary: &mut Metadata, fallback: Metadata) {
    if primary.title.is_empty() {
        primary.title = fallback.title;
    }
    if primary.authors.is_empty() {
        primary.authors = fallback.authors;
    }
    if primary.subjects.is_empty() {
        primary.subjects = fallback.subjects;
    }
    if primary.contributors.is_empty() {
        primary.contributors = fallback.contributors;
    }
    primary.publisher = primary.publisher.take().or(fallback.publisher);
    primary.language = primary.language.take().or(fallback.language);
    primary.pubdate = primary.pubdate.take().or(fallback.pubdate);
    primary.rights = primary.rights.take().or(fallback.rights);
    primary.description = primary.description.take().or(fallback.description);
    primary.source = primary.source.take().or(fallback.source);
    primary.creator_software = primary.creator_software.or(fallback.creator_software);

    for Identifier { scheme, value } in fallback.identifiers {
        if primary.identifier(&scheme).is_none() {
            primary.identifiers.push(Identifier { scheme, value });
        }
    }
    for record in fallback.extra_exth {
        if !primary.extra_exth.iter().any(|r| r.code == record.code) {
            primary.extra_exth.push(record);
        }
    }
}

fn read_kf8_text(section: &Section<'_>, stored: &[u8], book: &mut Book) -> Result<Assembled> {
    let flows = match section.absolute(section.mobi.fdst_record) {
        Some(record) => kf8::parse_fdst(section.pdb.record(record)?)?,
        None => vec![0..stored.len()],
    };

    let skeleton = section.absolute(section.mobi.skeleton_index);
    let fragment = section.absolute(section.mobi.fragment_index);
    let (skeletons, fragments) = match (skeleton, fragment) {
        (Some(skeleton), Some(fragment)) => {
            let (skeletons, skel_warnings) = kf8::read_skeletons(section.pdb, skeleton)?;
            let (fragments, frag_warnings) =
                kf8::read_fragments(section.pdb, fragment, section.mobi.encoding)?;
            for warning in skel_warnings.into_iter().chain(frag_warnings) {
                book.warn(warning);
            }
            (skeletons, fragments)
        }
        _ => (Vec::new(), Vec::new()),
    };

    kf8::assemble(stored, &flows, &skeletons, &fragments)
}

fn read_toc(
    pdb: &PdbFile<'_>,
    record: usize,
    encoding: TextEncoding,
    assembled: Option<&Assembled>,
    book: &mut Book,
) -> Result<()> {
    let ncx = read_index(pdb, record)?;
    let (mut toc, warnings) = toc_from_index(&ncx, encoding);
    for warning in ncx.warnings.iter().cloned().chain(warnings) {
        book.warn(warning);
    }

    // KF8 offsets point into the stored stream; move them to the
    // reassembled text.
    if let Some(assembled) = assembled {
        for (i, entry) in ncx.entries.iter().enumerate() {
            let Some(toc_entry) = toc.get_mut(i) else {
                continue;
            };
            if let Some(stored) = entry.first(index::tag::OFFSET) {
                toc_entry.target_offset = assembled.map.to_assembled(stored as usize);
            } else if let Some(pos) = toc_entry.pos_fid
                && let Some(&start) = assembled.fragment_starts.get(pos.fid as usize)
            {
                toc_entry.target_offset = start + pos.offset as usize;
            }
        }
    }

    tracing::debug!(record, entries = toc.len(), "read NCX");
    book.toc = toc;
    Ok(())
}

/// Collect the resource records of `section`. Returns the map from offset
/// relative to the first resource record to index in `book.resources`.
fn read_resources(
    section: &Section<'_>,
    kf8_base: Option<usize>,
    book: &mut Book,
) -> HashMap<usize, usize> {
    let mut offsets = HashMap::new();
    let Some(first) = section.absolute(section.mobi.first_image) else {
        return offsets;
    };
    let last_record = section.pdb.len() - 1;
    let last = match kf8_base {
        // Up to and including the boundary record.
        Some(kf8) => kf8 - 1,
        None if !section.mobi.is_kf8() => {
            let last_content = usize::from(section.mobi.last_content);
            if last_content != 0xFFFF && section.base + last_content >= first {
                (section.base + last_content).min(last_record)
            } else {
                last_record
            }
        }
        // KF8 resources run up to the first index or auxiliary record.
        None => {
            let mobi = &section.mobi;
            [
                mobi.ncx_index,
                mobi.skeleton_index,
                mobi.fragment_index,
                mobi.guide_index,
                mobi.datp_index,
                mobi.fdst_record,
                mobi.flis_record,
                mobi.fcis_record,
            ]
            .into_iter()
            .filter_map(|r| section.absolute(r))
            .filter(|&r| r > first)
            .min()
            .map_or(last_record, |r| r - 1)
        }
    };

    for i in first..=last {
        let Ok(record) = section.pdb.record(i) else {
            break;
        };
        let Some(kind) = classify(record, i - section.base, &section.mobi).resource_kind() else {
            continue;
        };
        let mut resource = ResourceRecord::new(kind, record.to_vec());
        resource.record_number = Some(i);
        if kind == ResourceKind::Font {
            match decode_font_record(record) {
                Ok(font) => resource.font = Some(font),
                Err(err) => {
                    tracing::debug!(record = i, %err, "font record not decodable");
                    book.warn(Warning::FontDecodeFailed { record: i });
                }
            }
        }
        offsets.insert(i - first, book.add_resource(resource));
    }

    tracing::debug!(
        first,
        last,
        resources = book.resources.len(),
        "read resources"
    );
    offsets
}

/// Resource index for an EXTH image reference. `Err` carries the
/// referenced offset when no resource sits there.
fn resolve_resource(
    exth: &ExthHeader,
    code: u32,
    offsets: &HashMap<usize, usize>,
) -> std::result::Result<Option<usize>, usize> {
    match exth.get_u32(code) {
        None => Ok(None),
        Some(offset) => offsets
            .get(&(offset as usize))
            .copied()
            .map(Some)
            .ok_or(offset as usize),
    }
}
