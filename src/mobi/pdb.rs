//! Palm Database container: the 78-byte header, the record-info list, and
//! the concatenated record payloads.

use crate::error::{Error, Result};

use super::{be_u16, be_u32};

/// Size of the fixed PalmDB header.
pub const PDB_HEADER_LEN: usize = 78;
/// Size of one record-info entry.
const RECORD_INFO_LEN: usize = 8;
/// Highest record count the 16-bit header field can express.
pub const MAX_RECORDS: usize = 0xFFFF;

/// Fixed PalmDB header fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdbHeader {
    pub name: String,
    pub attributes: u16,
    pub version: u16,
    pub creation_date: u32,
    pub modification_date: u32,
    pub last_backup_date: u32,
    pub modification_number: u32,
    pub app_info_id: u32,
    pub sort_info_id: u32,
    pub type_code: [u8; 4],
    pub creator: [u8; 4],
    pub unique_id_seed: u32,
    pub next_record_list_id: u32,
    pub num_records: u16,
}

/// One entry of the record-info list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordInfo {
    pub offset: usize,
    pub attributes: u8,
    pub id: u32,
}

/// A parsed PalmDB file borrowing the input buffer.
#[derive(Debug)]
pub struct PdbFile<'a> {
    data: &'a [u8],
    pub header: PdbHeader,
    pub records: Vec<RecordInfo>,
}

impl<'a> PdbFile<'a> {
    /// Parse the header and record-info list and validate every offset.
    pub fn open(data: &'a [u8]) -> Result<Self> {
        if data.len() < PDB_HEADER_LEN {
            return Err(Error::header(format!(
                "PalmDB header needs {PDB_HEADER_LEN} bytes, file has {}",
                data.len()
            )));
        }

        let name = parse_name(&data[..32])?;
        let num_records = be_u16(data, 76)?;
        let list_end = PDB_HEADER_LEN + num_records as usize * RECORD_INFO_LEN;
        if list_end > data.len() {
            return Err(Error::header(format!(
                "record list of {num_records} entries overruns file"
            )));
        }

        let mut records = Vec::with_capacity(num_records as usize);
        for i in 0..num_records as usize {
            let pos = PDB_HEADER_LEN + i * RECORD_INFO_LEN;
            let offset = be_u32(data, pos)? as usize;
            let attributes = data[pos + 4];
            let id = u32::from_be_bytes([0, data[pos + 5], data[pos + 6], data[pos + 7]]);

            if offset >= data.len() {
                return Err(Error::header(format!(
                    "record {i} offset {offset} past end of file ({})",
                    data.len()
                )));
            }
            if offset < list_end {
                return Err(Error::header(format!(
                    "record {i} offset {offset} inside the record list"
                )));
            }
            if let Some(prev) = records.last().map(|r: &RecordInfo| r.offset)
                && offset <= prev
            {
                return Err(Error::header(format!(
                    "record {i} offset {offset} not after previous offset {prev}"
                )));
            }
            records.push(RecordInfo {
                offset,
                attributes,
                id,
            });
        }

        let mut type_code = [0u8; 4];
        type_code.copy_from_slice(&data[60..64]);
        let mut creator = [0u8; 4];
        creator.copy_from_slice(&data[64..68]);

        let header = PdbHeader {
            name,
            attributes: be_u16(data, 32)?,
            version: be_u16(data, 34)?,
            creation_date: be_u32(data, 36)?,
            modification_date: be_u32(data, 40)?,
            last_backup_date: be_u32(data, 44)?,
            modification_number: be_u32(data, 48)?,
            app_info_id: be_u32(data, 52)?,
            sort_info_id: be_u32(data, 56)?,
            type_code,
            creator,
            unique_id_seed: be_u32(data, 68)?,
            next_record_list_id: be_u32(data, 72)?,
            num_records,
        };

        tracing::debug!(
            name = %header.name,
            records = num_records,
            "opened PalmDB {}{}",
            String::from_utf8_lossy(&header.type_code),
            String::from_utf8_lossy(&header.creator),
        );

        Ok(Self {
            data,
            header,
            records,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whole input buffer.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Bytes of record `index`: up to the next record's offset, or to end
    /// of file for the last record.
    pub fn record(&self, index: usize) -> Result<&'a [u8]> {
        let start = self
            .records
            .get(index)
            .ok_or(Error::out_of_bounds(index, self.records.len()))?
            .offset;
        let end = self
            .records
            .get(index + 1)
            .map_or(self.data.len(), |r| r.offset);
        Ok(&self.data[start..end])
    }

    /// True for a `BOOKMOBI` or `TEXtREAd` database.
    pub fn is_book(&self) -> bool {
        let ident = [self.header.type_code, self.header.creator].concat();
        ident == b"BOOKMOBI" || ident.eq_ignore_ascii_case(b"TEXTREAD")
    }
}

fn parse_name(raw: &[u8]) -> Result<String> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let (name, padding) = raw.split_at(end);
    if !name.iter().all(|b| b.is_ascii() && !b.is_ascii_control()) {
        return Err(Error::header("PalmDB name is not ASCII"));
    }
    if padding.iter().any(|&b| b != 0) {
        return Err(Error::header("PalmDB name is not null-padded"));
    }
    // The ASCII check above makes this lossless.
    Ok(String::from_utf8_lossy(name).into_owned())
}

/// Reduce `title` to a PalmDB name: runs of characters outside
/// `[A-Za-z0-9-]` become `_`, at most 31 bytes.
pub fn sanitize_name(title: &str) -> String {
    let mut out = String::with_capacity(31);
    let mut in_run = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() || c == '-' {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out.truncate(31);
    out
}

/// Serializer for the outer container.
#[derive(Debug, Clone)]
pub struct PdbBuilder {
    name: String,
    type_code: [u8; 4],
    creator: [u8; 4],
    timestamp: u32,
}

impl PdbBuilder {
    /// `name` is sanitised with [`sanitize_name`].
    pub fn new(name: &str, type_code: [u8; 4], creator: [u8; 4]) -> Self {
        Self {
            name: sanitize_name(name),
            type_code,
            creator,
            timestamp: 0,
        }
    }

    /// PalmDB creation/modification date. Zero unless set.
    pub fn with_timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn build(&self, records: &[Vec<u8>]) -> Result<Vec<u8>> {
        let n = records.len();
        if n > MAX_RECORDS {
            return Err(Error::TooManyRecords { count: n });
        }

        // Two zero bytes of padding follow the record list.
        let data_start = PDB_HEADER_LEN + n * RECORD_INFO_LEN + 2;
        let total = data_start + records.iter().map(Vec::len).sum::<usize>();
        if total > u32::MAX as usize {
            return Err(Error::out_of_bounds(total, u32::MAX as usize));
        }

        let mut out = Vec::with_capacity(total);
        let mut name = [0u8; 32];
        name[..self.name.len()].copy_from_slice(self.name.as_bytes());
        out.extend_from_slice(&name);
        out.extend_from_slice(&0u16.to_be_bytes()); // attributes
        out.extend_from_slice(&0u16.to_be_bytes()); // version
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes()); // last backup
        out.extend_from_slice(&0u32.to_be_bytes()); // modification number
        out.extend_from_slice(&0u32.to_be_bytes()); // app info
        out.extend_from_slice(&0u32.to_be_bytes()); // sort info
        out.extend_from_slice(&self.type_code);
        out.extend_from_slice(&self.creator);
        out.extend_from_slice(&((2 * n as u32).saturating_sub(1)).to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes()); // next record list
        out.extend_from_slice(&(n as u16).to_be_bytes());

        let mut offset = data_start;
        for (i, record) in records.iter().enumerate() {
            out.extend_from_slice(&(offset as u32).to_be_bytes());
            out.push(0);
            out.extend_from_slice(&(2 * i as u32).to_be_bytes()[1..]);
            offset += record.len();
        }
        out.extend_from_slice(&[0, 0]);

        for record in records {
            out.extend_from_slice(record);
        }
        Ok(out)
    }
}
