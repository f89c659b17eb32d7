//! Snapshot log binary layout and validation.
//!
//! ```text
//! Header:  [count: u32 LE][crc: u32 LE][vlsn: u64 LE]           16 bytes
//! Record:  [lsn: u64 LE][namelen: i32 LE][name: namelen bytes]  repeated `count` times
//! ```
//!
//! The CRC32 covers the whole buffer, header included, with the 4 CRC bytes
//! treated as zero. An empty buffer (no header at all) is an empty log.

use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher as Crc32;

use crate::SnapshotError;

/// Size of the header in bytes: 4 (`count`) + 4 (`crc`) + 8 (`vlsn`).
pub const HEADER_BYTES: usize = 4 + 4 + 8;

/// Size of a record without its name: 8 (`lsn`) + 4 (`namelen`).
pub const RECORD_FIXED_BYTES: usize = 8 + 4;

/// Offset of the `crc` field within the header.
pub(crate) const CRC_OFFSET: usize = 4;

/// Parsed snapshot header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub count: u32,
    pub crc: u32,
    /// Smallest LSN among the records.
    pub vlsn: u64,
}

impl Header {
    /// Decodes the header at the start of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, SnapshotError> {
        if buf.len() < HEADER_BYTES {
            return Err(SnapshotError::Corrupt(format!(
                "buffer of {} bytes is too small for a snapshot header",
                buf.len()
            )));
        }
        Ok(Self {
            count: LittleEndian::read_u32(&buf[0..4]),
            crc: LittleEndian::read_u32(&buf[CRC_OFFSET..CRC_OFFSET + 4]),
            vlsn: LittleEndian::read_u64(&buf[8..16]),
        })
    }

    /// Overwrites the first [`HEADER_BYTES`] of `buf`.
    pub fn encode_into(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(&mut buf[0..4], self.count);
        LittleEndian::write_u32(&mut buf[CRC_OFFSET..CRC_OFFSET + 4], self.crc);
        LittleEndian::write_u64(&mut buf[8..16], self.vlsn);
    }
}

/// CRC32 (seed 0) of `buf` with the header's CRC field read as zero.
///
/// # Panics
///
/// Panics if `buf` is shorter than the `count` and `crc` fields.
pub fn checksum(buf: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(&buf[..CRC_OFFSET]);
    hasher.update(&[0u8; 4]);
    hasher.update(&buf[CRC_OFFSET + 4..]);
    hasher.finalize()
}

/// One record as stored in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotRecord<'a> {
    pub lsn: u64,
    raw_name: &'a [u8],
}

impl<'a> SnapshotRecord<'a> {
    /// The name bytes exactly as stored, terminator included if present.
    pub fn raw_name(&self) -> &'a [u8] {
        self.raw_name
    }

    /// The name without its trailing NUL terminator.
    pub fn name(&self) -> &'a [u8] {
        self.raw_name.strip_suffix(&[0u8]).unwrap_or(self.raw_name)
    }

    pub fn name_lossy(&self) -> std::borrow::Cow<'a, str> {
        String::from_utf8_lossy(self.name())
    }
}

/// Decodes the record at the start of `buf`, returning it and its encoded
/// length.
fn decode_record(buf: &[u8]) -> Result<(SnapshotRecord<'_>, usize), SnapshotError> {
    if buf.len() < RECORD_FIXED_BYTES {
        return Err(SnapshotError::Corrupt("truncated record".into()));
    }
    let lsn = LittleEndian::read_u64(&buf[0..8]);
    let namelen = LittleEndian::read_i32(&buf[8..12]);
    let namelen = usize::try_from(namelen)
        .map_err(|_| SnapshotError::Corrupt(format!("negative name length {}", namelen)))?;
    let end = RECORD_FIXED_BYTES + namelen;
    if buf.len() < end {
        return Err(SnapshotError::Corrupt(format!(
            "record name of {} bytes overruns the buffer",
            namelen
        )));
    }
    let record = SnapshotRecord {
        lsn,
        raw_name: &buf[RECORD_FIXED_BYTES..end],
    };
    Ok((record, end))
}

/// Checks the CRC and the record framing of a serialized log.
///
/// Returns `None` for the empty log.
pub fn validate(buf: &[u8]) -> Result<Option<Header>, SnapshotError> {
    if buf.is_empty() {
        return Ok(None);
    }
    let header = Header::decode(buf)?;
    let actual = checksum(buf);
    if actual != header.crc {
        return Err(SnapshotError::Corrupt(format!(
            "bad snapshot crc: stored {:#010x}, computed {:#010x}",
            header.crc, actual
        )));
    }

    let mut rest = &buf[HEADER_BYTES..];
    for _ in 0..header.count {
        let (_, len) = decode_record(rest)?;
        rest = &rest[len..];
    }
    if !rest.is_empty() {
        return Err(SnapshotError::Corrupt(format!(
            "{} trailing bytes after {} records",
            rest.len(),
            header.count
        )));
    }
    Ok(Some(header))
}

/// Iterator over the records of a validated buffer.
#[derive(Debug, Clone)]
pub struct Records<'a> {
    rest: &'a [u8],
    remaining: u32,
}

impl<'a> Records<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        match Header::decode(buf) {
            Ok(h) => Self {
                rest: &buf[HEADER_BYTES..],
                remaining: h.count,
            },
            Err(_) => Self {
                rest: &[],
                remaining: 0,
            },
        }
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = SnapshotRecord<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        // The buffer was validated on construction of the owning log.
        let (record, len) = decode_record(self.rest).ok()?;
        self.rest = &self.rest[len..];
        self.remaining -= 1;
        Some(record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining as usize))
    }
}
