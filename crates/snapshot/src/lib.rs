//! # Snapshot - named snapshot log
//!
//! Records which named objects (snapshots, schemas) exist and the LSN each was
//! created at. The log is a single CRC-protected byte buffer:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ count (u32) | crc (u32) | vlsn (u64)         │  header, absent when empty
//! ├──────────────────────────────────────────────┤
//! │ lsn (u64) | namelen (i32) | name             │  record 0
//! │ lsn (u64) | namelen (i32) | name             │  record 1
//! │ ...                                          │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! `vlsn` is the smallest LSN still referenced by a record: versions newer
//! than it may be needed by some snapshot and must survive compaction.
//!
//! ## Copy-on-write
//!
//! A [`SnapshotLog`] is never modified in place. [`SnapshotLog::add`] and
//! [`SnapshotLog::delete`] build a brand-new log and leave the original
//! untouched, so readers holding the old log are never invalidated. Either
//! call fails as a whole: no partially built log escapes.
//!
//! ## Example
//!
//! ```rust
//! use snapshot::SnapshotLog;
//!
//! let empty = SnapshotLog::new();
//! assert_eq!(empty.vlsn(), u64::MAX);
//!
//! let one = empty.add(42, "nightly").unwrap();
//! let two = one.add(40, "weekly").unwrap();
//! assert_eq!(two.vlsn(), 40);
//! assert!(two.add(50, "nightly").is_err());
//!
//! let back = two.delete("weekly").unwrap();
//! assert_eq!(back.len(), 1);
//! assert_eq!(one.len(), 1); // untouched
//! ```

mod format;

use std::collections::TryReserveError;
use std::io::{self, Read, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use thiserror::Error;
use tracing::{debug, warn};

use format::CRC_OFFSET;
pub use format::{checksum, Header, Records, SnapshotRecord, HEADER_BYTES, RECORD_FIXED_BYTES};

/// Errors that can occur during snapshot log operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The serialized log failed CRC or framing checks.
    #[error("corrupt snapshot log: {0}")]
    Corrupt(String),

    /// Growing the log buffer failed.
    #[error("memory allocation failed: {0}")]
    Alloc(#[from] TryReserveError),

    /// `add` of a name that is already present.
    #[error("snapshot '{0}' already exists")]
    AlreadyExists(String),

    /// `delete` of a name that is not present.
    #[error("snapshot '{0}' not found")]
    NotFound(String),

    /// Name does not fit the 31-bit length field.
    #[error("snapshot name of {0} bytes is too long")]
    NameTooLong(usize),

    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, SnapshotError>;

/// An immutable, CRC-checked list of `(lsn, name)` records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotLog {
    /// Serialized form. Empty means no records and no header.
    buf: Vec<u8>,
}

impl SnapshotLog {
    /// Creates an empty log with no backing buffer.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Verifies `buf` and takes ownership of it, replacing any log held so
    /// far. On success `buf` is left empty.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Corrupt`] on CRC or framing mismatch, in which
    /// case both `self` and `buf` are left untouched.
    pub fn open(&mut self, buf: &mut Vec<u8>) -> Result<()> {
        match format::validate(buf) {
            Ok(header) => {
                debug!(
                    bytes = buf.len(),
                    records = header.map_or(0, |h| h.count),
                    "snapshot log opened"
                );
                self.buf = std::mem::take(buf);
                Ok(())
            }
            Err(e) => {
                warn!(bytes = buf.len(), error = %e, "rejecting snapshot log");
                Err(e)
            }
        }
    }

    /// Builds a log from serialized bytes.
    pub fn from_bytes(mut bytes: Vec<u8>) -> Result<Self> {
        let mut log = Self::new();
        log.open(&mut bytes)?;
        Ok(log)
    }

    /// Reads a whole serialized log from `r`.
    pub fn read_from<R: Read>(mut r: R) -> Result<Self> {
        let mut bytes = Vec::new();
        r.read_to_end(&mut bytes)?;
        Self::from_bytes(bytes)
    }

    /// Writes the serialized log to `w`. The empty log writes nothing.
    pub fn write_to<W: Write>(&self, mut w: W) -> Result<()> {
        w.write_all(&self.buf)?;
        w.flush()?;
        Ok(())
    }

    /// Releases the buffer. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.buf = Vec::new();
    }

    /// Returns a new log holding every record of `self` plus `(lsn, name)`.
    ///
    /// The new record's name is stored with a trailing NUL terminator.
    ///
    /// # Errors
    ///
    /// [`SnapshotError::AlreadyExists`] if a stored name starts with the
    /// bytes of `name`; [`SnapshotError::Alloc`] if the buffer cannot grow.
    pub fn add(&self, lsn: u64, name: &str) -> Result<SnapshotLog> {
        let mut next = Builder::with_capacity_of(self)?;
        for record in self.records() {
            if record.raw_name().starts_with(name.as_bytes()) {
                return Err(SnapshotError::AlreadyExists(name.to_string()));
            }
            next.append(record.lsn, record.raw_name())?;
        }

        let mut raw = Vec::new();
        raw.try_reserve_exact(name.len() + 1)?;
        raw.extend_from_slice(name.as_bytes());
        raw.push(0);
        next.append(lsn, &raw)?;

        let log = next.finish();
        debug!(snapshot = name, lsn, records = log.len(), vlsn = log.vlsn(), "snapshot added");
        Ok(log)
    }

    /// Returns a new log without the record named `name`.
    ///
    /// # Errors
    ///
    /// [`SnapshotError::NotFound`] if no record matches;
    /// [`SnapshotError::Alloc`] if the buffer cannot grow.
    pub fn delete(&self, name: &str) -> Result<SnapshotLog> {
        let mut next = Builder::with_capacity_of(self)?;
        let mut matched = false;
        for record in self.records() {
            if record.name() == name.as_bytes() {
                matched = true;
            } else {
                next.append(record.lsn, record.raw_name())?;
            }
        }
        if !matched {
            return Err(SnapshotError::NotFound(name.to_string()));
        }

        let log = next.finish();
        debug!(snapshot = name, records = log.len(), vlsn = log.vlsn(), "snapshot deleted");
        Ok(log)
    }

    /// Smallest LSN referenced by any record, or `u64::MAX` when the log is
    /// empty (no lower bound).
    pub fn vlsn(&self) -> u64 {
        match Header::decode(&self.buf) {
            Ok(h) => h.vlsn,
            Err(_) => u64::MAX,
        }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        Header::decode(&self.buf).map_or(0, |h| h.count as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records(&self) -> Records<'_> {
        Records::new(&self.buf)
    }

    /// Returns `true` if a record is named exactly `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.lsn_of(name).is_some()
    }

    /// LSN of the record named exactly `name`.
    pub fn lsn_of(&self, name: &str) -> Option<u64> {
        self.records()
            .find(|r| r.name() == name.as_bytes())
            .map(|r| r.lsn)
    }

    /// The serialized form, as accepted by [`SnapshotLog::open`].
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Accumulates records into a fresh buffer. The buffer only becomes a valid
/// log once [`Builder::finish`] has stamped the CRC.
struct Builder {
    buf: Vec<u8>,
}

impl Builder {
    /// Pre-sizes the buffer for a copy of `log`.
    fn with_capacity_of(log: &SnapshotLog) -> Result<Self> {
        let mut buf = Vec::new();
        buf.try_reserve(log.buf.len())?;
        Ok(Self { buf })
    }

    fn append(&mut self, lsn: u64, name: &[u8]) -> Result<()> {
        let namelen = i32::try_from(name.len()).map_err(|_| SnapshotError::NameTooLong(name.len()))?;
        let create = self.buf.is_empty();
        let mut size = RECORD_FIXED_BYTES + name.len();
        if create {
            size += HEADER_BYTES;
        }
        self.buf.try_reserve(size)?;

        if create {
            self.buf.resize(HEADER_BYTES, 0);
            Header {
                count: 0,
                crc: 0,
                vlsn: lsn,
            }
            .encode_into(&mut self.buf);
        }

        self.buf.write_u64::<LittleEndian>(lsn)?;
        self.buf.write_i32::<LittleEndian>(namelen)?;
        self.buf.extend_from_slice(name);

        let mut header = Header::decode(&self.buf)?;
        header.count += 1;
        header.vlsn = header.vlsn.min(lsn);
        header.encode_into(&mut self.buf);
        Ok(())
    }

    fn finish(mut self) -> SnapshotLog {
        if !self.buf.is_empty() {
            let crc = checksum(&self.buf);
            self.buf[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());
        }
        SnapshotLog { buf: self.buf }
    }
}

#[cfg(test)]
mod tests;
