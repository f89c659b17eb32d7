//! # Memtable - versioned in-memory buffer
//!
//! Holds the most recent version of every key written since the last flush.
//! It is the freshest source of a merge scan and is therefore placed at index
//! 0 of a merge source set.
//!
//! Every entry is a [`Version`]: the key, the LSN that produced it, an
//! optional payload (`None` = tombstone) and a *duplicate* marker that the
//! merge iterator sets when a newer source shadows this version.

use std::collections::BTreeMap;

/// A key tagged with the LSN that produced it.
///
/// `value == None` signifies a tombstone (delete).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    key: Vec<u8>,
    pub lsn: u64,
    pub value: Option<Vec<u8>>,
    dup: bool,
}

impl Version {
    /// A live version carrying `value`.
    pub fn put(key: Vec<u8>, value: Vec<u8>, lsn: u64) -> Self {
        Self {
            key,
            lsn,
            value: Some(value),
            dup: false,
        }
    }

    /// A tombstone for `key`.
    pub fn tombstone(key: Vec<u8>, lsn: u64) -> Self {
        Self {
            key,
            lsn,
            value: None,
            dup: false,
        }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn lsn(&self) -> u64 {
        self.lsn
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Returns `true` once a merge has found a newer version of this key.
    pub fn is_duplicate(&self) -> bool {
        self.dup
    }

    pub fn set_duplicate(&mut self, dup: bool) {
        self.dup = dup;
    }

    fn footprint(&self) -> usize {
        self.key.len() + self.value.as_ref().map_or(0, Vec::len)
    }
}

#[derive(Debug)]
pub struct Memtable {
    map: BTreeMap<Vec<u8>, Version>,
    approx_size: usize,
}

impl Memtable {
    pub fn new() -> Self {
        Self {
            map: BTreeMap::new(),
            approx_size: 0,
        }
    }

    /// Put a key with an LSN. Overwrites the existing version only if `lsn`
    /// is newer.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>, lsn: u64) {
        self.insert(Version::put(key, value, lsn));
    }

    /// Delete: add a tombstone with `lsn`.
    pub fn delete(&mut self, key: Vec<u8>, lsn: u64) {
        self.insert(Version::tombstone(key, lsn));
    }

    fn insert(&mut self, version: Version) {
        match self.map.get(&version.key) {
            Some(old) if old.lsn >= version.lsn => return,
            Some(old) => {
                self.approx_size = self.approx_size.saturating_sub(old.footprint());
            }
            None => {}
        }

        self.approx_size += version.footprint();
        self.map.insert(version.key.clone(), version);
    }

    /// Get the latest value if present and not a tombstone.
    pub fn get(&self, key: &[u8]) -> Option<(u64, Vec<u8>)> {
        self.map
            .get(key)
            .and_then(|e| e.value.as_ref().map(|v| (e.lsn, v.clone())))
    }

    pub fn get_entry(&self, key: &[u8]) -> Option<&Version> {
        self.map.get(key)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.map.contains_key(key)
    }

    /// Versions in ascending key order, tombstones included.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Version> {
        self.map.values()
    }

    /// Mutable versions in ascending key order.
    ///
    /// Used by merge sources to flag shadowed versions in place. The key of a
    /// [`Version`] is not reachable mutably, so map order cannot be broken.
    pub fn versions_mut(&mut self) -> impl DoubleEndedIterator<Item = &mut Version> {
        self.map.values_mut()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Sum of key and value bytes held.
    pub fn approx_size(&self) -> usize {
        self.approx_size
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.approx_size = 0;
    }
}

impl Default for Memtable {
    fn default() -> Self {
        Self::new()
    }
}
