//! Sorted sources a merge can draw from.
//!
//! A source is positioned on one version at a time and only moves forward.
//! "Forward" already accounts for the scan direction: a source opened for a
//! descending scan yields its largest key first.

use memtable::{Memtable, Version};

use crate::Direction;

/// A cursor over versions sorted consistently with the merge comparator and
/// scan direction.
pub trait SortedSource {
    /// The version the cursor is positioned on, or `None` once exhausted.
    fn current(&self) -> Option<&Version>;

    /// Mutable access to the current version, used to flag duplicates.
    fn current_mut(&mut self) -> Option<&mut Version>;

    /// Moves past the current version. No-op once exhausted.
    fn advance(&mut self);

    fn has(&self) -> bool {
        self.current().is_some()
    }
}

impl<S: SortedSource + ?Sized> SortedSource for Box<S> {
    fn current(&self) -> Option<&Version> {
        (**self).current()
    }

    fn current_mut(&mut self) -> Option<&mut Version> {
        (**self).current_mut()
    }

    fn advance(&mut self) {
        (**self).advance()
    }

    fn has(&self) -> bool {
        (**self).has()
    }
}

/// An owned, already decoded sorted run, e.g. the contents of a persisted
/// segment.
///
/// Versions must be sorted by strictly ascending key under the comparator the
/// merge uses. Duplicate flags set by a merge stay on the owned versions and
/// can be read back with [`SegmentSource::versions`].
#[derive(Debug, Clone)]
pub struct SegmentSource {
    versions: Vec<Version>,
    /// Number of versions already consumed.
    consumed: usize,
    direction: Direction,
}

impl SegmentSource {
    pub fn new(versions: Vec<Version>, direction: Direction) -> Self {
        Self {
            versions,
            consumed: 0,
            direction,
        }
    }

    /// Snapshots every version of `mem`, tombstones included.
    pub fn from_memtable(mem: &Memtable, direction: Direction) -> Self {
        Self::new(mem.iter().cloned().collect(), direction)
    }

    /// All versions of the run in ascending key order, regardless of scan
    /// position.
    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    pub fn into_versions(self) -> Vec<Version> {
        self.versions
    }

    /// Versions not yet consumed.
    pub fn remaining(&self) -> usize {
        self.versions.len() - self.consumed
    }

    fn position(&self) -> Option<usize> {
        if self.consumed >= self.versions.len() {
            return None;
        }
        if self.direction.is_descending() {
            Some(self.versions.len() - 1 - self.consumed)
        } else {
            Some(self.consumed)
        }
    }
}

impl SortedSource for SegmentSource {
    fn current(&self) -> Option<&Version> {
        self.position().map(|i| &self.versions[i])
    }

    fn current_mut(&mut self) -> Option<&mut Version> {
        self.position().map(|i| &mut self.versions[i])
    }

    fn advance(&mut self) {
        if self.consumed < self.versions.len() {
            self.consumed += 1;
        }
    }
}

/// A memory-resident stream over a [`Memtable`].
///
/// Borrows the memtable mutably for the lifetime of the scan so duplicate
/// flags land on the memtable's own versions.
pub struct MemtableSource<'a> {
    entries: Vec<&'a mut Version>,
    pos: usize,
}

impl<'a> MemtableSource<'a> {
    pub fn new(mem: &'a mut Memtable, direction: Direction) -> Self {
        let mut entries: Vec<&'a mut Version> = mem.versions_mut().collect();
        if direction.is_descending() {
            entries.reverse();
        }
        Self { entries, pos: 0 }
    }
}

impl SortedSource for MemtableSource<'_> {
    fn current(&self) -> Option<&Version> {
        self.entries.get(self.pos).map(|v| &**v)
    }

    fn current_mut(&mut self) -> Option<&mut Version> {
        self.entries.get_mut(self.pos).map(|v| &mut **v)
    }

    fn advance(&mut self) {
        if self.pos < self.entries.len() {
            self.pos += 1;
        }
    }
}
