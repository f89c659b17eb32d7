//! Merge iterator over a [`MergeSourceSet`].
//!
//! Each round scans every source once, keeping a running best key (smallest
//! for ascending scans, largest for descending). Sources whose current key
//! equals the best are remembered as *candidate duplicates*. When a strictly
//! better key shows up, the candidates gathered so far belonged to a key that
//! lost the round, so their marks are dropped. Only once the round's winner is
//! confirmed are the surviving candidates flagged on the versions themselves
//! and their sources marked *shadowed*. A shadowed source is stepped past its
//! current version without yielding it the next time it wins a round.
//!
//! Skipping is driven by the shadow mark, never by the version's own
//! duplicate flag: a flag left over from an earlier scan says nothing about
//! the sources of this one.
//!
//! This keeps the per-round cost at one pass over the sources (plus one sweep
//! when duplicates were seen) with no heap to maintain.

use std::cmp::Ordering;

use memtable::Version;
use tracing::trace;

use crate::{BytewiseComparator, Comparator, Direction, SortedSource};

/// One input of a merge plus its transient duplicate marks.
#[derive(Debug)]
pub struct MergeSource<S> {
    source: S,
    /// Candidate duplicate in the round being selected.
    dup: bool,
    /// Current version lost to a newer one in this scan.
    shadowed: bool,
}

impl<S> MergeSource<S> {
    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_inner(self) -> S {
        self.source
    }
}

/// Sources ordered from most recent version authority (index 0) to least.
#[derive(Debug)]
pub struct MergeSourceSet<S> {
    sources: Vec<MergeSource<S>>,
}

/// A source set mixing different source kinds.
pub type DynSourceSet<'a> = MergeSourceSet<Box<dyn SortedSource + 'a>>;

impl<S: SortedSource> MergeSourceSet<S> {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sources: Vec::with_capacity(capacity),
        }
    }

    /// Appends a source with lower priority than every source already added.
    pub fn push(&mut self, source: S) {
        self.sources.push(MergeSource {
            source,
            dup: false,
            shadowed: false,
        });
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn source(&self, index: usize) -> Option<&S> {
        self.sources.get(index).map(MergeSource::source)
    }

    pub fn source_mut(&mut self, index: usize) -> Option<&mut S> {
        self.sources.get_mut(index).map(MergeSource::source_mut)
    }

    pub fn iter(&self) -> impl Iterator<Item = &S> {
        self.sources.iter().map(MergeSource::source)
    }

    pub fn into_sources(self) -> Vec<S> {
        self.sources.into_iter().map(MergeSource::into_inner).collect()
    }

    /// Clears transient marks of every source before `end`.
    fn reset_duplicates(&mut self, end: usize) {
        for src in &mut self.sources[..end] {
            src.dup = false;
        }
    }

    /// Flags the current version of every marked source, shadows the source
    /// and clears the marks. Returns how many sources became shadowed.
    fn mark_duplicates(&mut self) -> usize {
        let mut shadowed = 0;
        for src in &mut self.sources {
            if src.dup {
                if let Some(v) = src.source.current_mut() {
                    v.set_duplicate(true);
                    if !src.shadowed {
                        src.shadowed = true;
                        shadowed += 1;
                    }
                }
            }
            src.dup = false;
        }
        shadowed
    }

    /// Moves source `pos` past its current version.
    fn step(&mut self, pos: usize) {
        let src = &mut self.sources[pos];
        src.source.advance();
        src.shadowed = false;
    }
}

impl<S: SortedSource> Default for MergeSourceSet<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: SortedSource> FromIterator<S> for MergeSourceSet<S> {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for source in iter {
            set.push(source);
        }
        set
    }
}

/// Yields one version per key, in scan direction, newest version first.
///
/// Forward-only and not restartable. Holds the source set mutably for the
/// whole scan.
pub struct MergeIterator<'a, S: SortedSource, C: Comparator = BytewiseComparator> {
    set: &'a mut MergeSourceSet<S>,
    direction: Direction,
    cmp: C,
    /// Index of the source holding the version to yield next.
    winner: Option<usize>,
    duplicates: usize,
}

impl<'a, S: SortedSource> MergeIterator<'a, S> {
    /// Opens a merge with bytewise key order and positions it on the first
    /// version.
    pub fn open(set: &'a mut MergeSourceSet<S>, direction: Direction) -> Self {
        Self::with_comparator(set, direction, BytewiseComparator)
    }
}

impl<'a, S: SortedSource, C: Comparator> MergeIterator<'a, S, C> {
    pub fn with_comparator(set: &'a mut MergeSourceSet<S>, direction: Direction, cmp: C) -> Self {
        trace!(sources = set.len(), ?direction, "opening merge");
        let mut iter = Self {
            set,
            direction,
            cmp,
            winner: None,
            duplicates: 0,
        };
        iter.advance();
        iter
    }

    pub fn has(&self) -> bool {
        self.winner.is_some()
    }

    pub fn current(&self) -> Option<&Version> {
        self.winner
            .and_then(|w| self.set.sources[w].source.current())
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Number of versions shadowed by a newer one so far in this scan.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Consumes the current version and positions the iterator on the next
    /// key.
    ///
    /// # Panics
    ///
    /// Panics if two sources hold the same key and the higher-priority one
    /// does not carry the strictly greater LSN.
    pub fn advance(&mut self) {
        if let Some(w) = self.winner.take() {
            self.set.step(w);
        }

        loop {
            self.select();

            let Some(w) = self.winner else {
                trace!(duplicates = self.duplicates, "merge exhausted");
                return;
            };

            // Lost to a newer version in an earlier round: consume, never yield.
            if !self.set.sources[w].shadowed {
                return;
            }
            self.set.step(w);
            self.winner = None;
        }
    }

    /// One selection round over every source.
    fn select(&mut self) {
        let mut best: Option<usize> = None;
        let mut dups = 0usize;

        for pos in 0..self.set.sources.len() {
            let Some(candidate) = self.set.sources[pos].source.current() else {
                continue;
            };
            let Some(best_pos) = best else {
                best = Some(pos);
                continue;
            };
            let Some(best_v) = self.set.sources[best_pos].source.current() else {
                continue;
            };

            match self.cmp.compare(best_v.key(), candidate.key()) {
                Ordering::Equal => {
                    assert!(
                        candidate.lsn() < best_v.lsn(),
                        "merge source {} holds key {:?} at lsn {}, not older than lsn {} in higher-priority source {}",
                        pos,
                        String::from_utf8_lossy(candidate.key()),
                        candidate.lsn(),
                        best_v.lsn(),
                        best_pos,
                    );
                    self.set.sources[pos].dup = true;
                    dups += 1;
                }
                ord if self.direction.prefers(ord) => {
                    best = Some(pos);
                    self.set.reset_duplicates(pos);
                    dups = 0;
                }
                _ => {}
            }
        }

        self.winner = best;
        if best.is_some() && dups > 0 {
            trace!(dups, winner = ?best, "flagging duplicates");
            self.duplicates += self.set.mark_duplicates();
        }
    }

    /// Returns a copy of the current version and advances past it.
    pub fn next_version(&mut self) -> Option<Version> {
        let v = self.current().cloned()?;
        self.advance();
        Some(v)
    }

    /// Collects all remaining versions into a `Vec`.
    pub fn collect_all(&mut self) -> Vec<Version> {
        let mut result = Vec::new();
        while let Some(v) = self.next_version() {
            result.push(v);
        }
        result
    }
}

impl<S: SortedSource, C: Comparator> Iterator for MergeIterator<'_, S, C> {
    type Item = Version;

    fn next(&mut self) -> Option<Version> {
        self.next_version()
    }
}
