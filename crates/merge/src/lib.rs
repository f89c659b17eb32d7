//! # Merge - multi-source version merge
//!
//! Fuses any number of independently sorted, versioned streams (the memtable,
//! flushed segments) into one sorted stream with a single version per key.
//!
//! ## Source priority
//!
//! ```text
//! index 0   ┌──────────────────────┐  ← most recent authority
//!           │ MemtableSource       │
//! index 1   ├──────────────────────┤
//!           │ SegmentSource (L0)   │
//! index 2   ├──────────────────────┤
//!           │ SegmentSource (L1)   │  ← oldest
//!           └──────────────────────┘
//! ```
//!
//! When two sources hold the same key at the same time, the lower index must
//! carry the strictly greater LSN. The merge checks this at every collision
//! and panics on violation, since silently ranking an older version first
//! would corrupt the logical view of the data.
//!
//! ## Duplicates
//!
//! Every version shadowed by a newer one has its duplicate flag set on the
//! version itself (see [`memtable::Version::is_duplicate`]) and is consumed
//! without being yielded. Compaction reads the flag afterwards to decide what
//! can be dropped.
//!
//! ## Example
//!
//! ```rust
//! use memtable::Version;
//! use merge::{Direction, MergeIterator, MergeSourceSet, SegmentSource};
//!
//! let mut set = MergeSourceSet::new();
//! set.push(SegmentSource::new(vec![Version::put(b"a".to_vec(), b"new".to_vec(), 9)], Direction::Asc));
//! set.push(SegmentSource::new(vec![Version::put(b"a".to_vec(), b"old".to_vec(), 2)], Direction::Asc));
//!
//! let merged = MergeIterator::open(&mut set, Direction::Asc).collect_all();
//! assert_eq!(merged.len(), 1);
//! assert_eq!(merged[0].lsn(), 9);
//! assert!(set.source(1).unwrap().versions()[0].is_duplicate());
//! ```

mod merge;
mod order;
mod source;

pub use memtable::Version;
pub use merge::{DynSourceSet, MergeIterator, MergeSource, MergeSourceSet};
pub use order::{BytewiseComparator, Comparator, Direction};
pub use source::{MemtableSource, SegmentSource, SortedSource};
