//! Scan direction and key comparison.

use std::cmp::Ordering;

/// Order in which a merge yields keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Strictly increasing keys.
    #[default]
    Asc,
    /// Strictly decreasing keys.
    Desc,
    /// Caller does not care about order. Scanned as [`Direction::Asc`].
    Any,
}

impl Direction {
    #[must_use]
    pub fn is_descending(self) -> bool {
        matches!(self, Direction::Desc)
    }

    /// Returns `true` if a key comparing as `ord` against the running best
    /// (`compare(best, candidate)`) should replace it.
    pub(crate) fn prefers(self, ord: Ordering) -> bool {
        match self {
            Direction::Asc | Direction::Any => ord == Ordering::Greater,
            Direction::Desc => ord == Ordering::Less,
        }
    }
}

/// Three-way key comparator. Direction-agnostic: the merge applies the scan
/// direction on top of it.
pub trait Comparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Lexicographic byte order, the same order `Vec<u8>` keys sort in.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytewiseComparator;

impl Comparator for BytewiseComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

impl<C: Comparator + ?Sized> Comparator for &C {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        (**self).compare(a, b)
    }
}
