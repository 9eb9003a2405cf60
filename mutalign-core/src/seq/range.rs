use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open interval `[from, to)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Range {
    from: usize,
    to: usize,
}

impl Range {
    /// # Panics
    /// Panics if `from > to`.
    pub fn new(from: usize, to: usize) -> Self {
        assert!(from <= to, "range start {from} is after its end {to}");
        Range { from, to }
    }

    pub fn with_length(from: usize, length: usize) -> Self {
        Range {
            from,
            to: from + length,
        }
    }

    #[inline]
    pub fn from(&self) -> usize {
        self.from
    }

    #[inline]
    pub fn to(&self) -> usize {
        self.to
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.to - self.from
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }

    #[inline]
    pub fn contains(&self, position: usize) -> bool {
        self.from <= position && position < self.to
    }

    /// Like [`Range::contains`] but also accepts the end boundary.
    #[inline]
    pub fn contains_boundary(&self, position: usize) -> bool {
        self.from <= position && position <= self.to
    }

    pub fn contains_range(&self, other: &Range) -> bool {
        self.from <= other.from && other.to <= self.to
    }

    pub fn intersects(&self, other: &Range) -> bool {
        self.from < other.to && other.from < self.to
    }

    pub fn intersection(&self, other: &Range) -> Option<Range> {
        let from = self.from.max(other.from);
        let to = self.to.min(other.to);
        (from <= to && self.intersects_or_touches(other)).then_some(Range { from, to })
    }

    fn intersects_or_touches(&self, other: &Range) -> bool {
        self.from <= other.to && other.from <= self.to
    }

    /// Shifts both bounds; `None` if the result would be negative.
    pub fn move_by(&self, offset: isize) -> Option<Range> {
        Some(Range {
            from: self.from.checked_add_signed(offset)?,
            to: self.to.checked_add_signed(offset)?,
        })
    }

    /// Moves a position from absolute coordinates into this range's local ones.
    pub fn to_local(&self, position: usize) -> usize {
        position - self.from
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from, self.to)
    }
}

impl From<std::ops::Range<usize>> for Range {
    fn from(r: std::ops::Range<usize>) -> Self {
        Range::new(r.start, r.end)
    }
}

impl From<Range> for std::ops::Range<usize> {
    fn from(r: Range) -> Self {
        r.from..r.to
    }
}
