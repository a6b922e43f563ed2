//! Binary search over key-sorted sequences.
//!
//! The searches here are pure: they take the sequence as an argument and
//! return positions, never references into it. Stores, indexes, and
//! cursors all resolve keys and ranges through these.

use crate::key::{Key, KeyRange};

/// Anything that sorts by a key.
pub trait Keyed {
    /// The key this element sorts by.
    fn sort_key(&self) -> &Key;
}

impl Keyed for Key {
    fn sort_key(&self) -> &Key {
        self
    }
}

/// Where a key sits relative to a sorted sequence.
///
/// `eq` is the leftmost position holding the key, if present. `lt` and
/// `gt` are the nearest positions strictly below and above the key, so a
/// bracket also encodes the insertion point when the key is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionBracket {
    /// Nearest position whose key orders below the probe.
    pub lt: Option<usize>,
    /// Leftmost position whose key equals the probe.
    pub eq: Option<usize>,
    /// Nearest position whose key orders above the probe.
    pub gt: Option<usize>,
}

impl PositionBracket {
    /// Returns `true` if the probed key was present.
    pub fn found(&self) -> bool {
        self.eq.is_some()
    }

    /// The position where the probed key lives or would be inserted.
    ///
    /// `len` is the sequence length, returned when the key orders above
    /// every element.
    pub fn insertion(&self, len: usize) -> usize {
        self.eq.or(self.gt).unwrap_or(len)
    }
}

/// The stretch of a sorted sequence covered by a key range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeDescriptor {
    /// First in-range position.
    pub first: Option<usize>,
    /// Last in-range position.
    pub last: Option<usize>,
    /// Number of in-range positions.
    pub total: usize,
}

impl RangeDescriptor {
    /// Descriptor of an empty resolution.
    pub fn empty() -> Self {
        Self {
            first: None,
            last: None,
            total: 0,
        }
    }

    /// Returns `true` if the range covered no elements.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// Locates `key` in a key-sorted sequence.
///
/// Duplicate keys are allowed; `eq` reports the leftmost match and `gt`
/// the first position past the run.
pub fn search<E: Keyed>(seq: &[E], key: &Key) -> PositionBracket {
    let lo = seq.partition_point(|e| e.sort_key() < key);
    let hi = seq.partition_point(|e| e.sort_key() <= key);
    PositionBracket {
        lt: lo.checked_sub(1),
        eq: (lo < hi).then_some(lo),
        gt: (hi < seq.len()).then_some(hi),
    }
}

/// First position of the sequence satisfying the range's lower bound.
pub fn lower_boundary<E: Keyed>(seq: &[E], range: &KeyRange) -> Option<usize> {
    let first = match range.lower() {
        None => 0,
        Some(bound) if range.lower_open() => seq.partition_point(|e| e.sort_key() <= bound),
        Some(bound) => seq.partition_point(|e| e.sort_key() < bound),
    };
    (first < seq.len()).then_some(first)
}

/// Last position of the sequence satisfying the range's upper bound.
pub fn upper_boundary<E: Keyed>(seq: &[E], range: &KeyRange) -> Option<usize> {
    let past = match range.upper() {
        None => seq.len(),
        Some(bound) if range.upper_open() => seq.partition_point(|e| e.sort_key() < bound),
        Some(bound) => seq.partition_point(|e| e.sort_key() <= bound),
    };
    past.checked_sub(1)
}

/// Resolves a range against a key-sorted sequence.
///
/// On a sequence with duplicate keys an `only` range covers the full
/// contiguous run sharing the key.
pub fn resolve_range<E: Keyed>(seq: &[E], range: &KeyRange) -> RangeDescriptor {
    let (Some(first), Some(last)) = (lower_boundary(seq, range), upper_boundary(seq, range))
    else {
        return RangeDescriptor::empty();
    };
    if first > last {
        return RangeDescriptor::empty();
    }
    RangeDescriptor {
        first: Some(first),
        last: Some(last),
        total: last - first + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(values: &[i64]) -> Vec<Key> {
        values.iter().map(|&v| Key::from(v)).collect()
    }

    #[test]
    fn search_finds_present_key() {
        let seq = keys(&[10, 20, 30]);
        let bracket = search(&seq, &Key::from(20));
        assert_eq!(bracket.lt, Some(0));
        assert_eq!(bracket.eq, Some(1));
        assert_eq!(bracket.gt, Some(2));
        assert!(bracket.found());
    }

    #[test]
    fn search_brackets_absent_key() {
        let seq = keys(&[10, 20, 30]);
        let bracket = search(&seq, &Key::from(25));
        assert_eq!(bracket.lt, Some(1));
        assert_eq!(bracket.eq, None);
        assert_eq!(bracket.gt, Some(2));
        assert_eq!(bracket.insertion(seq.len()), 2);
    }

    #[test]
    fn search_at_sequence_edges() {
        let seq = keys(&[10, 20, 30]);

        let below = search(&seq, &Key::from(5));
        assert_eq!((below.lt, below.eq, below.gt), (None, None, Some(0)));
        assert_eq!(below.insertion(seq.len()), 0);

        let above = search(&seq, &Key::from(35));
        assert_eq!((above.lt, above.eq, above.gt), (Some(2), None, None));
        assert_eq!(above.insertion(seq.len()), 3);

        let first = search(&seq, &Key::from(10));
        assert_eq!((first.lt, first.eq, first.gt), (None, Some(0), Some(1)));
    }

    #[test]
    fn search_empty_sequence() {
        let seq: Vec<Key> = vec![];
        let bracket = search(&seq, &Key::from(1));
        assert_eq!((bracket.lt, bracket.eq, bracket.gt), (None, None, None));
        assert_eq!(bracket.insertion(0), 0);
    }

    #[test]
    fn search_reports_leftmost_of_duplicate_run() {
        let seq = keys(&[10, 20, 20, 20, 30]);
        let bracket = search(&seq, &Key::from(20));
        assert_eq!(bracket.lt, Some(0));
        assert_eq!(bracket.eq, Some(1));
        assert_eq!(bracket.gt, Some(4));
    }

    #[test]
    fn resolve_only_covers_duplicate_run() {
        let seq = keys(&[10, 20, 20, 20, 30]);
        let desc = resolve_range(&seq, &KeyRange::only(20).unwrap());
        assert_eq!(desc.first, Some(1));
        assert_eq!(desc.last, Some(3));
        assert_eq!(desc.total, 3);
    }

    #[test]
    fn resolve_open_bounds() {
        let seq = keys(&[10, 20, 30, 40]);
        let desc = resolve_range(&seq, &KeyRange::bound(10, 40, true, true).unwrap());
        assert_eq!(desc.first, Some(1));
        assert_eq!(desc.last, Some(2));
        assert_eq!(desc.total, 2);
    }

    #[test]
    fn resolve_unbounded_range() {
        let seq = keys(&[10, 20, 30]);
        let desc = resolve_range(&seq, &KeyRange::all());
        assert_eq!(desc.first, Some(0));
        assert_eq!(desc.last, Some(2));
        assert_eq!(desc.total, 3);
    }

    #[test]
    fn resolve_range_missing_everything() {
        let seq = keys(&[10, 20, 30]);
        let desc = resolve_range(&seq, &KeyRange::bound(21, 29, false, false).unwrap());
        assert!(desc.is_empty());
        assert_eq!(desc, RangeDescriptor::empty());
    }

    #[test]
    fn resolve_range_on_empty_sequence() {
        let seq: Vec<Key> = vec![];
        assert!(resolve_range(&seq, &KeyRange::all()).is_empty());
    }

    #[test]
    fn boundaries_honor_openness() {
        let seq = keys(&[10, 20, 30]);
        let range = KeyRange::bound(10, 30, true, false).unwrap();
        assert_eq!(lower_boundary(&seq, &range), Some(1));
        assert_eq!(upper_boundary(&seq, &range), Some(2));
    }
}
