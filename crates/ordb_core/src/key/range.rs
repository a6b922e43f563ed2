//! Contiguous key intervals.

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::key::Key;

/// A contiguous interval over the key order.
///
/// Either bound may be absent (unbounded) and each present bound is open
/// or closed independently. Construction validates bound keys, so a range
/// held by the engine never contains an invalid key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRange {
    lower: Option<Key>,
    upper: Option<Key>,
    lower_open: bool,
    upper_open: bool,
}

impl KeyRange {
    /// The range containing every key.
    pub fn all() -> Self {
        Self {
            lower: None,
            upper: None,
            lower_open: false,
            upper_open: false,
        }
    }

    /// The range containing exactly one key.
    pub fn only(key: impl Into<Key>) -> StoreResult<Self> {
        let key = key.into().validated()?;
        Ok(Self {
            lower: Some(key.clone()),
            upper: Some(key),
            lower_open: false,
            upper_open: false,
        })
    }

    /// The range of all keys at or above `key` (above only, when `open`).
    pub fn lower_bound(key: impl Into<Key>, open: bool) -> StoreResult<Self> {
        let key = key.into().validated()?;
        Ok(Self {
            lower: Some(key),
            upper: None,
            lower_open: open,
            upper_open: false,
        })
    }

    /// The range of all keys at or below `key` (below only, when `open`).
    pub fn upper_bound(key: impl Into<Key>, open: bool) -> StoreResult<Self> {
        let key = key.into().validated()?;
        Ok(Self {
            lower: None,
            upper: Some(key),
            lower_open: false,
            upper_open: open,
        })
    }

    /// The range between `lower` and `upper`.
    ///
    /// Fails if `lower` orders above `upper`, or if the bounds are equal
    /// and either end is open (the range would be empty).
    pub fn bound(
        lower: impl Into<Key>,
        upper: impl Into<Key>,
        lower_open: bool,
        upper_open: bool,
    ) -> StoreResult<Self> {
        let lower = lower.into().validated()?;
        let upper = upper.into().validated()?;
        if lower > upper {
            return Err(StoreError::data(format!(
                "range lower bound {lower} is above upper bound {upper}"
            )));
        }
        if lower == upper && (lower_open || upper_open) {
            return Err(StoreError::data(
                "range with equal bounds must be closed on both ends",
            ));
        }
        Ok(Self {
            lower: Some(lower),
            upper: Some(upper),
            lower_open,
            upper_open,
        })
    }

    /// Lower bound key, if bounded below.
    pub fn lower(&self) -> Option<&Key> {
        self.lower.as_ref()
    }

    /// Upper bound key, if bounded above.
    pub fn upper(&self) -> Option<&Key> {
        self.upper.as_ref()
    }

    /// Whether the lower bound excludes its key.
    pub fn lower_open(&self) -> bool {
        self.lower_open
    }

    /// Whether the upper bound excludes its key.
    pub fn upper_open(&self) -> bool {
        self.upper_open
    }

    /// Returns the single key this range pins down, if it is an `only`
    /// range (equal closed bounds).
    pub fn only_key(&self) -> Option<&Key> {
        match (&self.lower, &self.upper) {
            (Some(lo), Some(hi)) if !self.lower_open && !self.upper_open && lo == hi => Some(lo),
            _ => None,
        }
    }

    /// Rebuilds the range with each bound key passed through `fold`.
    ///
    /// The `bound` checks do not rerun; bounds that invert under the
    /// mapping yield a range that contains nothing.
    pub(crate) fn map_bounds(&self, mut fold: impl FnMut(&Key) -> Key) -> Self {
        Self {
            lower: self.lower.as_ref().map(&mut fold),
            upper: self.upper.as_ref().map(&mut fold),
            lower_open: self.lower_open,
            upper_open: self.upper_open,
        }
    }

    /// Returns `true` if `key` lies inside the range.
    pub fn contains(&self, key: &Key) -> bool {
        if let Some(lower) = &self.lower {
            let ok = if self.lower_open {
                key > lower
            } else {
                key >= lower
            };
            if !ok {
                return false;
            }
        }
        if let Some(upper) = &self.upper {
            let ok = if self.upper_open {
                key < upper
            } else {
                key <= upper
            };
            if !ok {
                return false;
            }
        }
        true
    }
}
