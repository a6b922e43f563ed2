//! Key model: key values, ranges, key paths, and sorted-sequence search.
//!
//! Every record is addressed by a [`Key`]. Keys of different shapes are
//! mutually comparable under a single total order, which is what lets one
//! sorted sequence hold numbers, dates, strings, and arrays side by side.

mod path;
mod range;
mod search;

pub use path::KeyPath;
pub use range::KeyRange;
pub use search::{
    lower_boundary, resolve_range, search, upper_boundary, Keyed, PositionBracket,
    RangeDescriptor,
};

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::value::Value;

/// A primary or index key.
///
/// Keys order by shape first (`Number < Date < String < Array`), then by
/// content: numeric, chronological, lexicographic, or element-wise with a
/// shorter array sorting before its extensions.
///
/// `NaN` is not a valid key and is rejected by [`Key::validated`]; negative
/// zero normalizes to positive zero there as well. All store and index
/// entry points validate keys on the way in, so keys held by the engine
/// always satisfy `Eq`/`Ord`/`Hash` coherently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Key {
    /// Floating-point number (integers included).
    Number(f64),
    /// Timestamp in UTC.
    Date(DateTime<Utc>),
    /// Text string.
    String(String),
    /// Array of keys (compound keys).
    Array(Vec<Key>),
}

impl Key {
    /// Shape rank used as the most significant ordering criterion.
    fn shape_rank(&self) -> u8 {
        match self {
            Key::Number(_) => 0,
            Key::Date(_) => 1,
            Key::String(_) => 2,
            Key::Array(_) => 3,
        }
    }

    /// Returns `true` if this key (and every nested element) is valid.
    ///
    /// The only invalid key content is a `NaN` number.
    pub fn is_valid(&self) -> bool {
        match self {
            Key::Number(n) => !n.is_nan(),
            Key::Date(_) | Key::String(_) => true,
            Key::Array(elems) => elems.iter().all(Key::is_valid),
        }
    }

    /// Validates and normalizes this key.
    ///
    /// Rejects `NaN` anywhere in the key with a data error and folds
    /// negative zero into positive zero so equal-comparing keys are
    /// identical.
    pub fn validated(self) -> StoreResult<Self> {
        match self {
            Key::Number(n) => {
                if n.is_nan() {
                    return Err(StoreError::data("NaN is not a valid key"));
                }
                // -0.0 and 0.0 must be the same key.
                Ok(Key::Number(if n == 0.0 { 0.0 } else { n }))
            }
            Key::Date(d) => Ok(Key::Date(d)),
            Key::String(s) => Ok(Key::String(s)),
            Key::Array(elems) => {
                let elems = elems
                    .into_iter()
                    .map(Key::validated)
                    .collect::<StoreResult<Vec<_>>>()?;
                Ok(Key::Array(elems))
            }
        }
    }

    /// Converts a record value into a key, if the value has key shape.
    ///
    /// Numbers (excluding `NaN`), strings, dates, and arrays of key-shaped
    /// values qualify; null, booleans, and objects do not.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) if !n.is_nan() => Some(Key::Number(if *n == 0.0 { 0.0 } else { *n })),
            Value::String(s) => Some(Key::String(s.clone())),
            Value::Date(d) => Some(Key::Date(*d)),
            Value::Array(elems) => {
                let keys = elems
                    .iter()
                    .map(Key::from_value)
                    .collect::<Option<Vec<_>>>()?;
                Some(Key::Array(keys))
            }
            _ => None,
        }
    }

    /// Converts this key back into a record value.
    pub fn to_value(&self) -> Value {
        match self {
            Key::Number(n) => Value::Number(*n),
            Key::Date(d) => Value::Date(*d),
            Key::String(s) => Value::String(s.clone()),
            Key::Array(elems) => Value::Array(elems.iter().map(Key::to_value).collect()),
        }
    }
}

/// Compares two keys under the cross-shape total order.
///
/// Fails with a data error if either key is invalid (contains `NaN`).
/// Internal code paths compare via `Ord` directly because keys inside the
/// engine are validated on entry.
pub fn compare(a: &Key, b: &Key) -> StoreResult<Ordering> {
    if !a.is_valid() {
        return Err(StoreError::data("left operand is not a valid key"));
    }
    if !b.is_valid() {
        return Err(StoreError::data("right operand is not a valid key"));
    }
    Ok(a.cmp(b))
}

/// Sorts keys in place under the cross-shape total order.
pub fn sort_keys(keys: &mut [Key], ascending: bool) {
    keys.sort_by(|a, b| if ascending { a.cmp(b) } else { b.cmp(a) });
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        let rank = self.shape_rank().cmp(&other.shape_rank());
        if rank != Ordering::Equal {
            return rank;
        }
        match (self, other) {
            // total_cmp keeps the order total even for unvalidated keys.
            (Key::Number(a), Key::Number(b)) => a.total_cmp(b),
            (Key::Date(a), Key::Date(b)) => a.cmp(b),
            (Key::String(a), Key::String(b)) => a.cmp(b),
            (Key::Array(a), Key::Array(b)) => a.cmp(b),
            _ => unreachable!("shape ranks already compared equal"),
        }
    }
}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.shape_rank().hash(state);
        match self {
            Key::Number(n) => n.to_bits().hash(state),
            Key::Date(d) => d.hash(state),
            Key::String(s) => s.hash(state),
            Key::Array(elems) => elems.hash(state),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Number(n) => write!(f, "{n}"),
            Key::Date(d) => write!(f, "{}", d.to_rfc3339()),
            Key::String(s) => write!(f, "{s:?}"),
            Key::Array(elems) => {
                write!(f, "[")?;
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<f64> for Key {
    fn from(n: f64) -> Self {
        Key::Number(n)
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        #[allow(clippy::cast_precision_loss)]
        Key::Number(n as f64)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Number(f64::from(n))
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Key::Number(f64::from(n))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::String(s)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::String(s.to_string())
    }
}

impl From<DateTime<Utc>> for Key {
    fn from(d: DateTime<Utc>) -> Self {
        Key::Date(d)
    }
}

impl From<Vec<Key>> for Key {
    fn from(elems: Vec<Key>) -> Self {
        Key::Array(elems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn shapes_order_number_date_string_array() {
        let number = Key::from(1_000_000);
        let date = Key::from(date(1970, 1, 1));
        let string = Key::from("");
        let array = Key::Array(vec![]);

        assert!(number < date);
        assert!(date < string);
        assert!(string < array);
    }

    #[test]
    fn numbers_order_numerically() {
        let mut keys = vec![Key::from(3.5), Key::from(-10), Key::from(0), Key::from(2)];
        sort_keys(&mut keys, true);
        assert_eq!(
            keys,
            vec![Key::from(-10), Key::from(0), Key::from(2), Key::from(3.5)]
        );
    }

    #[test]
    fn strings_order_lexicographically() {
        assert!(Key::from("a") < Key::from("ab"));
        assert!(Key::from("ab") < Key::from("b"));
    }

    #[test]
    fn array_prefix_sorts_before_extension() {
        let short = Key::Array(vec![Key::from(1)]);
        let long = Key::Array(vec![Key::from(1), Key::from(0)]);
        assert!(short < long);

        let early = Key::Array(vec![Key::from(1), Key::from(9)]);
        let late = Key::Array(vec![Key::from(2)]);
        assert!(early < late);
    }

    #[test]
    fn nested_arrays_compare_elementwise() {
        let a = Key::Array(vec![Key::from("x"), Key::Array(vec![Key::from(1)])]);
        let b = Key::Array(vec![Key::from("x"), Key::Array(vec![Key::from(2)])]);
        assert!(a < b);
    }

    #[test]
    fn nan_is_rejected() {
        assert!(Key::Number(f64::NAN).validated().is_err());
        assert!(!Key::Array(vec![Key::Number(f64::NAN)]).is_valid());
        assert!(compare(&Key::Number(f64::NAN), &Key::from(1)).is_err());
    }

    #[test]
    fn negative_zero_normalizes() {
        let key = Key::Number(-0.0).validated().unwrap();
        assert_eq!(key, Key::Number(0.0));
        if let Key::Number(n) = key {
            assert!(n.is_sign_positive());
        }
    }

    #[test]
    fn from_value_accepts_key_shapes_only() {
        assert_eq!(Key::from_value(&Value::from(2)), Some(Key::from(2)));
        assert_eq!(Key::from_value(&Value::from("a")), Some(Key::from("a")));
        assert_eq!(Key::from_value(&Value::Bool(true)), None);
        assert_eq!(Key::from_value(&Value::Null), None);
        assert_eq!(Key::from_value(&Value::Number(f64::NAN)), None);

        let array = Value::from(vec![Value::from(1), Value::from("a")]);
        assert_eq!(
            Key::from_value(&array),
            Some(Key::Array(vec![Key::from(1), Key::from("a")]))
        );

        let mixed = Value::Array(vec![Value::from(1), Value::Null]);
        assert_eq!(Key::from_value(&mixed), None);
    }

    #[test]
    fn sort_keys_descending() {
        let mut keys = vec![Key::from("b"), Key::from(7), Key::from("a")];
        sort_keys(&mut keys, false);
        assert_eq!(keys, vec![Key::from("b"), Key::from("a"), Key::from(7)]);
    }

    #[test]
    fn display_is_compact() {
        assert_eq!(Key::from(42).to_string(), "42");
        assert_eq!(Key::from("id").to_string(), "\"id\"");
        assert_eq!(
            Key::Array(vec![Key::from(1), Key::from("a")]).to_string(),
            "[1, \"a\"]"
        );
    }
}
