//! Dynamic record value type.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A dynamic record value.
///
/// This type represents any value OrdDB can store. Numbers are always
/// `f64`; dates carry millisecond precision in UTC. Only a subset of
/// these shapes is usable as a primary or index key (see
/// [`Key`](crate::key::Key)).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Floating-point number (integers included).
    Number(f64),
    /// Text string (UTF-8).
    String(String),
    /// Timestamp in UTC.
    Date(DateTime<Utc>),
    /// Array of values.
    Array(Vec<Value>),
    /// Object with string fields, sorted by field name.
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Create an object value from field/value pairs.
    ///
    /// Later duplicates of a field name win.
    pub fn object<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as a number, if it is one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as a date, if it is one.
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Get this value as an array, if it is one.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get this value as an object, if it is one.
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    /// Get this value as a mutable object, if it is one.
    pub fn as_object_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    /// Look up a field in this object value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(field),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        #[allow(clippy::cast_precision_loss)]
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_fields_are_sorted() {
        let obj = Value::object([("z", Value::from(1)), ("a", Value::from(2))]);

        if let Value::Object(map) = obj {
            let fields: Vec<&str> = map.keys().map(String::as_str).collect();
            assert_eq!(fields, vec!["a", "z"]);
        } else {
            panic!("Expected Object");
        }
    }

    #[test]
    fn object_get() {
        let obj = Value::object([
            ("name", Value::from("Alice")),
            ("age", Value::from(30)),
        ]);

        assert_eq!(obj.get("name"), Some(&Value::from("Alice")));
        assert_eq!(obj.get("age"), Some(&Value::Number(30.0)));
        assert_eq!(obj.get("missing"), None);
    }

    #[test]
    fn value_accessors() {
        assert!(Value::Null.is_null());
        assert!(!Value::Bool(true).is_null());

        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Number(42.0).as_bool(), None);

        assert_eq!(Value::Number(42.0).as_number(), Some(42.0));
        assert_eq!(Value::from("42").as_number(), None);

        assert_eq!(Value::from("hello").as_str(), Some("hello"));
        assert_eq!(
            Value::from(vec![1i64, 2, 3]).as_array(),
            Some(&[Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)][..])
        );
    }

    #[test]
    fn from_impls() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(42i64), Value::Number(42.0));
        assert_eq!(Value::from(42i32), Value::Number(42.0));
        assert_eq!(Value::from(42u32), Value::Number(42.0));
        assert_eq!(Value::from("hello"), Value::String("hello".to_string()));
        assert_eq!(Value::from(()), Value::Null);
    }

    #[test]
    fn serde_round_trip() {
        let value = Value::object([
            ("id", Value::from(7)),
            ("tags", Value::from(vec!["a", "b"])),
            ("active", Value::from(true)),
        ]);

        let json = serde_json::to_string(&value).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }
}
