//! Key paths: where a record's key lives inside its value.

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::key::Key;
use crate::value::Value;

/// A path from a record value to its key.
///
/// A single path is a dotted field chain (`"address.city"`). A compound
/// path names several such chains; extraction yields an array key with
/// one element per chain, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyPath {
    /// One dotted field chain.
    Single(String),
    /// Several dotted field chains forming an array key.
    Compound(Vec<String>),
}

impl KeyPath {
    /// Creates a single key path.
    pub fn single(path: impl Into<String>) -> Self {
        Self::Single(path.into())
    }

    /// Creates a compound key path.
    pub fn compound<P: Into<String>>(paths: impl IntoIterator<Item = P>) -> Self {
        Self::Compound(paths.into_iter().map(Into::into).collect())
    }

    /// Returns `true` for compound paths.
    pub fn is_compound(&self) -> bool {
        matches!(self, Self::Compound(_))
    }

    /// Checks the path is well formed: no empty chains, no empty segments.
    pub fn validate(&self) -> StoreResult<()> {
        let chains: &[String] = match self {
            Self::Single(path) => std::slice::from_ref(path),
            Self::Compound(paths) => {
                if paths.is_empty() {
                    return Err(StoreError::data("compound key path has no members"));
                }
                paths
            }
        };
        for chain in chains {
            if chain.is_empty() || chain.split('.').any(str::is_empty) {
                return Err(StoreError::data(format!("malformed key path {chain:?}")));
            }
        }
        Ok(())
    }

    /// Extracts the key this path names from `value`.
    ///
    /// Returns `None` when a field is missing along the way or the leaf
    /// does not have key shape.
    pub fn extract(&self, value: &Value) -> Option<Key> {
        match self {
            Self::Single(path) => Key::from_value(navigate(value, path)?),
            Self::Compound(paths) => {
                let parts = paths
                    .iter()
                    .map(|p| Key::from_value(navigate(value, p)?))
                    .collect::<Option<Vec<_>>>()?;
                Some(Key::Array(parts))
            }
        }
    }

    /// Resolves the raw leaf value this path points at, before any key
    /// conversion. Compound paths have no single leaf and resolve `None`.
    pub(crate) fn leaf_value<'v>(&self, value: &'v Value) -> Option<&'v Value> {
        match self {
            Self::Single(path) => navigate(value, path),
            Self::Compound(_) => None,
        }
    }

    /// Writes `key` into `value` at a single path, creating intermediate
    /// objects as needed.
    ///
    /// Used to surface generated keys in stored values. Returns `false`
    /// if the path is compound or crosses a non-object field.
    pub fn inject(&self, value: &mut Value, key: &Key) -> bool {
        let Self::Single(path) = self else {
            return false;
        };
        let mut current = value;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let Some(map) = current.as_object_mut() else {
                return false;
            };
            if segments.peek().is_none() {
                map.insert(segment.to_string(), key.to_value());
                return true;
            }
            current = map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Default::default()));
        }
        false
    }
}

/// Follows a dotted field chain through nested objects.
fn navigate<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}
