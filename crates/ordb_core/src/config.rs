//! Store and index configuration.

use std::collections::BTreeMap;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::key::{Key, KeyPath};
use crate::value::Value;

/// How a store keeps its record array ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreOrdering {
    /// Records stay sorted by primary key.
    Sorted,
    /// Records stay in insertion order.
    Natural,
}

/// Configuration for one record store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Store name, unique within a database.
    pub name: String,

    /// Where the primary key lives inside stored values, if in-line.
    pub key_path: Option<KeyPath>,

    /// Whether missing keys are generated from a monotonic counter.
    pub auto_increment: bool,

    /// Whether string primary keys are folded to uppercase.
    pub uppercase_keys: bool,

    /// Fields merged into stored objects when absent.
    pub defaults: Option<BTreeMap<String, Value>>,

    /// Ordering strategy for the record array.
    pub ordering: StoreOrdering,

    /// Secondary indexes declared on the store.
    pub indexes: Vec<IndexConfig>,
}

impl StoreConfig {
    /// Creates a sorted, out-of-line-key store configuration.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: None,
            auto_increment: false,
            uppercase_keys: false,
            defaults: None,
            ordering: StoreOrdering::Sorted,
            indexes: Vec::new(),
        }
    }

    /// Sets the primary key path.
    #[must_use]
    pub fn key_path(mut self, path: KeyPath) -> Self {
        self.key_path = Some(path);
        self
    }

    /// Sets whether missing keys are generated.
    #[must_use]
    pub const fn auto_increment(mut self, value: bool) -> Self {
        self.auto_increment = value;
        self
    }

    /// Sets whether string primary keys fold to uppercase.
    #[must_use]
    pub const fn uppercase_keys(mut self, value: bool) -> Self {
        self.uppercase_keys = value;
        self
    }

    /// Sets fields merged into stored objects when absent.
    #[must_use]
    pub fn defaults<K: Into<String>>(mut self, fields: impl IntoIterator<Item = (K, Value)>) -> Self {
        self.defaults = Some(fields.into_iter().map(|(k, v)| (k.into(), v)).collect());
        self
    }

    /// Sets the ordering strategy.
    #[must_use]
    pub const fn ordering(mut self, ordering: StoreOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Keeps records in insertion order instead of key order.
    #[must_use]
    pub const fn natural_order(mut self) -> Self {
        self.ordering = StoreOrdering::Natural;
        self
    }

    /// Declares a secondary index.
    #[must_use]
    pub fn index(mut self, index: IndexConfig) -> Self {
        self.indexes.push(index);
        self
    }

    /// Checks the configuration is internally consistent.
    pub fn validate(&self) -> StoreResult<()> {
        if self.name.is_empty() {
            return Err(StoreError::data("store name must not be empty"));
        }
        if let Some(path) = &self.key_path {
            path.validate()?;
            if self.auto_increment && path.is_compound() {
                return Err(StoreError::data(
                    "auto-increment cannot be combined with a compound key path",
                ));
            }
        }
        let mut names = HashSet::new();
        for index in &self.indexes {
            index.validate()?;
            if !names.insert(index.name.as_str()) {
                return Err(StoreError::data(format!(
                    "duplicate index name {:?} on store {:?}",
                    index.name, self.name
                )));
            }
        }
        Ok(())
    }
}

/// Configuration for one secondary index.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Index name, unique within its store.
    pub name: String,

    /// Where the index key lives inside stored values.
    pub key_path: KeyPath,

    /// Whether each index key may reference at most one record.
    pub unique: bool,

    /// Whether array index keys fan out to one entry per element.
    pub multi_entry: bool,
}

impl IndexConfig {
    /// Creates a non-unique, single-entry index configuration.
    #[must_use]
    pub fn new(name: impl Into<String>, key_path: KeyPath) -> Self {
        Self {
            name: name.into(),
            key_path,
            unique: false,
            multi_entry: false,
        }
    }

    /// Makes the index enforce key uniqueness.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Makes array keys fan out to one entry per element.
    #[must_use]
    pub const fn multi_entry(mut self) -> Self {
        self.multi_entry = true;
        self
    }

    /// Checks the configuration is internally consistent.
    pub fn validate(&self) -> StoreResult<()> {
        if self.name.is_empty() {
            return Err(StoreError::data("index name must not be empty"));
        }
        self.key_path.validate()?;
        if self.multi_entry && self.key_path.is_compound() {
            return Err(StoreError::data(
                "multi-entry cannot be combined with a compound key path",
            ));
        }
        Ok(())
    }
}

/// Options for a single write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOptions {
    /// Whether an existing record under the same key is replaced.
    pub overwrite: bool,

    /// Explicit primary key, for stores without a key path.
    pub key: Option<Key>,

    /// Insert before this primary key (natural-order stores only).
    pub before: Option<Key>,
}

impl WriteOptions {
    /// Options for a put: overwrite an existing record.
    #[must_use]
    pub fn put() -> Self {
        Self {
            overwrite: true,
            key: None,
            before: None,
        }
    }

    /// Options for an add: fail if the key already exists.
    #[must_use]
    pub fn add() -> Self {
        Self {
            overwrite: false,
            key: None,
            before: None,
        }
    }

    /// Sets the explicit primary key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Inserts before this primary key (natural-order stores only).
    #[must_use]
    pub fn with_before(mut self, key: impl Into<Key>) -> Self {
        self.before = Some(key.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_pattern() {
        let config = StoreConfig::new("people")
            .key_path(KeyPath::single("id"))
            .auto_increment(true)
            .natural_order()
            .index(IndexConfig::new("by_name", KeyPath::single("name")).unique());

        assert_eq!(config.name, "people");
        assert!(config.auto_increment);
        assert_eq!(config.ordering, StoreOrdering::Natural);
        assert_eq!(config.indexes.len(), 1);
        assert!(config.indexes[0].unique);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_names_are_rejected() {
        assert!(StoreConfig::new("").validate().is_err());

        let config =
            StoreConfig::new("people").index(IndexConfig::new("", KeyPath::single("name")));
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_index_names_are_rejected() {
        let config = StoreConfig::new("people")
            .index(IndexConfig::new("by_name", KeyPath::single("name")))
            .index(IndexConfig::new("by_name", KeyPath::single("other")));
        assert!(config.validate().is_err());
    }

    #[test]
    fn auto_increment_rejects_compound_key_path() {
        let config = StoreConfig::new("people")
            .key_path(KeyPath::compound(["last", "first"]))
            .auto_increment(true);
        assert!(config.validate().is_err());
    }

    #[test]
    fn multi_entry_rejects_compound_key_path() {
        let index = IndexConfig::new("tags", KeyPath::compound(["a", "b"])).multi_entry();
        assert!(index.validate().is_err());
    }

    #[test]
    fn write_options() {
        assert!(WriteOptions::put().overwrite);
        assert!(!WriteOptions::add().overwrite);

        let options = WriteOptions::add().with_key(9).with_before("X");
        assert_eq!(options.key, Some(Key::from(9)));
        assert_eq!(options.before, Some(Key::from("X")));
    }
}
