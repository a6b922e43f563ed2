//! Test fixtures and database helpers.
//!
//! Provides convenience constructors for common store shapes and a
//! model-tracking harness for randomized testing.

use std::collections::BTreeMap;

use ordb_core::{
    Database, IndexConfig, Key, KeyPath, StoreConfig, StoreHandle, Value,
};

/// A sorted "users" store keyed by the `id` field.
pub fn users_config() -> StoreConfig {
    StoreConfig::new("users").key_path(KeyPath::single("id"))
}

/// A "users" store with a name index and a multi-entry tag index.
pub fn indexed_users_config() -> StoreConfig {
    users_config()
        .index(IndexConfig::new("by_name", KeyPath::single("name")))
        .index(IndexConfig::new("by_tag", KeyPath::single("tags")).multi_entry())
}

/// An insertion-ordered "log" store keyed by the `seq` field.
pub fn log_config() -> StoreConfig {
    StoreConfig::new("log")
        .key_path(KeyPath::single("seq"))
        .natural_order()
}

/// Builds a user record value.
pub fn user(id: i64, name: &str) -> Value {
    Value::object([("id", Value::from(id)), ("name", Value::from(name))])
}

/// Builds a user record value carrying tags.
pub fn tagged_user(id: i64, name: &str, tags: &[&str]) -> Value {
    Value::object([
        ("id", Value::from(id)),
        ("name", Value::from(name)),
        (
            "tags",
            Value::Array(tags.iter().map(|t| Value::from(*t)).collect()),
        ),
    ])
}

/// Converts a JSON value into a record [`Value`].
///
/// Handy with [`serde_json::json!`] for declaring fixture records
/// inline. Numbers become `f64`, the same shape stored records use.
/// JSON has no date literal; build [`Value::Date`] directly where a
/// fixture needs one.
pub fn value_from_json(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            Value::Number(n.as_f64().expect("JSON number fits in f64"))
        }
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => {
            Value::Array(items.into_iter().map(value_from_json).collect())
        }
        serde_json::Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(name, field)| (name, value_from_json(field)))
                .collect(),
        ),
    }
}

/// Runs a test against a database holding an empty "users" store.
///
/// # Example
///
/// ```rust,ignore
/// use ordb_testkit::{user, with_users_db};
///
/// #[test]
/// fn my_test() {
///     with_users_db(|db| {
///         db.store("users").unwrap().put(user(1, "ada")).unwrap();
///     });
/// }
/// ```
pub fn with_users_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let db = Database::new();
    db.create_store(users_config()).expect("users store");
    f(&db)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// A database whose "users" store holds `count` records with ids
    /// `0..count`.
    pub fn populated_database(count: i64) -> Database {
        let db = Database::new();
        let users = db.create_store(users_config()).expect("users store");
        for id in 0..count {
            users
                .put(user(id, &format!("user_{id}")))
                .expect("failed to seed user");
        }
        db
    }

    /// A database with `count` single-record stores, returning the store
    /// names.
    pub fn multi_store_database(count: usize) -> (Database, Vec<String>) {
        let db = Database::new();
        let mut names = Vec::with_capacity(count);
        for i in 0..count {
            let name = format!("store_{i}");
            let handle = db
                .create_store(StoreConfig::new(&name).key_path(KeyPath::single("id")))
                .expect("store");
            handle.put(user(i as i64, &name)).expect("seed record");
            names.push(name);
        }
        (db, names)
    }
}

/// A store paired with an in-memory model of its expected contents.
///
/// Every mutation goes to both; [`MirroredStore::verify`] asserts they
/// still agree. A `BTreeMap` keyed by [`Key`] iterates in exactly the
/// order a sorted store keeps, so ordering is verified for free.
pub struct MirroredStore {
    handle: StoreHandle,
    model: BTreeMap<Key, Value>,
}

impl MirroredStore {
    /// Wraps a store handle with an empty model.
    ///
    /// The store must be empty and keyed by an in-value key path; the
    /// model has no way to learn generated keys after the fact.
    pub fn new(handle: StoreHandle) -> Self {
        assert_eq!(
            handle.len().expect("live store"),
            0,
            "MirroredStore must start from an empty store"
        );
        Self {
            handle,
            model: BTreeMap::new(),
        }
    }

    /// The underlying store handle.
    pub fn handle(&self) -> &StoreHandle {
        &self.handle
    }

    /// Puts a value into both the store and the model.
    pub fn put(&mut self, value: Value) {
        let key = self.handle.put(value.clone()).expect("put failed");
        self.model.insert(key, value);
    }

    /// Removes a key from both; returns whether either held it.
    pub fn remove(&mut self, key: impl Into<Key>) -> bool {
        let key = key.into();
        let stored = self.handle.remove(key.clone()).expect("remove failed");
        let modeled = self.model.remove(&key).is_some();
        assert_eq!(
            stored, modeled,
            "store and model disagree on the existence of {key}"
        );
        stored
    }

    /// Reads a key from the store, asserting the model agrees.
    pub fn get(&self, key: impl Into<Key>) -> Option<Value> {
        let key = key.into();
        let stored = self.handle.get(key.clone()).expect("get failed");
        assert_eq!(
            stored.as_ref(),
            self.model.get(&key),
            "store and model disagree on the value of {key}"
        );
        stored
    }

    /// Clears both.
    pub fn clear(&mut self) {
        let cleared = self.handle.clear().expect("clear failed");
        assert_eq!(
            cleared,
            self.model.len(),
            "clear removed a different number of records than the model holds"
        );
        self.model.clear();
    }

    /// Number of records the model expects.
    pub fn expected_len(&self) -> usize {
        self.model.len()
    }

    /// Asserts the store's contents, order, and count match the model.
    pub fn verify(&self) {
        assert_eq!(
            self.handle.len().expect("live store"),
            self.model.len(),
            "record count drifted from the model"
        );
        let keys = self.handle.get_all_keys(None, None).expect("scan failed");
        let expected: Vec<&Key> = self.model.keys().collect();
        assert_eq!(
            keys.iter().collect::<Vec<_>>(),
            expected,
            "key order drifted from the model"
        );
        for (key, value) in &self.model {
            let stored = self
                .handle
                .get(key.clone())
                .expect("get failed")
                .unwrap_or_else(|| panic!("record {key} missing from the store"));
            assert_eq!(&stored, value, "value mismatch for {key}");
        }
    }
}
