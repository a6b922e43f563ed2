//! Property-based test generators using proptest.
//!
//! Strategies produce valid keys, values, ranges, and operation
//! sequences; anything a generator emits is accepted by the engine's
//! validation, so failures point at real defects.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use ordb_core::key::compare;
use ordb_core::{Key, KeyRange, Value};
use proptest::prelude::*;

/// Strategy for scalar (non-array) keys: numbers, dates, and strings.
pub fn scalar_key_strategy() -> impl Strategy<Value = Key> {
    prop_oneof![
        3 => (-1.0e9..1.0e9f64).prop_map(|n| {
            // Validation folds -0.0 into 0.0; generate the folded form.
            Key::Number(if n == 0.0 { 0.0 } else { n })
        }),
        1 => any::<i32>().prop_map(|n| Key::Number(f64::from(n))),
        1 => (0i64..4_102_444_800).prop_map(|secs| {
            Key::Date(DateTime::<Utc>::from_timestamp(secs, 0).expect("timestamp in range"))
        }),
        3 => "[a-z]{0,12}".prop_map(Key::String),
    ]
}

/// Strategy for keys of every shape, arrays included.
pub fn key_strategy() -> impl Strategy<Value = Key> {
    prop_oneof![
        4 => scalar_key_strategy(),
        1 => prop::collection::vec(scalar_key_strategy(), 1..4).prop_map(Key::Array),
    ]
}

/// Strategy for valid store names.
pub fn store_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_]{0,31}").expect("valid regex")
}

/// Strategy for leaf payload values.
fn leaf_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        (-1.0e9..1.0e9f64).prop_map(Value::Number),
        "[a-z]{0,8}".prop_map(Value::from),
    ]
}

/// Strategy for payload values with one level of nesting.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        4 => leaf_value_strategy(),
        1 => prop::collection::vec(leaf_value_strategy(), 0..4).prop_map(Value::Array),
        1 => prop::collection::btree_map("[a-z]{1,6}", leaf_value_strategy(), 0..4)
            .prop_map(Value::Object),
    ]
}

/// Strategy for record values keyed by a numeric `id` in `0..id_space`,
/// with a `name` field and a `tags` array.
///
/// A small id space makes generated operation sequences collide on keys,
/// which is where overwrite and delete behavior actually gets exercised.
pub fn record_strategy(id_space: i64) -> impl Strategy<Value = Value> {
    (
        0..id_space,
        "[a-z]{1,8}",
        prop::collection::vec("[a-z]{1,5}", 0..3),
    )
        .prop_map(|(id, name, tags)| {
            Value::object([
                ("id", Value::from(id)),
                ("name", Value::from(name)),
                (
                    "tags",
                    Value::Array(tags.into_iter().map(Value::from).collect()),
                ),
            ])
        })
}

/// Strategy for valid key ranges over scalar keys.
pub fn key_range_strategy() -> impl Strategy<Value = KeyRange> {
    prop_oneof![
        4 => (
            scalar_key_strategy(),
            scalar_key_strategy(),
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(|(a, b, lower_open, upper_open)| {
                match compare(&a, &b).expect("generated keys are valid") {
                    Ordering::Equal => KeyRange::only(a).expect("valid key"),
                    Ordering::Less => KeyRange::bound(a, b, lower_open, upper_open)
                        .expect("bounds are ordered"),
                    Ordering::Greater => KeyRange::bound(b, a, lower_open, upper_open)
                        .expect("bounds are ordered"),
                }
            }),
        1 => (scalar_key_strategy(), any::<bool>())
            .prop_map(|(k, open)| KeyRange::lower_bound(k, open).expect("valid key")),
        1 => (scalar_key_strategy(), any::<bool>())
            .prop_map(|(k, open)| KeyRange::upper_bound(k, open).expect("valid key")),
    ]
}

/// One randomized store operation.
#[derive(Debug, Clone)]
pub enum StoreOperation {
    /// Put a record, overwriting any record under the same id.
    Put {
        /// Record value carrying its own `id`.
        value: Value,
    },
    /// Remove the record under an id.
    Remove {
        /// Primary key to remove.
        id: i64,
    },
    /// Read the record under an id.
    Get {
        /// Primary key to read.
        id: i64,
    },
    /// Drop every record.
    Clear,
}

/// Strategy for single store operations over a shared id space.
pub fn store_operation_strategy(id_space: i64) -> impl Strategy<Value = StoreOperation> {
    prop_oneof![
        5 => record_strategy(id_space).prop_map(|value| StoreOperation::Put { value }),
        3 => (0..id_space).prop_map(|id| StoreOperation::Remove { id }),
        2 => (0..id_space).prop_map(|id| StoreOperation::Get { id }),
        1 => Just(StoreOperation::Clear),
    ]
}

/// Strategy for operation sequences.
pub fn operation_sequence_strategy(
    id_space: i64,
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<StoreOperation>> {
    prop::collection::vec(store_operation_strategy(id_space), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
