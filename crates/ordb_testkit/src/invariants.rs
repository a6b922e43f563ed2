//! Invariant checkers over live stores.
//!
//! Each checker walks a store through its public surface and panics
//! with context on the first violation. They recompute expectations
//! independently (index fan-out included) rather than trusting the
//! engine's own bookkeeping, so a bug in shared code cannot hide
//! itself.

use std::cmp::Ordering;

use ordb_core::key::compare;
use ordb_core::{
    Direction, IndexConfig, Key, KeyPath, KeyRange, StoreHandle, StoreOrdering, Value,
};

/// Asserts the store's key layout matches its declared ordering.
///
/// Sorted stores must ascend strictly; natural stores must at least be
/// free of duplicate primary keys.
pub fn assert_key_order(store: &StoreHandle) {
    let config = store.config().expect("live store");
    let keys = store.get_all_keys(None, None).expect("scan failed");
    match config.ordering {
        StoreOrdering::Sorted => {
            for pair in keys.windows(2) {
                let order = compare(&pair[0], &pair[1]).expect("stored keys are valid");
                assert_eq!(
                    order,
                    Ordering::Less,
                    "sorted store holds {} before {}",
                    pair[0],
                    pair[1]
                );
            }
        }
        StoreOrdering::Natural => {
            let mut sorted = keys.clone();
            sorted.sort();
            let distinct = sorted.len();
            sorted.dedup();
            assert_eq!(
                sorted.len(),
                distinct,
                "natural store holds duplicate primary keys"
            );
        }
    }
}

/// Asserts every index reflects exactly the store's current records.
///
/// For each record the expected index keys are recomputed from the
/// record's value; every expectation must resolve back to the record,
/// and the index's total reference count must equal the sum of
/// expectations, so orphaned references are caught too.
pub fn assert_index_coherent(store: &StoreHandle) {
    let config = store.config().expect("live store");
    let keys = store.get_all_keys(None, None).expect("scan failed");
    let values = store.get_all(None, None).expect("scan failed");

    for index_config in &config.indexes {
        let index = store.index(&index_config.name).expect("declared index");
        let mut expected_refs = 0usize;

        for (primary_key, value) in keys.iter().zip(&values) {
            for index_key in expected_index_keys(index_config, value) {
                let range = KeyRange::only(index_key.clone()).expect("extracted key is valid");
                let referenced = index
                    .get_all_keys(Some(&range), None)
                    .expect("index scan failed");
                assert!(
                    referenced.contains(primary_key),
                    "index {:?} does not reference record {} under key {}",
                    index_config.name,
                    primary_key,
                    index_key
                );
                expected_refs += 1;
            }
        }

        assert_eq!(
            index.count(None).expect("index count failed"),
            expected_refs,
            "index {:?} holds references to records that no longer exist",
            index_config.name
        );

        if index_config.unique {
            assert_no_duplicate_index_keys(store, &index_config.name);
        }
    }
}

/// Asserts a range count agrees with filtering a full scan.
pub fn assert_range_counts_match(store: &StoreHandle, range: &KeyRange) {
    let counted = store.count(Some(range)).expect("count failed");
    let scanned = store
        .get_all_keys(None, None)
        .expect("scan failed")
        .iter()
        .filter(|key| range.contains(key))
        .count();
    assert_eq!(
        counted, scanned,
        "count over a range disagrees with a filtered scan"
    );
}

/// Asserts a cursor walk visits exactly the in-range records, each
/// once, in direction order.
pub fn assert_cursor_matches_scan(
    store: &StoreHandle,
    range: Option<&KeyRange>,
    direction: Direction,
) {
    let mut expected = store.get_all_keys(range, None).expect("scan failed");
    if !direction.forward() {
        expected.reverse();
    }

    let mut seen = Vec::new();
    let mut cursor = store
        .open_cursor(range.cloned(), direction)
        .expect("cursor open failed");
    while cursor.is_positioned() {
        seen.push(cursor.key().cloned().expect("positioned cursor has a key"));
        if !cursor.next().expect("cursor step failed") {
            break;
        }
    }

    assert_eq!(
        seen, expected,
        "{direction:?} cursor walk missed or repeated records"
    );
}

/// Recomputes the index keys a record value should fan out to.
///
/// Deliberately walks the value itself instead of calling the engine's
/// extraction, so the two derivations stay independent.
fn expected_index_keys(config: &IndexConfig, value: &Value) -> Vec<Key> {
    if config.multi_entry {
        let KeyPath::Single(path) = &config.key_path else {
            return Vec::new();
        };
        let mut leaf = value;
        for segment in path.split('.') {
            match leaf.get(segment) {
                Some(next) => leaf = next,
                None => return Vec::new(),
            }
        }
        return match leaf {
            Value::Array(elements) => {
                let mut keys: Vec<Key> = elements.iter().filter_map(Key::from_value).collect();
                keys.sort();
                keys.dedup();
                keys
            }
            other => Key::from_value(other).into_iter().collect(),
        };
    }
    match config.key_path.extract(value) {
        Some(key) => vec![key],
        None => Vec::new(),
    }
}

/// Walks an index's distinct keys and panics on a repeat.
fn assert_no_duplicate_index_keys(store: &StoreHandle, index_name: &str) {
    let index = store.index(index_name).expect("declared index");
    let mut cursor = index
        .open_key_cursor(None, Direction::Next)
        .expect("cursor open failed");
    let mut previous: Option<Key> = None;
    while cursor.is_positioned() {
        let current = cursor.key().cloned().expect("positioned cursor has a key");
        if let Some(prev) = &previous {
            assert_ne!(
                prev, &current,
                "unique index {index_name:?} references two records under one key"
            );
        }
        previous = Some(current);
        if !cursor.next().expect("cursor step failed") {
            break;
        }
    }
}
