//! Insertion-ordered storage.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::key::{Key, KeyRange, PositionBracket};
use crate::record::Record;
use crate::store::Storage;

/// Storage that keeps records in insertion order.
///
/// A key-to-position map backs point lookups; range queries scan the
/// array (an `only` range short-circuits through the map). Supports
/// splicing a record in front of an existing one.
#[derive(Debug, Default)]
pub(crate) struct NaturalStorage {
    records: Arc<Vec<Record>>,
    positions: Arc<HashMap<Key, usize>>,
}

impl NaturalStorage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Shifts mapped positions at or above `from` by `delta` (+1/-1).
    fn shift_positions(positions: &mut HashMap<Key, usize>, from: usize, delta: isize) {
        for position in positions.values_mut() {
            if *position >= from {
                #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
                {
                    *position = (*position as isize + delta) as usize;
                }
            }
        }
    }
}

impl Storage for NaturalStorage {
    fn len(&self) -> usize {
        self.records.len()
    }

    fn records(&self) -> &[Record] {
        &self.records
    }

    fn retrieve(&self, key: &Key) -> PositionBracket {
        match self.positions.get(key) {
            Some(&at) => PositionBracket {
                lt: at.checked_sub(1),
                eq: Some(at),
                gt: (at + 1 < self.records.len()).then_some(at + 1),
            },
            // No order to bracket against in a natural store.
            None => PositionBracket {
                lt: None,
                eq: None,
                gt: None,
            },
        }
    }

    fn get(&self, key: &Key) -> Option<&Record> {
        self.positions.get(key).map(|&at| &self.records[at])
    }

    fn in_range_positions(&self, range: &KeyRange) -> Vec<usize> {
        if let Some(key) = range.only_key() {
            return self.positions.get(key).copied().into_iter().collect();
        }
        self.records
            .iter()
            .enumerate()
            .filter(|(_, record)| range.contains(&record.key))
            .map(|(at, _)| at)
            .collect()
    }

    fn insert(&mut self, record: Record, before: Option<&Key>) -> StoreResult<usize> {
        let at = match before {
            None => self.records.len(),
            Some(anchor) => match self.positions.get(anchor) {
                Some(&at) => at,
                None => {
                    return Err(StoreError::data(format!(
                        "insert-before anchor {anchor} is not in the store"
                    )));
                }
            },
        };
        let positions = Arc::make_mut(&mut self.positions);
        Self::shift_positions(positions, at, 1);
        positions.insert(record.key.clone(), at);
        Arc::make_mut(&mut self.records).insert(at, record);
        Ok(at)
    }

    fn replace(&mut self, record: Record) -> StoreResult<usize> {
        let Some(&at) = self.positions.get(&record.key) else {
            return Err(StoreError::invalid_state(format!(
                "replace target {} vanished",
                record.key
            )));
        };
        Arc::make_mut(&mut self.records)[at] = record;
        Ok(at)
    }

    fn remove(&mut self, key: &Key) -> Option<(usize, Record)> {
        let positions = Arc::make_mut(&mut self.positions);
        let at = positions.remove(key)?;
        Self::shift_positions(positions, at + 1, -1);
        let record = Arc::make_mut(&mut self.records).remove(at);
        Some((at, record))
    }

    fn clear(&mut self) -> Vec<Record> {
        self.positions = Arc::new(HashMap::new());
        let previous = std::mem::take(&mut self.records);
        Arc::try_unwrap(previous).unwrap_or_else(|shared| (*shared).clone())
    }

    fn snapshot(&self) -> Box<dyn Storage> {
        Box::new(Self {
            records: Arc::clone(&self.records),
            positions: Arc::clone(&self.positions),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn record(key: &str) -> Record {
        Record::new(Key::from(key), Value::from(key))
    }

    #[test]
    fn records_keep_insertion_order() {
        let mut storage = NaturalStorage::new();
        for key in ["zebra", "apple", "mango"] {
            storage.insert(record(key), None).unwrap();
        }
        let keys: Vec<&Key> = storage.records().iter().map(|r| &r.key).collect();
        assert_eq!(
            keys,
            vec![&Key::from("zebra"), &Key::from("apple"), &Key::from("mango")]
        );
    }

    #[test]
    fn insert_before_splices_at_anchor() {
        let mut storage = NaturalStorage::new();
        storage.insert(record("a"), None).unwrap();
        storage.insert(record("c"), None).unwrap();

        let at = storage
            .insert(record("b"), Some(&Key::from("c")))
            .unwrap();
        assert_eq!(at, 1);

        let keys: Vec<&Key> = storage.records().iter().map(|r| &r.key).collect();
        assert_eq!(keys, vec![&Key::from("a"), &Key::from("b"), &Key::from("c")]);
        // The map keeps up with the shift.
        assert_eq!(storage.get(&Key::from("c")).unwrap().key, Key::from("c"));
    }

    #[test]
    fn insert_before_missing_anchor_fails() {
        let mut storage = NaturalStorage::new();
        let err = storage
            .insert(record("a"), Some(&Key::from("ghost")))
            .unwrap_err();
        assert!(err.is_data());
        assert_eq!(storage.len(), 0);
    }

    #[test]
    fn remove_shifts_later_positions() {
        let mut storage = NaturalStorage::new();
        for key in ["a", "b", "c"] {
            storage.insert(record(key), None).unwrap();
        }
        let (at, _) = storage.remove(&Key::from("a")).unwrap();
        assert_eq!(at, 0);
        assert_eq!(storage.get(&Key::from("c")).unwrap().key, Key::from("c"));
        assert_eq!(storage.retrieve(&Key::from("b")).eq, Some(0));
    }

    #[test]
    fn retrieve_brackets_by_array_adjacency() {
        let mut storage = NaturalStorage::new();
        for key in ["a", "b", "c"] {
            storage.insert(record(key), None).unwrap();
        }
        let bracket = storage.retrieve(&Key::from("b"));
        assert_eq!((bracket.lt, bracket.eq, bracket.gt), (Some(0), Some(1), Some(2)));

        let missing = storage.retrieve(&Key::from("zzz"));
        assert_eq!((missing.lt, missing.eq, missing.gt), (None, None, None));
    }

    #[test]
    fn range_queries_scan_in_array_order() {
        let mut storage = NaturalStorage::new();
        for key in ["delta", "alpha", "charlie"] {
            storage.insert(record(key), None).unwrap();
        }
        let range = KeyRange::bound("alpha", "delta", false, true).unwrap();
        // "delta" excluded by the open upper bound; order is positional.
        assert_eq!(storage.in_range_positions(&range), vec![1, 2]);
    }

    #[test]
    fn only_range_uses_the_map() {
        let mut storage = NaturalStorage::new();
        for key in ["a", "b"] {
            storage.insert(record(key), None).unwrap();
        }
        let range = KeyRange::only("b").unwrap();
        assert_eq!(storage.in_range_positions(&range), vec![1]);
        assert!(storage
            .in_range_positions(&KeyRange::only("nope").unwrap())
            .is_empty());
    }

    #[test]
    fn snapshot_shares_until_write() {
        let mut storage = NaturalStorage::new();
        storage.insert(record("a"), None).unwrap();

        let mut snap = storage.snapshot();
        snap.insert(record("b"), None).unwrap();

        assert_eq!(storage.len(), 1);
        assert_eq!(snap.len(), 2);
        assert!(snap.get(&Key::from("a")).is_some());
    }
}
