//! Key-sorted storage.

use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::key::{resolve_range, search, Key, KeyRange, PositionBracket};
use crate::record::Record;
use crate::store::Storage;

/// Storage that keeps its record array sorted by primary key.
///
/// Lookups, range resolution, and splices all go through binary search.
#[derive(Debug, Default)]
pub(crate) struct SortedStorage {
    records: Arc<Vec<Record>>,
}

impl SortedStorage {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl Storage for SortedStorage {
    fn len(&self) -> usize {
        self.records.len()
    }

    fn records(&self) -> &[Record] {
        &self.records
    }

    fn retrieve(&self, key: &Key) -> PositionBracket {
        search(self.records.as_slice(), key)
    }

    fn get(&self, key: &Key) -> Option<&Record> {
        self.retrieve(key).eq.map(|at| &self.records[at])
    }

    fn in_range_positions(&self, range: &KeyRange) -> Vec<usize> {
        let desc = resolve_range(self.records.as_slice(), range);
        match (desc.first, desc.last) {
            (Some(first), Some(last)) => (first..=last).collect(),
            _ => Vec::new(),
        }
    }

    fn insert(&mut self, record: Record, before: Option<&Key>) -> StoreResult<usize> {
        if before.is_some() {
            return Err(StoreError::data(
                "insert-before requires a natural-order store",
            ));
        }
        let bracket = self.retrieve(&record.key);
        let at = bracket.insertion(self.records.len());
        Arc::make_mut(&mut self.records).insert(at, record);
        Ok(at)
    }

    fn replace(&mut self, record: Record) -> StoreResult<usize> {
        let Some(at) = self.retrieve(&record.key).eq else {
            return Err(StoreError::invalid_state(format!(
                "replace target {} vanished",
                record.key
            )));
        };
        Arc::make_mut(&mut self.records)[at] = record;
        Ok(at)
    }

    fn remove(&mut self, key: &Key) -> Option<(usize, Record)> {
        let at = self.retrieve(key).eq?;
        let record = Arc::make_mut(&mut self.records).remove(at);
        Some((at, record))
    }

    fn clear(&mut self) -> Vec<Record> {
        let previous = std::mem::take(&mut self.records);
        Arc::try_unwrap(previous).unwrap_or_else(|shared| (*shared).clone())
    }

    fn snapshot(&self) -> Box<dyn Storage> {
        Box::new(Self {
            records: Arc::clone(&self.records),
        })
    }
}
