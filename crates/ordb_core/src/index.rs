//! Secondary indexes.
//!
//! An index is a key-sorted array of [`IndexRecord`]s, one per distinct
//! index key. Duplicates group inside the entry as a sorted list of
//! primary keys, so unique enforcement is a length check and duplicate
//! iteration order is always primary-key order.
//!
//! Indexes never dereference records themselves; they answer in primary
//! keys and the owning store resolves those to values.

use std::sync::Arc;

use crate::config::IndexConfig;
use crate::error::{StoreError, StoreResult};
use crate::key::{resolve_range, search, Key, KeyRange, Keyed};
use crate::record::Record;
use crate::value::Value;

/// One index entry: an index key and the primary keys of every record
/// currently carrying it.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    /// Index key.
    pub key: Key,
    /// Primary keys of matching records, ascending.
    pub primary_keys: Vec<Key>,
    /// Set when bulk loading deferred duplicate sorting.
    needs_sort: bool,
}

impl IndexRecord {
    fn new(key: Key, primary_key: Key) -> Self {
        Self {
            key,
            primary_keys: vec![primary_key],
            needs_sort: false,
        }
    }
}

impl Keyed for IndexRecord {
    fn sort_key(&self) -> &Key {
        &self.key
    }
}

/// A secondary index over one store.
///
/// The entry array lives behind an `Arc` so forking a store for a
/// transaction shares it until the first write.
#[derive(Debug, Clone)]
pub struct IndexEngine {
    config: IndexConfig,
    entries: Arc<Vec<IndexRecord>>,
    loading: bool,
}

impl IndexEngine {
    /// Creates an empty index from its configuration.
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Vec::new()),
            loading: false,
        }
    }

    /// Index name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The key-sorted entry array.
    pub fn entries(&self) -> &[IndexRecord] {
        &self.entries
    }

    /// The index keys this record fans out to.
    ///
    /// A record whose value yields no key at the index's path simply does
    /// not appear in the index. A multi-entry index turns an array leaf
    /// into one entry per distinct element, dropping elements without key
    /// shape instead of rejecting the whole array.
    pub fn index_keys_for(&self, record: &Record) -> Vec<Key> {
        if self.config.multi_entry {
            // Multi-entry paths are single chains; compound paths are
            // rejected at configuration time.
            return match self.config.key_path.leaf_value(&record.value) {
                Some(Value::Array(elems)) => {
                    let mut keys: Vec<Key> =
                        elems.iter().filter_map(Key::from_value).collect();
                    keys.sort();
                    keys.dedup();
                    keys
                }
                Some(leaf) => Key::from_value(leaf).into_iter().collect(),
                None => Vec::new(),
            };
        }
        match self.config.key_path.extract(&record.value) {
            Some(key) => vec![key],
            None => Vec::new(),
        }
    }

    /// Adds a record's index entries.
    ///
    /// All-or-nothing for this index: uniqueness is checked for every
    /// fanned-out key before any entry is touched.
    pub fn add(&mut self, record: &Record) -> StoreResult<()> {
        let keys = self.index_keys_for(record);
        if self.config.unique {
            for key in &keys {
                if let Some(entry) = self.entry(key) {
                    if !entry.primary_keys.is_empty() {
                        return Err(StoreError::constraint(
                            format!("index {:?}", self.config.name),
                            key.to_string(),
                        ));
                    }
                }
            }
        }

        if keys.is_empty() {
            return Ok(());
        }
        let entries = Arc::make_mut(&mut self.entries);
        for key in keys {
            let bracket = search(entries, &key);
            match bracket.eq {
                Some(at) => {
                    let entry = &mut entries[at];
                    if self.loading {
                        entry.primary_keys.push(record.key.clone());
                        entry.needs_sort = true;
                    } else {
                        let pos = entry.primary_keys.partition_point(|pk| pk < &record.key);
                        if entry.primary_keys.get(pos) != Some(&record.key) {
                            entry.primary_keys.insert(pos, record.key.clone());
                        }
                    }
                }
                None => {
                    let at = bracket.insertion(entries.len());
                    entries.insert(at, IndexRecord::new(key, record.key.clone()));
                }
            }
        }
        Ok(())
    }

    /// Removes a record's index entries.
    ///
    /// An entry left without primary keys is dropped from the array.
    pub fn remove(&mut self, record: &Record) {
        let keys = self.index_keys_for(record);
        if keys.is_empty() {
            return;
        }
        let entries = Arc::make_mut(&mut self.entries);
        for key in keys {
            if let Some(at) = search(entries, &key).eq {
                entries[at].primary_keys.retain(|pk| pk != &record.key);
                if entries[at].primary_keys.is_empty() {
                    entries.remove(at);
                }
            }
        }
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.entries = Arc::new(Vec::new());
        }
    }

    /// Enters bulk-loading mode: duplicate primary keys append unsorted
    /// and are sorted once in [`IndexEngine::end_load`].
    pub fn begin_load(&mut self) {
        self.loading = true;
    }

    /// Leaves bulk-loading mode, sorting every entry that deferred it.
    pub fn end_load(&mut self) {
        self.loading = false;
        let entries = Arc::make_mut(&mut self.entries);
        for entry in entries.iter_mut() {
            if entry.needs_sort {
                entry.primary_keys.sort();
                entry.primary_keys.dedup();
                entry.needs_sort = false;
            }
        }
    }

    /// The entry holding `key`, if present.
    pub fn entry(&self, key: &Key) -> Option<&IndexRecord> {
        search(self.entries.as_slice(), key)
            .eq
            .map(|at| &self.entries[at])
    }

    /// Number of record references within `range` (all, when `None`).
    pub fn count(&self, range: Option<&KeyRange>) -> usize {
        self.in_range(range)
            .iter()
            .map(|entry| entry.primary_keys.len())
            .sum()
    }

    /// Primary keys referenced within `range`, in index-key order with
    /// duplicates in primary-key order.
    pub fn primary_keys(&self, range: Option<&KeyRange>) -> Vec<Key> {
        self.in_range(range)
            .iter()
            .flat_map(|entry| entry.primary_keys.iter().cloned())
            .collect()
    }

    fn in_range(&self, range: Option<&KeyRange>) -> &[IndexRecord] {
        let entries = self.entries.as_slice();
        let Some(range) = range else {
            return entries;
        };
        let desc = resolve_range(entries, range);
        match (desc.first, desc.last) {
            (Some(first), Some(last)) => &entries[first..=last],
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyPath;
    use crate::value::Value;

    fn by_name() -> IndexEngine {
        IndexEngine::new(IndexConfig::new("by_name", KeyPath::single("name")))
    }

    fn person(id: i64, name: &str) -> Record {
        Record::new(
            Key::from(id),
            Value::object([("id", Value::from(id)), ("name", Value::from(name))]),
        )
    }

    #[test]
    fn add_groups_duplicates_by_primary_key() {
        let mut index = by_name();
        index.add(&person(2, "Ada")).unwrap();
        index.add(&person(1, "Ada")).unwrap();
        index.add(&person(3, "Bob")).unwrap();

        assert_eq!(index.entries().len(), 2);
        let entry = index.entry(&Key::from("Ada")).unwrap();
        assert_eq!(entry.primary_keys, vec![Key::from(1), Key::from(2)]);
    }

    #[test]
    fn entries_stay_sorted_by_index_key() {
        let mut index = by_name();
        for (id, name) in [(1, "Cleo"), (2, "Ada"), (3, "Bob")] {
            index.add(&person(id, name)).unwrap();
        }
        let keys: Vec<&Key> = index.entries().iter().map(|e| &e.key).collect();
        assert_eq!(
            keys,
            vec![&Key::from("Ada"), &Key::from("Bob"), &Key::from("Cleo")]
        );
    }

    #[test]
    fn unique_index_rejects_second_reference() {
        let mut index =
            IndexEngine::new(IndexConfig::new("by_name", KeyPath::single("name")).unique());
        index.add(&person(1, "Ada")).unwrap();

        let err = index.add(&person(2, "Ada")).unwrap_err();
        assert!(err.is_constraint());
        assert!(err.to_string().contains("by_name"));

        // The failed add left nothing behind.
        let entry = index.entry(&Key::from("Ada")).unwrap();
        assert_eq!(entry.primary_keys, vec![Key::from(1)]);
    }

    #[test]
    fn remove_strips_reference_and_drops_empty_entry() {
        let mut index = by_name();
        index.add(&person(1, "Ada")).unwrap();
        index.add(&person(2, "Ada")).unwrap();

        index.remove(&person(1, "Ada"));
        assert_eq!(
            index.entry(&Key::from("Ada")).unwrap().primary_keys,
            vec![Key::from(2)]
        );

        index.remove(&person(2, "Ada"));
        assert!(index.entry(&Key::from("Ada")).is_none());
        assert!(index.entries().is_empty());
    }

    #[test]
    fn unindexed_records_are_skipped() {
        let mut index = by_name();
        let no_name = Record::new(Key::from(9), Value::object([("id", Value::from(9))]));
        index.add(&no_name).unwrap();
        assert!(index.entries().is_empty());

        // Removing it is equally a no-op.
        index.remove(&no_name);
        assert!(index.entries().is_empty());
    }

    #[test]
    fn multi_entry_fans_out_distinct_elements() {
        let mut index = IndexEngine::new(
            IndexConfig::new("by_tag", KeyPath::single("tags")).multi_entry(),
        );
        let record = Record::new(
            Key::from(1),
            Value::object([("tags", Value::from(vec!["red", "blue", "red"]))]),
        );
        index.add(&record).unwrap();

        assert_eq!(index.entries().len(), 2);
        assert!(index.entry(&Key::from("red")).is_some());
        assert!(index.entry(&Key::from("blue")).is_some());

        index.remove(&record);
        assert!(index.entries().is_empty());
    }

    #[test]
    fn multi_entry_drops_elements_without_key_shape() {
        let mut index = IndexEngine::new(
            IndexConfig::new("by_tag", KeyPath::single("tags")).multi_entry(),
        );
        let record = Record::new(
            Key::from(1),
            Value::object([(
                "tags",
                Value::Array(vec![
                    Value::from("red"),
                    Value::Null,
                    Value::Bool(true),
                    Value::from("blue"),
                ]),
            )]),
        );
        index.add(&record).unwrap();

        assert_eq!(index.entries().len(), 2);
        assert!(index.entry(&Key::from("red")).is_some());
        assert!(index.entry(&Key::from("blue")).is_some());

        index.remove(&record);
        assert!(index.entries().is_empty());
    }

    #[test]
    fn multi_entry_non_array_key_is_single_entry() {
        let mut index = IndexEngine::new(
            IndexConfig::new("by_tag", KeyPath::single("tags")).multi_entry(),
        );
        let record = Record::new(
            Key::from(1),
            Value::object([("tags", Value::from("solo"))]),
        );
        index.add(&record).unwrap();
        assert_eq!(index.entries().len(), 1);
        assert!(index.entry(&Key::from("solo")).is_some());
    }

    #[test]
    fn unique_multi_entry_checks_every_element() {
        let mut index = IndexEngine::new(
            IndexConfig::new("by_tag", KeyPath::single("tags"))
                .unique()
                .multi_entry(),
        );
        let first = Record::new(
            Key::from(1),
            Value::object([("tags", Value::from(vec!["a", "b"]))]),
        );
        index.add(&first).unwrap();

        let second = Record::new(
            Key::from(2),
            Value::object([("tags", Value::from(vec!["c", "b"]))]),
        );
        let err = index.add(&second).unwrap_err();
        assert!(err.is_constraint());
        // Pre-flighting means "c" was never added.
        assert!(index.entry(&Key::from("c")).is_none());
    }

    #[test]
    fn bulk_load_defers_duplicate_sorting() {
        let mut index = by_name();
        index.begin_load();
        index.add(&person(3, "Ada")).unwrap();
        index.add(&person(1, "Ada")).unwrap();
        index.add(&person(2, "Ada")).unwrap();
        index.end_load();

        let entry = index.entry(&Key::from("Ada")).unwrap();
        assert_eq!(
            entry.primary_keys,
            vec![Key::from(1), Key::from(2), Key::from(3)]
        );
    }

    #[test]
    fn count_and_primary_keys_over_ranges() {
        let mut index = by_name();
        for (id, name) in [(1, "Ada"), (2, "Ada"), (3, "Bob"), (4, "Cleo")] {
            index.add(&person(id, name)).unwrap();
        }

        assert_eq!(index.count(None), 4);
        let range = KeyRange::bound("Ada", "Bob", false, false).unwrap();
        assert_eq!(index.count(Some(&range)), 3);
        assert_eq!(
            index.primary_keys(Some(&range)),
            vec![Key::from(1), Key::from(2), Key::from(3)]
        );
    }

    #[test]
    fn forked_index_shares_until_write() {
        let mut index = by_name();
        index.add(&person(1, "Ada")).unwrap();

        let mut fork = index.clone();
        fork.add(&person(2, "Bob")).unwrap();

        assert_eq!(index.entries().len(), 1);
        assert_eq!(fork.entries().len(), 2);
    }
}
