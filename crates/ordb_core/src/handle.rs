//! Store and index access handles.
//!
//! A [`StoreHandle`] is how callers touch a store. The same type serves
//! two bindings: handles from [`Database::store`](crate::Database::store)
//! work on the live store and emit change events as they go, while
//! handles from [`TxHandle::store`](crate::TxHandle::store) work on the
//! transaction's fork and journal their mutations for commit. A handle
//! bound to a finished transaction refuses everything.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::{StoreConfig, WriteOptions};
use crate::cursor::{Cursor, CursorSource, Direction};
use crate::error::{StoreError, StoreResult};
use crate::key::{Key, KeyRange};
use crate::stats::DatabaseStats;
use crate::store::{MutationReport, RecordStore};
use crate::transaction::MutationSink;
use crate::value::Value;

/// Access to one store.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    name: String,
    cell: Arc<RwLock<RecordStore>>,
    sink: MutationSink,
    tx_active: Option<Arc<AtomicBool>>,
    read_only: bool,
    stats: Arc<DatabaseStats>,
}

impl StoreHandle {
    pub(crate) fn new(
        name: String,
        cell: Arc<RwLock<RecordStore>>,
        sink: MutationSink,
        tx_active: Option<Arc<AtomicBool>>,
        read_only: bool,
        stats: Arc<DatabaseStats>,
    ) -> Self {
        Self {
            name,
            cell,
            sink,
            tx_active,
            read_only,
            stats,
        }
    }

    /// The store's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A copy of the store's configuration.
    pub fn config(&self) -> StoreResult<StoreConfig> {
        let store = self.cell.read();
        self.ensure_usable(&store)?;
        Ok(store.config().clone())
    }

    /// Number of records in the store.
    pub fn len(&self) -> StoreResult<usize> {
        let store = self.cell.read();
        self.ensure_usable(&store)?;
        Ok(store.len())
    }

    /// Returns `true` when the store holds no records.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// The store's mutation counter.
    ///
    /// Increments once per record written or deleted and once per clear,
    /// so equality between two readings means nothing changed between
    /// them.
    pub fn revision(&self) -> StoreResult<u64> {
        let store = self.cell.read();
        self.ensure_usable(&store)?;
        Ok(store.revision())
    }

    /// Writes a record, inserting or overwriting by resolved key.
    ///
    /// Returns the key the record landed under.
    pub fn put(&self, value: Value) -> StoreResult<Key> {
        self.write_one(value, WriteOptions::put())
    }

    /// Writes a record, failing if its key already exists.
    pub fn add(&self, value: Value) -> StoreResult<Key> {
        self.write_one(value, WriteOptions::add())
    }

    /// Writes a record with explicit options.
    pub fn put_with(&self, value: Value, options: WriteOptions) -> StoreResult<Key> {
        self.write_one(value, options)
    }

    /// Writes a batch of records, all or nothing.
    ///
    /// Index maintenance runs in bulk mode for the batch. Returns the
    /// resolved keys in input order.
    pub fn put_all(&self, values: Vec<Value>) -> StoreResult<Vec<Key>> {
        self.ensure_writable()?;
        let reports = {
            let mut store = self.cell.write();
            self.ensure_usable(&store)?;
            store.store_all(values, &WriteOptions::put())?
        };
        let keys = reports
            .iter()
            .filter_map(|report| report.key().cloned())
            .collect();
        self.stats.record_writes(reports.len() as u64);
        self.sink.record_all(&self.name, &reports);
        Ok(keys)
    }

    /// The value stored under `key`.
    pub fn get(&self, key: impl Into<Key>) -> StoreResult<Option<Value>> {
        let key = key.into().validated()?;
        let store = self.cell.read();
        self.ensure_usable(&store)?;
        self.stats.record_read();
        Ok(store.get(&key).map(|record| record.value.clone()))
    }

    /// The first in-range value in storage order.
    pub fn get_first(&self, range: &KeyRange) -> StoreResult<Option<Value>> {
        let store = self.cell.read();
        self.ensure_usable(&store)?;
        self.stats.record_read();
        Ok(store
            .get_range(Some(range), Some(1))
            .first()
            .map(|record| record.value.clone()))
    }

    /// In-range values in storage order, up to `limit`.
    pub fn get_all(
        &self,
        range: Option<&KeyRange>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Value>> {
        let store = self.cell.read();
        self.ensure_usable(&store)?;
        self.stats.record_scan();
        Ok(store
            .get_range(range, limit)
            .into_iter()
            .map(|record| record.value.clone())
            .collect())
    }

    /// In-range keys in storage order, up to `limit`.
    pub fn get_all_keys(
        &self,
        range: Option<&KeyRange>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Key>> {
        let store = self.cell.read();
        self.ensure_usable(&store)?;
        self.stats.record_scan();
        Ok(store
            .get_range(range, limit)
            .into_iter()
            .map(|record| record.key.clone())
            .collect())
    }

    /// Number of in-range records.
    pub fn count(&self, range: Option<&KeyRange>) -> StoreResult<usize> {
        let store = self.cell.read();
        self.ensure_usable(&store)?;
        self.stats.record_scan();
        Ok(store.count(range))
    }

    /// Deletes the record under `key`, reporting whether one existed.
    pub fn remove(&self, key: impl Into<Key>) -> StoreResult<bool> {
        let range = KeyRange::only(key)?;
        Ok(self.remove_range(&range)? > 0)
    }

    /// Deletes every in-range record, returning how many went.
    pub fn remove_range(&self, range: &KeyRange) -> StoreResult<usize> {
        self.ensure_writable()?;
        let reports = {
            let mut store = self.cell.write();
            self.ensure_usable(&store)?;
            store.delete_record(range)
        };
        self.stats.record_deletes(reports.len() as u64);
        self.sink.record_all(&self.name, &reports);
        Ok(reports.len())
    }

    /// Empties the store, returning how many records it held.
    ///
    /// Clearing invalidates every open cursor on the store.
    pub fn clear(&self) -> StoreResult<usize> {
        self.ensure_writable()?;
        let report = {
            let mut store = self.cell.write();
            self.ensure_usable(&store)?;
            store.clear_all()
        };
        let count = match &report {
            MutationReport::Clear { cleared } => cleared.len(),
            _ => 0,
        };
        self.stats.record_deletes(count as u64);
        self.sink.record(&self.name, &report);
        Ok(count)
    }

    /// Opens a cursor over the store's records.
    pub fn open_cursor(
        &self,
        range: Option<KeyRange>,
        direction: Direction,
    ) -> StoreResult<Cursor> {
        self.stats.record_cursor_open();
        Cursor::open(
            CursorSource::Store(self.cell.clone()),
            range,
            direction,
            false,
            self.read_only,
            self.sink.clone(),
            self.tx_active.clone(),
        )
    }

    /// Opens a cursor that yields keys but no values.
    ///
    /// Key-only cursors cannot update or delete.
    pub fn open_key_cursor(
        &self,
        range: Option<KeyRange>,
        direction: Direction,
    ) -> StoreResult<Cursor> {
        self.stats.record_cursor_open();
        Cursor::open(
            CursorSource::Store(self.cell.clone()),
            range,
            direction,
            true,
            self.read_only,
            self.sink.clone(),
            self.tx_active.clone(),
        )
    }

    /// A handle on one of the store's indexes.
    pub fn index(&self, name: &str) -> StoreResult<IndexHandle> {
        {
            let store = self.cell.read();
            self.ensure_usable(&store)?;
            store.index(name)?;
        }
        Ok(IndexHandle {
            store_name: self.name.clone(),
            index_name: name.to_string(),
            cell: self.cell.clone(),
            sink: self.sink.clone(),
            tx_active: self.tx_active.clone(),
            read_only: self.read_only,
            stats: self.stats.clone(),
        })
    }

    /// Names of the store's indexes, in configuration order.
    pub fn index_names(&self) -> StoreResult<Vec<String>> {
        let store = self.cell.read();
        self.ensure_usable(&store)?;
        Ok(store
            .indexes()
            .iter()
            .map(|index| index.name().to_string())
            .collect())
    }

    fn write_one(&self, value: Value, options: WriteOptions) -> StoreResult<Key> {
        self.ensure_writable()?;
        let report = {
            let mut store = self.cell.write();
            self.ensure_usable(&store)?;
            store.store_record(value, options)?
        };
        let key = report
            .key()
            .cloned()
            .ok_or_else(|| StoreError::invalid_state("write produced no key"))?;
        self.stats.record_write();
        self.sink.record(&self.name, &report);
        Ok(key)
    }

    fn ensure_writable(&self) -> StoreResult<()> {
        if self.read_only {
            return Err(StoreError::read_only(format!(
                "store {:?} is bound to a read-only transaction",
                self.name
            )));
        }
        Ok(())
    }

    fn ensure_usable(&self, store: &RecordStore) -> StoreResult<()> {
        if let Some(flag) = &self.tx_active {
            if !flag.load(Ordering::Acquire) {
                return Err(StoreError::transaction_inactive(
                    "store handle outlived its transaction",
                ));
            }
        }
        store.ensure_live()
    }
}

/// Access to one index of a store.
///
/// Reads resolve through the index to the owning store's records, so a
/// lookup yields record values, not index internals.
#[derive(Debug, Clone)]
pub struct IndexHandle {
    store_name: String,
    index_name: String,
    cell: Arc<RwLock<RecordStore>>,
    sink: MutationSink,
    tx_active: Option<Arc<AtomicBool>>,
    read_only: bool,
    stats: Arc<DatabaseStats>,
}

impl IndexHandle {
    /// The index's name.
    pub fn name(&self) -> &str {
        &self.index_name
    }

    /// The owning store's name.
    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    /// The value of the first record indexed under `key`.
    ///
    /// "First" means the lowest primary key among the duplicates.
    pub fn get(&self, key: impl Into<Key>) -> StoreResult<Option<Value>> {
        let key = key.into().validated()?;
        let store = self.cell.read();
        self.ensure_usable(&store)?;
        self.stats.record_index_lookup();
        let engine = store.index(&self.index_name)?;
        Ok(engine
            .entry(&key)
            .and_then(|entry| entry.primary_keys.first())
            .and_then(|pk| store.get(pk))
            .map(|record| record.value.clone()))
    }

    /// The primary key of the first record indexed under `key`.
    pub fn get_key(&self, key: impl Into<Key>) -> StoreResult<Option<Key>> {
        let key = key.into().validated()?;
        let store = self.cell.read();
        self.ensure_usable(&store)?;
        self.stats.record_index_lookup();
        let engine = store.index(&self.index_name)?;
        Ok(engine
            .entry(&key)
            .and_then(|entry| entry.primary_keys.first())
            .cloned())
    }

    /// In-range record values in index order, up to `limit`.
    ///
    /// Duplicate index keys yield one value per matching record.
    pub fn get_all(
        &self,
        range: Option<&KeyRange>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Value>> {
        let store = self.cell.read();
        self.ensure_usable(&store)?;
        self.stats.record_scan();
        let engine = store.index(&self.index_name)?;
        Ok(engine
            .primary_keys(range)
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .filter_map(|pk| store.get(&pk).map(|record| record.value.clone()))
            .collect())
    }

    /// In-range primary keys in index order, up to `limit`.
    pub fn get_all_keys(
        &self,
        range: Option<&KeyRange>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Key>> {
        let store = self.cell.read();
        self.ensure_usable(&store)?;
        self.stats.record_scan();
        let engine = store.index(&self.index_name)?;
        Ok(engine
            .primary_keys(range)
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    /// Number of in-range index records, duplicates included.
    pub fn count(&self, range: Option<&KeyRange>) -> StoreResult<usize> {
        let store = self.cell.read();
        self.ensure_usable(&store)?;
        self.stats.record_index_lookup();
        let engine = store.index(&self.index_name)?;
        Ok(engine.count(range))
    }

    /// Opens a cursor over the index in index key order.
    pub fn open_cursor(
        &self,
        range: Option<KeyRange>,
        direction: Direction,
    ) -> StoreResult<Cursor> {
        self.stats.record_cursor_open();
        Cursor::open(
            CursorSource::Index {
                store: self.cell.clone(),
                index: self.index_name.clone(),
            },
            range,
            direction,
            false,
            self.read_only,
            self.sink.clone(),
            self.tx_active.clone(),
        )
    }

    /// Opens an index cursor that yields keys but no values.
    pub fn open_key_cursor(
        &self,
        range: Option<KeyRange>,
        direction: Direction,
    ) -> StoreResult<Cursor> {
        self.stats.record_cursor_open();
        Cursor::open(
            CursorSource::Index {
                store: self.cell.clone(),
                index: self.index_name.clone(),
            },
            range,
            direction,
            true,
            self.read_only,
            self.sink.clone(),
            self.tx_active.clone(),
        )
    }

    fn ensure_usable(&self, store: &RecordStore) -> StoreResult<()> {
        if let Some(flag) = &self.tx_active {
            if !flag.load(Ordering::Acquire) {
                return Err(StoreError::transaction_inactive(
                    "index handle outlived its transaction",
                ));
            }
        }
        store.ensure_live()
    }
}
