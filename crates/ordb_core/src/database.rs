//! Database facade: named stores, transactions, and the change feed.

use std::collections::{BTreeSet, HashMap};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::handle::StoreHandle;
use crate::notify::{ChangeEvent, ChangeFeed};
use crate::stats::{DatabaseStats, StatsSnapshot};
use crate::store::RecordStore;
use crate::transaction::{CommitHook, MutationSink, TxHandle, TxManager, TxMode};

/// The main database handle.
///
/// `Database` is the entry point for everything: it registers named
/// stores, hands out [`StoreHandle`]s for direct access, and runs
/// scope-scheduled transactions over any subset of its stores.
///
/// # Direct access
///
/// ```rust,ignore
/// use ordb_core::{Database, KeyPath, StoreConfig, Value};
///
/// let db = Database::new();
/// let users = db.create_store(
///     StoreConfig::new("users").key_path(KeyPath::single("id")),
/// )?;
///
/// users.put(Value::object([("id", Value::from(1)), ("name", Value::from("ada"))]))?;
/// assert_eq!(users.len()?, 1);
/// ```
///
/// # Transactions
///
/// ```rust,ignore
/// use ordb_core::TxMode;
///
/// db.transaction(&["users", "orders"], TxMode::ReadWrite, |tx| {
///     let users = tx.store("users")?;
///     let orders = tx.store("orders")?;
///     let id = users.put(new_user)?;
///     orders.put(order_for(&id))?;
///     Ok(())
/// })?;
/// ```
///
/// Writes inside the body land on copy-on-write forks and become visible
/// to other callers only when the body returns `Ok` without rolling back.
pub struct Database {
    /// Named store cells. The cell, not the store, is shared with
    /// handles and transaction forks.
    stores: RwLock<HashMap<String, Arc<RwLock<RecordStore>>>>,
    /// Transaction scheduler and commit pipeline.
    manager: TxManager,
    /// Committed-mutation feed shared by every handle.
    feed: Arc<ChangeFeed>,
    /// Operation counters.
    stats: Arc<DatabaseStats>,
}

impl Database {
    /// Creates an empty database with no stores.
    #[must_use]
    pub fn new() -> Self {
        let feed = Arc::new(ChangeFeed::new());
        let stats = Arc::new(DatabaseStats::new());
        Self {
            stores: RwLock::new(HashMap::new()),
            manager: TxManager::new(feed.clone(), stats.clone()),
            feed,
            stats,
        }
    }

    /// Creates a store from `config` and returns a handle to it.
    ///
    /// # Errors
    ///
    /// `Constraint` if a store with the same name already exists, or
    /// `Data` if the configuration fails validation.
    pub fn create_store(&self, config: StoreConfig) -> StoreResult<StoreHandle> {
        let name = config.name.clone();
        let mut stores = self.stores.write();
        if stores.contains_key(&name) {
            return Err(StoreError::constraint("database", &name));
        }
        let store = RecordStore::new(config)?;
        let cell = Arc::new(RwLock::new(store));
        stores.insert(name.clone(), cell.clone());
        drop(stores);

        self.stats.record_store_created();
        debug!(target: "ordb::db", store = %name, "store created");
        Ok(self.handle_for(name, cell))
    }

    /// Returns a handle to the named store.
    pub fn store(&self, name: &str) -> StoreResult<StoreHandle> {
        let cell = self
            .stores
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::store_not_found(name))?;
        Ok(self.handle_for(name.to_string(), cell))
    }

    /// Removes the named store and invalidates every outstanding handle
    /// and cursor bound to it.
    pub fn drop_store(&self, name: &str) -> StoreResult<()> {
        let cell = self
            .stores
            .write()
            .remove(name)
            .ok_or_else(|| StoreError::store_not_found(name))?;
        cell.write().destroy();
        self.stats.record_store_dropped();
        debug!(target: "ordb::db", store = %name, "store dropped");
        Ok(())
    }

    /// Returns the store names in sorted order.
    #[must_use]
    pub fn store_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns whether a store with `name` exists.
    #[must_use]
    pub fn contains_store(&self, name: &str) -> bool {
        self.stores.read().contains_key(name)
    }

    /// Runs `body` as a transaction over the named stores.
    ///
    /// The body receives a [`TxHandle`] and reads and writes forks of
    /// the scoped stores. Returning `Ok` commits; returning `Err` (or
    /// calling [`TxHandle::rollback`]) discards every change. Blocks
    /// while a conflicting transaction holds part of the scope.
    ///
    /// # Errors
    ///
    /// `NotFound` if a named store does not exist, `Data` if the scope
    /// is empty, or whatever the body and commit pipeline return.
    pub fn transaction<T>(
        &self,
        stores: &[&str],
        mode: TxMode,
        body: impl FnOnce(&mut TxHandle) -> StoreResult<T>,
    ) -> StoreResult<T> {
        self.transaction_with_timeout(stores, mode, None, body)
    }

    /// Like [`Database::transaction`], but gives up with `Timeout` if
    /// the scope cannot be acquired within `timeout`.
    pub fn transaction_with_timeout<T>(
        &self,
        stores: &[&str],
        mode: TxMode,
        timeout: Option<Duration>,
        body: impl FnOnce(&mut TxHandle) -> StoreResult<T>,
    ) -> StoreResult<T> {
        if stores.is_empty() {
            return Err(StoreError::data("a transaction needs at least one store"));
        }
        let scope: BTreeSet<&str> = stores.iter().copied().collect();
        let mut resolved = Vec::with_capacity(scope.len());
        {
            let map = self.stores.read();
            for name in scope {
                let cell = map
                    .get(name)
                    .cloned()
                    .ok_or_else(|| StoreError::store_not_found(name))?;
                resolved.push((name.to_string(), cell));
            }
        }
        self.manager.run(resolved, mode, timeout, body)
    }

    /// Registers a commit hook for the named store.
    ///
    /// The hook sees every journal entry touching the store before a
    /// transaction publishes; a hook error aborts the commit after the
    /// already-applied entries have been reversed.
    pub fn set_commit_hook(&self, store: &str, hook: Arc<dyn CommitHook>) {
        self.manager.set_hook(store, hook);
    }

    /// Removes the commit hook for the named store, if any.
    pub fn remove_commit_hook(&self, store: &str) {
        self.manager.remove_hook(store);
    }

    /// Subscribes to committed mutations across every store.
    ///
    /// Direct writes emit immediately; transactional writes replay in
    /// operation order once their transaction commits.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        self.feed.subscribe()
    }

    /// Returns buffered change events with sequence greater than
    /// `cursor`, at most `limit` of them.
    #[must_use]
    pub fn poll_changes(&self, cursor: u64, limit: usize) -> Vec<ChangeEvent> {
        self.feed.poll(cursor, limit)
    }

    /// Returns the sequence number of the most recent change event.
    #[must_use]
    pub fn latest_sequence(&self) -> u64 {
        self.feed.latest_sequence()
    }

    /// Returns a point-in-time copy of the operation counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn handle_for(&self, name: String, cell: Arc<RwLock<RecordStore>>) -> StoreHandle {
        StoreHandle::new(
            name,
            cell,
            MutationSink::Feed(self.feed.clone()),
            None,
            false,
            self.stats.clone(),
        )
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("stores", &self.store_names())
            .finish_non_exhaustive()
    }
}
