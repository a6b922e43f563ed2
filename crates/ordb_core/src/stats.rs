//! Database statistics and telemetry.
//!
//! Provides metrics counters for monitoring database activity.
//!
//! # Usage
//!
//! ```rust,ignore
//! use ordb_core::Database;
//!
//! let db = Database::new();
//!
//! // Perform operations...
//! db.store("users")?.put(user)?;
//!
//! // Get stats
//! let stats = db.stats();
//! println!("Reads: {}", stats.reads);
//! println!("Writes: {}", stats.writes);
//! println!("Transactions: {}", stats.transactions_committed);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Database statistics and metrics.
///
/// All counters are atomic and can be read while operations are in progress.
/// Values are monotonically increasing.
#[derive(Debug, Default)]
pub struct DatabaseStats {
    // Operation counters
    /// Total number of point read operations.
    reads: AtomicU64,
    /// Total number of write operations.
    writes: AtomicU64,
    /// Total number of delete operations (records removed).
    deletes: AtomicU64,
    /// Total number of range scans.
    scans: AtomicU64,
    /// Total number of index lookups.
    index_lookups: AtomicU64,
    /// Total number of cursors opened.
    cursors_opened: AtomicU64,

    // Transaction counters
    /// Total number of transactions started.
    transactions_started: AtomicU64,
    /// Total number of transactions committed.
    transactions_committed: AtomicU64,
    /// Total number of transactions aborted or rolled back.
    transactions_aborted: AtomicU64,
    /// Total number of transactions that timed out waiting for their scope.
    transactions_timed_out: AtomicU64,

    // Catalog counters
    /// Total number of stores created.
    stores_created: AtomicU64,
    /// Total number of stores dropped.
    stores_dropped: AtomicU64,
}

impl DatabaseStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    // === Increment methods (internal use) ===

    /// Records a point read.
    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a write operation.
    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Records `count` writes from one batch.
    pub(crate) fn record_writes(&self, count: u64) {
        self.writes.fetch_add(count, Ordering::Relaxed);
    }

    /// Records `count` deleted records.
    pub(crate) fn record_deletes(&self, count: u64) {
        self.deletes.fetch_add(count, Ordering::Relaxed);
    }

    /// Records a range scan.
    pub(crate) fn record_scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an index lookup.
    pub(crate) fn record_index_lookup(&self) {
        self.index_lookups.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an opened cursor.
    pub(crate) fn record_cursor_open(&self) {
        self.cursors_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a transaction start.
    pub(crate) fn record_transaction_start(&self) {
        self.transactions_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a transaction commit.
    pub(crate) fn record_transaction_commit(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a transaction abort.
    pub(crate) fn record_transaction_abort(&self) {
        self.transactions_aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a transaction scheduling timeout.
    pub(crate) fn record_transaction_timeout(&self) {
        self.transactions_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a store creation.
    pub(crate) fn record_store_created(&self) {
        self.stores_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a store drop.
    pub(crate) fn record_store_dropped(&self) {
        self.stores_dropped.fetch_add(1, Ordering::Relaxed);
    }

    // === Getter methods (public API) ===

    /// Returns the total number of point reads.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Returns the total number of write operations.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Returns the total number of deleted records.
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Returns the total number of range scans.
    pub fn scans(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    /// Returns the total number of index lookups.
    pub fn index_lookups(&self) -> u64 {
        self.index_lookups.load(Ordering::Relaxed)
    }

    /// Returns the total number of cursors opened.
    pub fn cursors_opened(&self) -> u64 {
        self.cursors_opened.load(Ordering::Relaxed)
    }

    /// Returns the total number of transactions started.
    pub fn transactions_started(&self) -> u64 {
        self.transactions_started.load(Ordering::Relaxed)
    }

    /// Returns the total number of transactions committed.
    pub fn transactions_committed(&self) -> u64 {
        self.transactions_committed.load(Ordering::Relaxed)
    }

    /// Returns the total number of transactions aborted.
    pub fn transactions_aborted(&self) -> u64 {
        self.transactions_aborted.load(Ordering::Relaxed)
    }

    /// Returns the total number of transaction scheduling timeouts.
    pub fn transactions_timed_out(&self) -> u64 {
        self.transactions_timed_out.load(Ordering::Relaxed)
    }

    /// Returns the total number of stores created.
    pub fn stores_created(&self) -> u64 {
        self.stores_created.load(Ordering::Relaxed)
    }

    /// Returns the total number of stores dropped.
    pub fn stores_dropped(&self) -> u64 {
        self.stores_dropped.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reads: self.reads(),
            writes: self.writes(),
            deletes: self.deletes(),
            scans: self.scans(),
            index_lookups: self.index_lookups(),
            cursors_opened: self.cursors_opened(),
            transactions_started: self.transactions_started(),
            transactions_committed: self.transactions_committed(),
            transactions_aborted: self.transactions_aborted(),
            transactions_timed_out: self.transactions_timed_out(),
            stores_created: self.stores_created(),
            stores_dropped: self.stores_dropped(),
        }
    }
}

/// A point-in-time snapshot of database statistics.
///
/// Unlike `DatabaseStats`, this is a simple struct that can be serialized,
/// compared, or passed across threads without atomics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Total number of point reads.
    pub reads: u64,
    /// Total number of write operations.
    pub writes: u64,
    /// Total number of deleted records.
    pub deletes: u64,
    /// Total number of range scans.
    pub scans: u64,
    /// Total number of index lookups.
    pub index_lookups: u64,
    /// Total number of cursors opened.
    pub cursors_opened: u64,
    /// Total number of transactions started.
    pub transactions_started: u64,
    /// Total number of transactions committed.
    pub transactions_committed: u64,
    /// Total number of transactions aborted.
    pub transactions_aborted: u64,
    /// Total number of transaction scheduling timeouts.
    pub transactions_timed_out: u64,
    /// Total number of stores created.
    pub stores_created: u64,
    /// Total number of stores dropped.
    pub stores_dropped: u64,
}
