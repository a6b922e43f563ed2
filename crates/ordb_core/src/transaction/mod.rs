//! Transactions over scoped store sets.
//!
//! A transaction names the stores it will touch and whether it writes.
//! The scheduler holds it back while any conflicting transaction runs;
//! once admitted it works against copy-on-write forks of its stores and
//! journals every mutation. Commit publishes the forks per store and
//! replays the journal to the change feed in operation order. An error
//! from the body, or an explicit rollback, discards everything.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::handle::StoreHandle;
use crate::stats::DatabaseStats;

mod clone;
mod manager;
mod scheduler;

pub(crate) mod journal;

pub use journal::{Journal, JournalEntry};

pub(crate) use clone::StoreClone;
pub(crate) use journal::MutationSink;
pub(crate) use manager::TxManager;
pub(crate) use scheduler::TxScheduler;

/// Identifies one transaction, for scheduling and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxId(u64);

impl TxId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// Concurrency class of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// May only read; runs concurrently with other readers.
    ReadOnly,
    /// May read and write; runs alone within its scope.
    ReadWrite,
}

/// Lifecycle stage of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// Queued behind a conflicting scope.
    Pending,
    /// Admitted; the body is running.
    Active,
    /// Committed, aborted, or rolled back.
    Done,
}

/// Participates in commit for one store.
///
/// Hooks run after the transaction body succeeds and before any fork is
/// published, one call per journal entry in operation order. When a hook
/// refuses an entry the already-applied entries are reversed newest
/// first and the transaction aborts.
pub trait CommitHook: Send + Sync {
    /// Applies one journaled mutation to the hook's resource.
    fn apply(&self, entry: &JournalEntry) -> StoreResult<()>;

    /// Undoes a previously applied mutation after a later one failed.
    fn reverse(&self, entry: &JournalEntry) -> StoreResult<()>;
}

pub(crate) type DeferredOp = Box<dyn FnOnce() -> StoreResult<()> + Send>;

/// Live access to one running transaction.
///
/// The handle is passed to the transaction body. Store access goes
/// through [`TxHandle::store`], which hands out handles bound to the
/// transaction's forks; anything obtained that way stops working the
/// moment the transaction finishes.
pub struct TxHandle {
    id: TxId,
    mode: TxMode,
    clones: Vec<StoreClone>,
    journal: Arc<Mutex<Journal>>,
    active: Arc<AtomicBool>,
    stats: Arc<DatabaseStats>,
    rollback_requested: bool,
    deferred: Vec<DeferredOp>,
}

impl TxHandle {
    pub(crate) fn new(
        id: TxId,
        mode: TxMode,
        clones: Vec<StoreClone>,
        journal: Arc<Mutex<Journal>>,
        active: Arc<AtomicBool>,
        stats: Arc<DatabaseStats>,
    ) -> Self {
        Self {
            id,
            mode,
            clones,
            journal,
            active,
            stats,
            rollback_requested: false,
            deferred: Vec::new(),
        }
    }

    /// The transaction's id.
    pub fn id(&self) -> TxId {
        self.id
    }

    /// The transaction's concurrency mode.
    pub fn mode(&self) -> TxMode {
        self.mode
    }

    /// The transaction's lifecycle stage.
    pub fn state(&self) -> TxState {
        if self.active.load(Ordering::Acquire) {
            TxState::Active
        } else {
            TxState::Done
        }
    }

    /// A handle on one in-scope store, bound to this transaction.
    ///
    /// Reads see the transaction's own writes. Asking for a store the
    /// transaction did not declare is an error.
    pub fn store(&self, name: &str) -> StoreResult<StoreHandle> {
        let clone = self
            .clones
            .iter()
            .find(|clone| clone.name() == name)
            .ok_or_else(|| {
                StoreError::invalid_state(format!(
                    "store {name:?} is not in the transaction's scope"
                ))
            })?;
        Ok(StoreHandle::new(
            clone.name().to_string(),
            clone.cell().clone(),
            MutationSink::Journal(self.journal.clone()),
            Some(self.active.clone()),
            self.mode == TxMode::ReadOnly,
            self.stats.clone(),
        ))
    }

    /// Discards the transaction without treating it as a failure.
    ///
    /// The body still runs to completion and its return value is handed
    /// back to the caller, but nothing is published and no events fire.
    pub fn rollback(&mut self) {
        self.rollback_requested = true;
    }

    /// Returns `true` once [`TxHandle::rollback`] was called.
    pub fn is_rolled_back(&self) -> bool {
        self.rollback_requested
    }

    /// Queues an operation to run at commit, before anything publishes.
    ///
    /// Deferred operations run in queue order once the body succeeds. An
    /// error from one aborts the transaction with that error.
    pub fn defer(&mut self, op: impl FnOnce() -> StoreResult<()> + Send + 'static) {
        self.deferred.push(Box::new(op));
    }

    /// Number of journaled mutations so far.
    pub fn journal_len(&self) -> usize {
        self.journal.lock().len()
    }

    pub(crate) fn into_parts(self) -> (Vec<StoreClone>, Vec<DeferredOp>, bool) {
        (self.clones, self.deferred, self.rollback_requested)
    }
}

impl fmt::Debug for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxHandle")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("state", &self.state())
            .field("stores", &self.clones.len())
            .field("rollback_requested", &self.rollback_requested)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_handle() -> TxHandle {
        TxHandle::new(
            TxId::new(7),
            TxMode::ReadWrite,
            Vec::new(),
            Arc::new(Mutex::new(Journal::new())),
            Arc::new(AtomicBool::new(true)),
            Arc::new(DatabaseStats::new()),
        )
    }

    #[test]
    fn tx_id_displays_with_prefix() {
        assert_eq!(TxId::new(42).to_string(), "txn-42");
    }

    #[test]
    fn state_follows_the_active_flag() {
        let handle = bare_handle();
        assert_eq!(handle.state(), TxState::Active);
        handle.active.store(false, Ordering::Release);
        assert_eq!(handle.state(), TxState::Done);
    }

    #[test]
    fn out_of_scope_store_is_refused() {
        let handle = bare_handle();
        let err = handle.store("nowhere").unwrap_err();
        assert!(matches!(err, StoreError::InvalidState { .. }));
    }

    #[test]
    fn rollback_is_sticky() {
        let mut handle = bare_handle();
        assert!(!handle.is_rolled_back());
        handle.rollback();
        handle.rollback();
        assert!(handle.is_rolled_back());
    }
}
