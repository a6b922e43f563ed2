//! Copy-on-write store clones for transactions.
//!
//! A transaction never mutates a live store. At admission each in-scope
//! store is forked; the fork shares the parent's record array until the
//! first write copies it. Commit publishes the fork back into the parent
//! in one move, so readers outside the transaction flip from the old
//! state to the new state atomically per store.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::store::RecordStore;

/// One in-scope store, forked for the lifetime of a transaction.
#[derive(Debug)]
pub(crate) struct StoreClone {
    name: String,
    parent: Arc<RwLock<RecordStore>>,
    fork: Arc<RwLock<RecordStore>>,
}

impl StoreClone {
    /// Forks `parent` for transactional use.
    pub(crate) fn open(name: &str, parent: &Arc<RwLock<RecordStore>>) -> Self {
        let fork = parent.read().fork();
        Self {
            name: name.to_string(),
            parent: parent.clone(),
            fork: Arc::new(RwLock::new(fork)),
        }
    }

    /// The store's name.
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// The forked store all transactional access goes through.
    pub(crate) fn cell(&self) -> &Arc<RwLock<RecordStore>> {
        &self.fork
    }

    /// Publishes the fork's state into the parent store.
    pub(crate) fn merge(self) {
        let fork = match Arc::try_unwrap(self.fork) {
            Ok(lock) => lock.into_inner(),
            // A cursor or handle still holds the fork; publish a copy.
            Err(shared) => shared.read().fork(),
        };
        self.parent.write().absorb(fork);
    }
}
