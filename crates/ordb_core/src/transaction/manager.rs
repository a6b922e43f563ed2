//! Transaction execution and commit.
//!
//! The manager drives one transaction end to end: admission through the
//! scheduler, forking the in-scope stores, running the body, then the
//! commit protocol. Commit order is fixed: deferred operations first,
//! commit hooks per journal entry next, fork publication per store after
//! that, and change events last, once the scopes are already released.
//! A failure anywhere before publication aborts the whole transaction.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use crate::error::{StoreError, StoreResult};
use crate::notify::{ChangeEvent, ChangeFeed};
use crate::stats::DatabaseStats;
use crate::store::RecordStore;
use crate::transaction::journal::{Journal, JournalEntry};
use crate::transaction::{CommitHook, StoreClone, TxHandle, TxId, TxMode, TxScheduler};

/// Runs transactions against a set of named stores.
pub(crate) struct TxManager {
    scheduler: TxScheduler,
    next_id: AtomicU64,
    feed: Arc<ChangeFeed>,
    stats: Arc<DatabaseStats>,
    hooks: RwLock<HashMap<String, Arc<dyn CommitHook>>>,
}

impl TxManager {
    pub(crate) fn new(feed: Arc<ChangeFeed>, stats: Arc<DatabaseStats>) -> Self {
        Self {
            scheduler: TxScheduler::new(),
            next_id: AtomicU64::new(1),
            feed,
            stats,
            hooks: RwLock::new(HashMap::new()),
        }
    }

    /// Registers `hook` for every future commit touching `store`.
    pub(crate) fn set_hook(&self, store: &str, hook: Arc<dyn CommitHook>) {
        self.hooks.write().insert(store.to_string(), hook);
    }

    /// Removes the commit hook for `store`, if any.
    pub(crate) fn remove_hook(&self, store: &str) {
        self.hooks.write().remove(store);
    }

    /// Runs `body` as one transaction over `stores`.
    ///
    /// Blocks until the scope is admitted (or `timeout` elapses). The
    /// body's error aborts; its success commits unless the handle was
    /// rolled back, in which case the value comes back with nothing
    /// applied.
    pub(crate) fn run<T>(
        &self,
        stores: Vec<(String, Arc<RwLock<RecordStore>>)>,
        mode: TxMode,
        timeout: Option<Duration>,
        body: impl FnOnce(&mut TxHandle) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let id = TxId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let scope: BTreeSet<String> = stores.iter().map(|(name, _)| name.clone()).collect();

        if let Err(err) = self.scheduler.begin(id, mode, scope, timeout) {
            if matches!(err, StoreError::Timeout { .. }) {
                self.stats.record_transaction_timeout();
            }
            return Err(err);
        }
        self.stats.record_transaction_start();
        debug!(target: "ordb::txn", id = %id, mode = ?mode, stores = stores.len(), "transaction started");

        let journal = Arc::new(Mutex::new(Journal::new()));
        let active = Arc::new(AtomicBool::new(true));
        let clones: Vec<StoreClone> = stores
            .iter()
            .map(|(name, cell)| StoreClone::open(name, cell))
            .collect();
        let mut handle = TxHandle::new(
            id,
            mode,
            clones,
            journal.clone(),
            active.clone(),
            self.stats.clone(),
        );

        let result = body(&mut handle);

        active.store(false, Ordering::Release);
        let (clones, deferred, rolled_back) = handle.into_parts();

        let value = match result {
            Ok(value) => value,
            Err(err) => {
                self.abort(id, "body failed");
                return Err(err);
            }
        };

        if rolled_back {
            self.abort(id, "rolled back");
            return Ok(value);
        }

        for op in deferred {
            if let Err(err) = op() {
                self.abort(id, "deferred operation failed");
                return Err(err);
            }
        }

        let mut log = journal.lock();

        if let Err(err) = self.apply_hooks(id, log.entries()) {
            self.abort(id, "commit hook refused an entry");
            return Err(err);
        }

        // Publish each fork that carries net changes. Stores whose every
        // journaled mutation cancelled out keep their original state.
        for clone in clones {
            let net = log.net_updates(clone.name());
            if net > 0 {
                trace!(target: "ordb::txn", id = %id, store = clone.name(), net, "publishing store fork");
                clone.merge();
            }
        }

        let entries = log.take();
        drop(log);

        self.scheduler.finish(id);
        self.stats.record_transaction_commit();
        debug!(target: "ordb::txn", id = %id, entries = entries.len(), "transaction committed");

        let events: Vec<ChangeEvent> = entries.iter().map(JournalEntry::to_event).collect();
        self.feed.emit_batch(events);

        Ok(value)
    }

    /// Applies commit hooks entry by entry, reversing on failure.
    fn apply_hooks(&self, id: TxId, entries: &[JournalEntry]) -> StoreResult<()> {
        let hooks = self.hooks.read();
        if hooks.is_empty() {
            return Ok(());
        }
        for (at, entry) in entries.iter().enumerate() {
            let Some(hook) = hooks.get(&entry.store) else {
                continue;
            };
            if let Err(err) = hook.apply(entry) {
                for done in entries[..at].iter().rev() {
                    let Some(hook) = hooks.get(&done.store) else {
                        continue;
                    };
                    if let Err(reverse_err) = hook.reverse(done) {
                        warn!(
                            target: "ordb::txn",
                            id = %id,
                            store = %done.store,
                            error = %reverse_err,
                            "commit hook reversal failed"
                        );
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn abort(&self, id: TxId, reason: &str) {
        self.scheduler.finish(id);
        self.stats.record_transaction_abort();
        debug!(target: "ordb::txn", id = %id, reason, "transaction aborted");
    }
}

impl std::fmt::Debug for TxManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxManager")
            .field("hooks", &self.hooks.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::handle::StoreHandle;
    use crate::key::{Key, KeyPath};
    use crate::notify::OpCode;
    use crate::value::Value;

    struct Fixture {
        manager: TxManager,
        feed: Arc<ChangeFeed>,
        stats: Arc<DatabaseStats>,
        stores: Vec<(String, Arc<RwLock<RecordStore>>)>,
    }

    impl Fixture {
        fn new(names: &[&str]) -> Self {
            let feed = Arc::new(ChangeFeed::new());
            let stats = Arc::new(DatabaseStats::new());
            let manager = TxManager::new(feed.clone(), stats.clone());
            let stores = names
                .iter()
                .map(|name| {
                    let config = StoreConfig::new(*name).key_path(KeyPath::single("id"));
                    let store = RecordStore::new(config).unwrap();
                    (name.to_string(), Arc::new(RwLock::new(store)))
                })
                .collect();
            Self {
                manager,
                feed,
                stats,
                stores,
            }
        }

        fn scope(&self, names: &[&str]) -> Vec<(String, Arc<RwLock<RecordStore>>)> {
            self.stores
                .iter()
                .filter(|(name, _)| names.contains(&name.as_str()))
                .map(|(name, cell)| (name.clone(), cell.clone()))
                .collect()
        }

        fn cell(&self, name: &str) -> &Arc<RwLock<RecordStore>> {
            &self
                .stores
                .iter()
                .find(|(n, _)| n == name)
                .expect("store")
                .1
        }
    }

    fn record(id: i64) -> Value {
        Value::object([("id", Value::from(id))])
    }

    #[test]
    fn commit_publishes_to_every_scoped_store() {
        let fx = Fixture::new(&["a", "b"]);

        fx.manager
            .run(
                fx.scope(&["a", "b"]),
                TxMode::ReadWrite,
                None,
                |tx| {
                    tx.store("a")?.put(record(1))?;
                    tx.store("b")?.put(record(2))?;
                    tx.store("a")?.put(record(3))?;
                    Ok(())
                },
            )
            .unwrap();

        assert_eq!(fx.cell("a").read().len(), 2);
        assert_eq!(fx.cell("b").read().len(), 1);
        assert_eq!(fx.stats.transactions_committed(), 1);

        // Events replay in operation order across stores.
        let events = fx.feed.poll(0, 10);
        let stores: Vec<&str> = events.iter().map(|e| e.store.as_str()).collect();
        assert_eq!(stores, vec!["a", "b", "a"]);
        assert!(events.iter().all(|e| e.opcode == OpCode::New));
    }

    #[test]
    fn writes_stay_invisible_until_commit() {
        let fx = Fixture::new(&["a"]);

        fx.manager
            .run(fx.scope(&["a"]), TxMode::ReadWrite, None, |tx| {
                tx.store("a")?.put(record(1))?;
                // The live store has not moved yet.
                assert_eq!(fx.cell("a").read().len(), 0);
                // But the transaction sees its own write.
                assert_eq!(tx.store("a")?.len()?, 1);
                Ok(())
            })
            .unwrap();

        assert_eq!(fx.cell("a").read().len(), 1);
    }

    #[test]
    fn body_error_aborts_and_emits_nothing() {
        let fx = Fixture::new(&["a"]);

        let err = fx
            .manager
            .run(fx.scope(&["a"]), TxMode::ReadWrite, None, |tx| {
                tx.store("a")?.put(record(1))?;
                Err::<(), _>(StoreError::data("boom"))
            })
            .unwrap_err();

        assert!(err.is_data());
        assert_eq!(fx.cell("a").read().len(), 0);
        assert_eq!(fx.feed.latest_sequence(), 0);
        assert_eq!(fx.stats.transactions_aborted(), 1);
    }

    #[test]
    fn rollback_returns_the_value_but_applies_nothing() {
        let fx = Fixture::new(&["a"]);

        let value = fx
            .manager
            .run(fx.scope(&["a"]), TxMode::ReadWrite, None, |tx| {
                tx.store("a")?.put(record(1))?;
                tx.rollback();
                Ok(41 + 1)
            })
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(fx.cell("a").read().len(), 0);
        assert_eq!(fx.feed.latest_sequence(), 0);
        assert_eq!(fx.stats.transactions_aborted(), 1);
        assert_eq!(fx.stats.transactions_committed(), 0);
    }

    #[test]
    fn read_only_transactions_cannot_write() {
        let fx = Fixture::new(&["a"]);

        let err = fx
            .manager
            .run(fx.scope(&["a"]), TxMode::ReadOnly, None, |tx| {
                tx.store("a")?.put(record(1))
            })
            .unwrap_err();

        assert!(matches!(err, StoreError::ReadOnly { .. }));
        assert_eq!(fx.cell("a").read().len(), 0);
    }

    #[test]
    fn net_zero_stores_skip_publication() {
        let fx = Fixture::new(&["a"]);
        fx.cell("a")
            .write()
            .store_record(record(7), crate::config::WriteOptions::put())
            .unwrap();
        let before = fx.cell("a").read().revision();

        fx.manager
            .run(fx.scope(&["a"]), TxMode::ReadWrite, None, |tx| {
                let store = tx.store("a")?;
                store.add(record(1))?;
                store.remove(1)?;
                Ok(())
            })
            .unwrap();

        // The add and delete cancelled, so the fork never replaced the
        // store and the revision count kept its pre-transaction value.
        assert_eq!(fx.cell("a").read().revision(), before);
        assert_eq!(fx.feed.latest_sequence(), 0);
        assert_eq!(fx.stats.transactions_committed(), 1);
    }

    #[test]
    fn deferred_operations_run_before_publication() {
        let fx = Fixture::new(&["a"]);
        let ran = Arc::new(AtomicBool::new(false));

        let ran_in_defer = ran.clone();
        fx.manager
            .run(fx.scope(&["a"]), TxMode::ReadWrite, None, move |tx| {
                tx.store("a")?.put(record(1))?;
                let ran = ran_in_defer.clone();
                tx.defer(move || {
                    ran.store(true, Ordering::Release);
                    Ok(())
                });
                Ok(())
            })
            .unwrap();

        assert!(ran.load(Ordering::Acquire));
        assert_eq!(fx.cell("a").read().len(), 1);
    }

    #[test]
    fn deferred_failure_aborts_the_commit() {
        let fx = Fixture::new(&["a"]);

        let err = fx
            .manager
            .run(fx.scope(&["a"]), TxMode::ReadWrite, None, |tx| {
                tx.store("a")?.put(record(1))?;
                tx.defer(|| Err(StoreError::invalid_state("resource gone")));
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, StoreError::InvalidState { .. }));
        assert_eq!(fx.cell("a").read().len(), 0);
        assert_eq!(fx.feed.latest_sequence(), 0);
    }

    #[derive(Default)]
    struct RecordingHook {
        applied: Mutex<Vec<Option<Key>>>,
        reversed: Mutex<Vec<Option<Key>>>,
        fail_on: Option<Key>,
    }

    impl CommitHook for RecordingHook {
        fn apply(&self, entry: &JournalEntry) -> StoreResult<()> {
            if self.fail_on.is_some() && entry.key == self.fail_on {
                return Err(StoreError::invalid_state("hook refused"));
            }
            self.applied.lock().push(entry.key.clone());
            Ok(())
        }

        fn reverse(&self, entry: &JournalEntry) -> StoreResult<()> {
            self.reversed.lock().push(entry.key.clone());
            Ok(())
        }
    }

    #[test]
    fn commit_hooks_see_entries_in_operation_order() {
        let fx = Fixture::new(&["a"]);
        let hook = Arc::new(RecordingHook::default());
        fx.manager.set_hook("a", hook.clone());

        fx.manager
            .run(fx.scope(&["a"]), TxMode::ReadWrite, None, |tx| {
                tx.store("a")?.put(record(1))?;
                tx.store("a")?.put(record(2))?;
                Ok(())
            })
            .unwrap();

        let applied = hook.applied.lock();
        assert_eq!(
            *applied,
            vec![Some(Key::from(1)), Some(Key::from(2))]
        );
        assert!(hook.reversed.lock().is_empty());
    }

    #[test]
    fn hook_failure_reverses_applied_entries_and_aborts() {
        let fx = Fixture::new(&["a"]);
        let hook = Arc::new(RecordingHook {
            fail_on: Some(Key::from(2)),
            ..RecordingHook::default()
        });
        fx.manager.set_hook("a", hook.clone());

        let err = fx
            .manager
            .run(fx.scope(&["a"]), TxMode::ReadWrite, None, |tx| {
                tx.store("a")?.put(record(1))?;
                tx.store("a")?.put(record(2))?;
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, StoreError::InvalidState { .. }));
        // The first entry applied and was reversed; nothing published.
        assert_eq!(*hook.applied.lock(), vec![Some(Key::from(1))]);
        assert_eq!(*hook.reversed.lock(), vec![Some(Key::from(1))]);
        assert_eq!(fx.cell("a").read().len(), 0);
        assert_eq!(fx.feed.latest_sequence(), 0);
    }

    #[test]
    fn handles_escaping_the_body_go_dead() {
        let fx = Fixture::new(&["a"]);

        let escaped: StoreHandle = fx
            .manager
            .run(fx.scope(&["a"]), TxMode::ReadWrite, None, |tx| {
                let handle = tx.store("a")?;
                handle.put(record(1))?;
                Ok(handle)
            })
            .unwrap();

        let err = escaped.get(1).unwrap_err();
        assert!(matches!(err, StoreError::TransactionInactive { .. }));
    }

    #[test]
    fn cursors_opened_in_a_transaction_expire_with_it() {
        let fx = Fixture::new(&["a"]);

        let mut escaped = fx
            .manager
            .run(fx.scope(&["a"]), TxMode::ReadWrite, None, |tx| {
                let store = tx.store("a")?;
                store.put(record(1))?;
                store.put(record(2))?;
                store.open_cursor(None, crate::cursor::Direction::Next)
            })
            .unwrap();

        let err = escaped.next().unwrap_err();
        assert!(matches!(err, StoreError::TransactionInactive { .. }));
    }

    #[test]
    fn transactional_cursor_mutations_land_on_commit() {
        let fx = Fixture::new(&["a"]);
        fx.cell("a")
            .write()
            .store_all(
                vec![record(1), record(2), record(3)],
                &crate::config::WriteOptions::put(),
            )
            .unwrap();

        fx.manager
            .run(fx.scope(&["a"]), TxMode::ReadWrite, None, |tx| {
                let store = tx.store("a")?;
                let mut cursor = store.open_cursor(None, crate::cursor::Direction::Next)?;
                cursor.next()?;
                cursor.remove()?;
                Ok(())
            })
            .unwrap();

        assert_eq!(fx.cell("a").read().len(), 2);
        assert!(fx.cell("a").read().get(&Key::from(2)).is_none());

        let events = fx.feed.poll(0, 10);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].opcode, OpCode::Delete);
        assert_eq!(events[0].key, Some(Key::from(2)));
    }

    #[test]
    fn conflicting_transactions_serialize() {
        let fx = Fixture::new(&["a"]);
        let manager = Arc::new(TxManager::new(fx.feed.clone(), fx.stats.clone()));
        let cell = fx.cell("a").clone();

        let threads: Vec<_> = (0..4i64)
            .map(|n| {
                let manager = manager.clone();
                let cell = cell.clone();
                std::thread::spawn(move || {
                    manager
                        .run(
                            vec![("a".to_string(), cell)],
                            TxMode::ReadWrite,
                            None,
                            |tx| {
                                let store = tx.store("a")?;
                                let count = store.len()?;
                                store.put(record(n * 100 + count as i64))?;
                                Ok(())
                            },
                        )
                        .unwrap();
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        // Serialized writers each saw the previous counts, so all four
        // records are distinct and present.
        assert_eq!(cell.read().len(), 4);
    }
}
