//! Scope-based transaction admission.
//!
//! A transaction declares up front which stores it will touch. The
//! scheduler admits it immediately when no active transaction conflicts,
//! otherwise the caller blocks until every conflicting transaction
//! finishes (or a timeout elapses). Two read-only transactions never
//! conflict; a read-write transaction conflicts with anything whose
//! scope intersects its own.

use std::collections::{BTreeSet, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::error::{StoreError, StoreResult};
use crate::transaction::{TxId, TxMode};

#[derive(Debug)]
struct Ticket {
    id: TxId,
    mode: TxMode,
    scope: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct SchedulerState {
    active: Vec<Ticket>,
    pending: VecDeque<Ticket>,
}

/// Admits transactions so that conflicting scopes never run together.
#[derive(Debug, Default)]
pub(crate) struct TxScheduler {
    state: Mutex<SchedulerState>,
    wakeup: Condvar,
}

impl TxScheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Blocks until `id` can run against `scope`, or until `timeout`.
    ///
    /// Queued transactions wait in submission order, though a waiter is
    /// admitted as soon as the active set allows it even if an earlier
    /// waiter is still blocked.
    pub(crate) fn begin(
        &self,
        id: TxId,
        mode: TxMode,
        scope: BTreeSet<String>,
        timeout: Option<Duration>,
    ) -> StoreResult<()> {
        let started = Instant::now();
        let deadline = timeout.map(|t| started + t);

        let mut state = self.state.lock();
        if admissible(&state.active, mode, &scope) {
            state.active.push(Ticket { id, mode, scope });
            trace!(target: "ordb::txn", id = %id, "transaction admitted");
            return Ok(());
        }

        debug!(target: "ordb::txn", id = %id, mode = ?mode, "transaction queued behind conflicting scope");
        state.pending.push_back(Ticket { id, mode, scope });

        loop {
            match deadline {
                Some(deadline) => {
                    if self.wakeup.wait_until(&mut state, deadline).timed_out() {
                        if is_active(&state, id) {
                            return Ok(());
                        }
                        state.pending.retain(|t| t.id != id);
                        let waited_ms = started.elapsed().as_millis() as u64;
                        warn!(target: "ordb::txn", id = %id, waited_ms, "transaction timed out waiting for its scope");
                        return Err(StoreError::Timeout { waited_ms });
                    }
                }
                None => self.wakeup.wait(&mut state),
            }
            if is_active(&state, id) {
                return Ok(());
            }
        }
    }

    /// Retires `id` and admits whichever waiters now fit.
    ///
    /// Waiters are re-examined in submission order; each admission joins
    /// the active set before the next waiter is considered.
    pub(crate) fn finish(&self, id: TxId) {
        let mut state = self.state.lock();
        state.active.retain(|t| t.id != id);

        let mut at = 0;
        while at < state.pending.len() {
            if admissible(&state.active, state.pending[at].mode, &state.pending[at].scope) {
                if let Some(ticket) = state.pending.remove(at) {
                    trace!(target: "ordb::txn", id = %ticket.id, "queued transaction admitted");
                    state.active.push(ticket);
                }
            } else {
                at += 1;
            }
        }
        drop(state);
        self.wakeup.notify_all();
    }

    #[cfg(test)]
    fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    #[cfg(test)]
    fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }
}

fn admissible(active: &[Ticket], mode: TxMode, scope: &BTreeSet<String>) -> bool {
    active.iter().all(|ticket| {
        !scopes_intersect(&ticket.scope, scope)
            || (mode == TxMode::ReadOnly && ticket.mode == TxMode::ReadOnly)
    })
}

fn scopes_intersect(a: &BTreeSet<String>, b: &BTreeSet<String>) -> bool {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small.iter().any(|name| large.contains(name))
}

fn is_active(state: &SchedulerState, id: TxId) -> bool {
    state.active.iter().any(|t| t.id == id)
}
