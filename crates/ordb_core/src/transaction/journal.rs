//! Write-ahead journal for transactions.
//!
//! Every mutation inside a transaction lands here first. Data changes
//! live in the store clones; the journal's job is replaying commit hooks
//! and change notifications in the original operation order once the
//! transaction commits.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::config::WriteOptions;
use crate::key::Key;
use crate::notify::{ChangeEvent, ChangeFeed, OpCode};
use crate::record::Record;
use crate::store::MutationReport;
use crate::value::Value;

/// One journaled mutation.
#[derive(Debug, Clone)]
pub struct JournalEntry {
    /// Name of the mutated store.
    pub store: String,
    /// Kind of mutation.
    pub opcode: OpCode,
    /// Primary key, absent for clears.
    pub key: Option<Key>,
    /// Value after the mutation.
    pub new_value: Option<Value>,
    /// Value before the mutation.
    pub old_value: Option<Value>,
    /// Revision of the overwritten or deleted record.
    pub old_rev: u64,
    /// Array position the mutation touched.
    pub position: Option<usize>,
    /// Write options, for writes.
    pub options: Option<WriteOptions>,
    /// Previous contents, for clears.
    pub cleared: Vec<Record>,
}

impl JournalEntry {
    fn from_report(store: &str, report: &MutationReport) -> Self {
        match report {
            MutationReport::Write {
                opcode,
                key,
                new_value,
                old_value,
                old_rev,
                position,
                options,
            } => Self {
                store: store.to_string(),
                opcode: *opcode,
                key: Some(key.clone()),
                new_value: Some(new_value.clone()),
                old_value: old_value.clone(),
                old_rev: *old_rev,
                position: Some(*position),
                options: Some(options.clone()),
                cleared: Vec::new(),
            },
            MutationReport::Delete {
                key,
                old_value,
                old_rev,
                position,
            } => Self {
                store: store.to_string(),
                opcode: OpCode::Delete,
                key: Some(key.clone()),
                new_value: None,
                old_value: Some(old_value.clone()),
                old_rev: *old_rev,
                position: Some(*position),
                options: None,
                cleared: Vec::new(),
            },
            MutationReport::Clear { cleared } => Self {
                store: store.to_string(),
                opcode: OpCode::Clear,
                key: None,
                new_value: None,
                old_value: None,
                old_rev: 0,
                position: None,
                options: None,
                cleared: cleared.clone(),
            },
        }
    }

    /// Renders this entry as a change event for commit replay.
    pub fn to_event(&self) -> ChangeEvent {
        ChangeEvent {
            sequence: 0,
            store: self.store.clone(),
            opcode: self.opcode,
            key: self.key.clone(),
            new_value: self.new_value.clone(),
            old_value: self.old_value.clone(),
            position: self.position,
            options: self.options.clone(),
        }
    }
}

/// An ordered log of mutations within one transaction.
#[derive(Debug, Default)]
pub struct Journal {
    entries: Vec<JournalEntry>,
}

impl Journal {
    /// Creates an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Journals a mutation report against `store`.
    ///
    /// A delete whose key matches an outstanding insert in this journal
    /// cancels instead of appending: the insert entry, any updates to the
    /// same key, and the delete all vanish, since external observers
    /// never saw the record exist. Only the latest insert cancels; an
    /// earlier insert of the same key already consumed by a clear stays.
    pub(crate) fn record(&mut self, store: &str, report: &MutationReport) {
        if let MutationReport::Delete { key, .. } = report {
            let new_at = self.entries.iter().rposition(|e| {
                e.store == store && e.opcode == OpCode::New && e.key.as_ref() == Some(key)
            });
            if let Some(at) = new_at {
                let key = key.clone();
                let mut i = at;
                while i < self.entries.len() {
                    let e = &self.entries[i];
                    if e.store == store && e.key.as_ref() == Some(&key) {
                        self.entries.remove(i);
                    } else {
                        i += 1;
                    }
                }
                return;
            }
        }
        self.entries.push(JournalEntry::from_report(store, report));
    }

    /// Journaled entries in operation order.
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Number of journaled entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of entries touching `store`.
    pub fn net_updates(&self, store: &str) -> usize {
        self.entries.iter().filter(|e| e.store == store).count()
    }

    /// Drains the journal for commit processing.
    pub(crate) fn take(&mut self) -> Vec<JournalEntry> {
        std::mem::take(&mut self.entries)
    }
}

/// Where a mutation report goes: straight to the feed, or into a journal
/// for replay at commit.
#[derive(Debug, Clone)]
pub(crate) enum MutationSink {
    /// Emit immediately (direct store access).
    Feed(Arc<ChangeFeed>),
    /// Append to a transaction journal.
    Journal(Arc<Mutex<Journal>>),
}

impl MutationSink {
    pub(crate) fn record(&self, store: &str, report: &MutationReport) {
        trace!(target: "ordb::store", store, opcode = ?report.opcode(), "mutation recorded");
        match self {
            Self::Feed(feed) => {
                feed.emit(report.to_event(store));
            }
            Self::Journal(journal) => journal.lock().record(store, report),
        }
    }

    pub(crate) fn record_all(&self, store: &str, reports: &[MutationReport]) {
        for report in reports {
            self.record(store, report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_report(opcode: OpCode, key: i64) -> MutationReport {
        MutationReport::Write {
            opcode,
            key: Key::from(key),
            new_value: Value::from(key),
            old_value: None,
            old_rev: 0,
            position: 0,
            options: WriteOptions::put(),
        }
    }

    fn delete_report(key: i64) -> MutationReport {
        MutationReport::Delete {
            key: Key::from(key),
            old_value: Value::from(key),
            old_rev: 0,
            position: 0,
        }
    }

    #[test]
    fn entries_keep_operation_order() {
        let mut journal = Journal::new();
        journal.record("a", &write_report(OpCode::New, 1));
        journal.record("b", &write_report(OpCode::New, 2));
        journal.record("a", &delete_report(3));

        let ops: Vec<(&str, OpCode)> = journal
            .entries()
            .iter()
            .map(|e| (e.store.as_str(), e.opcode))
            .collect();
        assert_eq!(
            ops,
            vec![("a", OpCode::New), ("b", OpCode::New), ("a", OpCode::Delete)]
        );
    }

    #[test]
    fn insert_then_delete_cancels_both() {
        let mut journal = Journal::new();
        journal.record("a", &write_report(OpCode::New, 1));
        journal.record("a", &delete_report(1));
        assert_eq!(journal.len(), 0);
    }

    #[test]
    fn insert_update_delete_all_cancel() {
        let mut journal = Journal::new();
        journal.record("a", &write_report(OpCode::New, 1));
        journal.record("a", &write_report(OpCode::Update, 1));
        journal.record("a", &delete_report(1));
        assert_eq!(journal.len(), 0);
    }

    #[test]
    fn delete_of_preexisting_record_is_kept() {
        let mut journal = Journal::new();
        journal.record("a", &write_report(OpCode::Update, 1));
        journal.record("a", &delete_report(1));
        assert_eq!(journal.len(), 2);
    }

    #[test]
    fn earlier_delete_survives_a_cancelled_reinsert() {
        let mut journal = Journal::new();
        journal.record("a", &delete_report(1));
        journal.record("a", &write_report(OpCode::New, 1));
        journal.record("a", &write_report(OpCode::Update, 1));
        journal.record("a", &delete_report(1));

        assert_eq!(journal.len(), 1);
        assert_eq!(journal.entries()[0].opcode, OpCode::Delete);
    }

    #[test]
    fn insert_consumed_by_a_clear_survives_cancellation() {
        let mut journal = Journal::new();
        journal.record("a", &write_report(OpCode::New, 1));
        journal.record("a", &MutationReport::Clear { cleared: Vec::new() });
        journal.record("a", &write_report(OpCode::New, 1));
        journal.record("a", &delete_report(1));

        // Only the re-insert cancels; the pre-clear insert is history
        // the clear already accounted for.
        let ops: Vec<OpCode> = journal.entries().iter().map(|e| e.opcode).collect();
        assert_eq!(ops, vec![OpCode::New, OpCode::Clear]);
    }

    #[test]
    fn cancellation_is_scoped_to_store_and_key() {
        let mut journal = Journal::new();
        journal.record("a", &write_report(OpCode::New, 1));
        journal.record("b", &write_report(OpCode::New, 1));
        journal.record("a", &delete_report(1));

        assert_eq!(journal.len(), 1);
        assert_eq!(journal.entries()[0].store, "b");
        assert_eq!(journal.net_updates("a"), 0);
        assert_eq!(journal.net_updates("b"), 1);
    }

    #[test]
    fn clear_entries_carry_previous_contents() {
        let mut journal = Journal::new();
        let cleared = vec![Record::new(Key::from(1), Value::from(1))];
        journal.record("a", &MutationReport::Clear { cleared });

        let entry = &journal.entries()[0];
        assert_eq!(entry.opcode, OpCode::Clear);
        assert_eq!(entry.key, None);
        assert_eq!(entry.cleared.len(), 1);

        let event = entry.to_event();
        assert_eq!(event.opcode, OpCode::Clear);
        assert_eq!(event.key, None);
    }

    #[test]
    fn take_drains_the_journal() {
        let mut journal = Journal::new();
        journal.record("a", &write_report(OpCode::New, 1));
        let entries = journal.take();
        assert_eq!(entries.len(), 1);
        assert_eq!(journal.len(), 0);
    }
}
