//! Change notification feed.
//!
//! The feed emits one event per applied mutation: immediately for direct
//! store access, or replayed in journal order once a transaction commits.
//! Aborted transactions emit nothing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

use parking_lot::RwLock;

use crate::config::WriteOptions;
use crate::key::Key;
use crate::value::Value;

/// Kind of mutation an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    /// A record was inserted under a key that did not exist.
    New,
    /// A record replaced an existing one under the same key.
    Update,
    /// A record was deleted.
    Delete,
    /// The whole store was cleared.
    Clear,
}

/// A single change event.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Feed-assigned emission sequence, starting at 1.
    pub sequence: u64,
    /// Name of the mutated store.
    pub store: String,
    /// Kind of mutation.
    pub opcode: OpCode,
    /// Primary key, absent for [`OpCode::Clear`].
    pub key: Option<Key>,
    /// Value after the mutation, for [`OpCode::New`] and [`OpCode::Update`].
    pub new_value: Option<Value>,
    /// Value before the mutation, for [`OpCode::Update`] and [`OpCode::Delete`].
    pub old_value: Option<Value>,
    /// Position of the record in the store's array at mutation time.
    pub position: Option<usize>,
    /// Write options that produced the mutation, for writes.
    pub options: Option<WriteOptions>,
}

impl ChangeEvent {
    /// Creates an insert event.
    pub fn new_record(
        store: impl Into<String>,
        key: Key,
        value: Value,
        position: usize,
        options: WriteOptions,
    ) -> Self {
        Self {
            sequence: 0,
            store: store.into(),
            opcode: OpCode::New,
            key: Some(key),
            new_value: Some(value),
            old_value: None,
            position: Some(position),
            options: Some(options),
        }
    }

    /// Creates an update event.
    pub fn updated(
        store: impl Into<String>,
        key: Key,
        new_value: Value,
        old_value: Value,
        position: usize,
        options: WriteOptions,
    ) -> Self {
        Self {
            sequence: 0,
            store: store.into(),
            opcode: OpCode::Update,
            key: Some(key),
            new_value: Some(new_value),
            old_value: Some(old_value),
            position: Some(position),
            options: Some(options),
        }
    }

    /// Creates a delete event.
    pub fn deleted(store: impl Into<String>, key: Key, old_value: Value, position: usize) -> Self {
        Self {
            sequence: 0,
            store: store.into(),
            opcode: OpCode::Delete,
            key: Some(key),
            new_value: None,
            old_value: Some(old_value),
            position: Some(position),
            options: None,
        }
    }

    /// Creates a clear event.
    pub fn cleared(store: impl Into<String>) -> Self {
        Self {
            sequence: 0,
            store: store.into(),
            opcode: OpCode::Clear,
            key: None,
            new_value: None,
            old_value: None,
            position: None,
            options: None,
        }
    }
}

/// A change feed that distributes applied mutations to subscribers.
///
/// The feed:
/// - Emits only applied mutations (committed, for transactional writes)
/// - Preserves application order
/// - Supports multiple subscribers
/// - Is thread-safe
#[derive(Debug)]
pub struct ChangeFeed {
    /// Subscribers (senders).
    subscribers: RwLock<Vec<Sender<ChangeEvent>>>,
    /// History of recent events for polling.
    history: RwLock<Vec<ChangeEvent>>,
    /// Maximum history size.
    max_history: usize,
    /// Next sequence number to assign.
    next_sequence: AtomicU64,
}

impl ChangeFeed {
    /// Creates a new change feed.
    pub fn new() -> Self {
        Self::with_max_history(10000)
    }

    /// Creates a change feed with a specific history limit.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(Vec::new()),
            max_history,
            next_sequence: AtomicU64::new(1),
        }
    }

    /// Subscribes to the change feed.
    ///
    /// Returns a receiver that will receive all future change events.
    /// The receiver should be polled regularly to avoid unbounded memory
    /// growth.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Emits a change event to all subscribers.
    ///
    /// Assigns and returns the event's sequence number.
    pub fn emit(&self, mut event: ChangeEvent) -> u64 {
        let sequence = {
            // Sequence numbers are handed out under the history lock so
            // concurrent emitters cannot interleave history out of order.
            let mut history = self.history.write();
            let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
            event.sequence = sequence;
            history.push(event.clone());
            // Trim history if needed
            if history.len() > self.max_history {
                let to_remove = history.len() - self.max_history;
                history.drain(0..to_remove);
            }
            sequence
        };

        // Send to subscribers (remove disconnected ones)
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        sequence
    }

    /// Emits multiple events from a single commit, in order.
    pub fn emit_batch(&self, events: Vec<ChangeEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    /// Polls events with sequence above `cursor`, up to `limit`.
    ///
    /// This is useful for catch-up scenarios.
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<ChangeEvent> {
        let history = self.history.read();
        history
            .iter()
            .filter(|e| e.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns the latest sequence number in history.
    pub fn latest_sequence(&self) -> u64 {
        self.history.read().last().map(|e| e.sequence).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Returns the number of events in history.
    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }

    /// Clears history older than the given sequence.
    pub fn truncate_history(&self, min_sequence: u64) {
        let mut history = self.history.write();
        history.retain(|e| e.sequence >= min_sequence);
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn put_event(n: i64) -> ChangeEvent {
        ChangeEvent::new_record(
            "people",
            Key::from(n),
            Value::from(n),
            0,
            WriteOptions::put(),
        )
    }

    #[test]
    fn emit_and_receive() {
        let feed = ChangeFeed::new();
        let rx = feed.subscribe();

        feed.emit(put_event(1));

        let received = rx.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(received.sequence, 1);
        assert_eq!(received.opcode, OpCode::New);
        assert_eq!(received.key, Some(Key::from(1)));
    }

    #[test]
    fn multiple_subscribers() {
        let feed = ChangeFeed::new();
        let rx1 = feed.subscribe();
        let rx2 = feed.subscribe();

        feed.emit(put_event(1));

        assert_eq!(rx1.recv().unwrap().key, Some(Key::from(1)));
        assert_eq!(rx2.recv().unwrap().key, Some(Key::from(1)));
    }

    #[test]
    fn subscriber_cleanup() {
        let feed = ChangeFeed::new();
        assert_eq!(feed.subscriber_count(), 0);

        let rx = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);

        // Drop receiver
        drop(rx);

        // Emit - should clean up disconnected subscriber
        feed.emit(put_event(1));
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn poll_from_cursor() {
        let feed = ChangeFeed::new();

        for i in 1..=5 {
            feed.emit(put_event(i));
        }

        // Poll from cursor 2 (get events 3, 4, 5)
        let events = feed.poll(2, 10);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].sequence, 3);
        assert_eq!(events[1].sequence, 4);
        assert_eq!(events[2].sequence, 5);
    }

    #[test]
    fn poll_with_limit() {
        let feed = ChangeFeed::new();

        for i in 1..=10 {
            feed.emit(put_event(i));
        }

        let events = feed.poll(0, 3);
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn history_truncation() {
        let feed = ChangeFeed::with_max_history(5);

        for i in 1..=10 {
            feed.emit(put_event(i));
        }

        assert_eq!(feed.history_len(), 5);
        // Only events 6-10 should remain
        let events = feed.poll(0, 100);
        assert_eq!(events[0].sequence, 6);
    }

    #[test]
    fn truncate_history_drops_events_below_the_watermark() {
        let feed = ChangeFeed::new();
        for i in 1..=5 {
            feed.emit(put_event(i));
        }

        feed.truncate_history(3);

        assert_eq!(feed.history_len(), 3);
        let events = feed.poll(0, 100);
        assert_eq!(events[0].sequence, 3);
        assert_eq!(feed.latest_sequence(), 5);
    }

    #[test]
    fn concurrent_emits_keep_history_in_sequence_order() {
        let feed = Arc::new(ChangeFeed::new());

        let emitters: Vec<_> = (0..4)
            .map(|_| {
                let feed = Arc::clone(&feed);
                thread::spawn(move || {
                    for i in 0..50 {
                        feed.emit(put_event(i));
                    }
                })
            })
            .collect();
        for emitter in emitters {
            emitter.join().unwrap();
        }

        let sequences: Vec<u64> = feed.poll(0, 1000).iter().map(|e| e.sequence).collect();
        let expected: Vec<u64> = (1..=200).collect();
        assert_eq!(sequences, expected);
    }

    #[test]
    fn latest_sequence_tracks_emission() {
        let feed = ChangeFeed::new();
        assert_eq!(feed.latest_sequence(), 0);

        feed.emit(put_event(1));
        feed.emit(ChangeEvent::cleared("people"));
        assert_eq!(feed.latest_sequence(), 2);
    }

    #[test]
    fn threaded_subscribe() {
        let feed = Arc::new(ChangeFeed::new());
        let rx = feed.subscribe();

        let feed_clone = Arc::clone(&feed);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            feed_clone.emit(ChangeEvent::deleted(
                "people",
                Key::from(42),
                Value::from(42),
                0,
            ));
        });

        let received = rx.recv_timeout(Duration::from_millis(500)).unwrap();
        assert_eq!(received.opcode, OpCode::Delete);
        assert_eq!(received.old_value, Some(Value::from(42)));

        handle.join().unwrap();
    }
}
