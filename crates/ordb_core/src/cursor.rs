//! Stateful iteration over stores and indexes.
//!
//! A cursor does not pin the sequence it walks. It remembers the key it
//! is positioned on and re-resolves that key against the live data on
//! every step, so records inserted or deleted after the cursor opened
//! are seen (or skipped) exactly as the array stands at step time.
//! Natural-order stores have no key order to re-search by, so their
//! cursors fall back to the remembered array position when the current
//! record has been deleted out from under them.
//!
//! Index cursors walk index entries in key order and, within one entry,
//! the sorted primary keys. The unique directions skip to the next
//! distinct index key and always land on the entry's first primary key.

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::{StoreOrdering, WriteOptions};
use crate::error::{StoreError, StoreResult};
use crate::index::IndexRecord;
use crate::key::{resolve_range, search, Key, KeyRange};
use crate::record::Record;
use crate::store::RecordStore;
use crate::transaction::journal::MutationSink;
use crate::value::Value;

/// Iteration order of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending, every record.
    Next,
    /// Descending, every record.
    Prev,
    /// Ascending, one record per distinct index key.
    NextUnique,
    /// Descending, one record per distinct index key.
    PrevUnique,
}

impl Direction {
    /// Returns `true` for the ascending directions.
    pub fn forward(self) -> bool {
        matches!(self, Self::Next | Self::NextUnique)
    }

    /// Returns `true` for the directions that skip duplicate index keys.
    pub fn unique(self) -> bool {
        matches!(self, Self::NextUnique | Self::PrevUnique)
    }
}

/// What a cursor walks: a store's record array, or one of its indexes.
#[derive(Debug, Clone)]
pub(crate) enum CursorSource {
    /// The store's own records, in storage order.
    Store(Arc<RwLock<RecordStore>>),
    /// An index, in index key order.
    Index {
        /// Store owning the index.
        store: Arc<RwLock<RecordStore>>,
        /// Index name within the store.
        index: String,
    },
}

impl CursorSource {
    fn cell(&self) -> &Arc<RwLock<RecordStore>> {
        match self {
            Self::Store(cell) | Self::Index { store: cell, .. } => cell,
        }
    }
}

#[derive(Debug, Clone)]
enum CursorState {
    Positioned {
        key: Key,
        primary_key: Key,
        position: usize,
    },
    Exhausted,
}

/// A movable position over a store or index.
///
/// Opened through [`StoreHandle::open_cursor`](crate::StoreHandle::open_cursor)
/// and its siblings. The cursor starts on the first in-range record (or
/// exhausted) and only ever moves in its direction.
#[derive(Debug)]
pub struct Cursor {
    source: CursorSource,
    store_name: String,
    range: KeyRange,
    direction: Direction,
    key_only: bool,
    read_only: bool,
    sink: MutationSink,
    tx_active: Option<Arc<AtomicBool>>,
    generation: u64,
    state: CursorState,
}

impl Cursor {
    pub(crate) fn open(
        source: CursorSource,
        range: Option<KeyRange>,
        direction: Direction,
        key_only: bool,
        read_only: bool,
        sink: MutationSink,
        tx_active: Option<Arc<AtomicBool>>,
    ) -> StoreResult<Self> {
        let range = range.unwrap_or_else(KeyRange::all);
        let cell = source.cell().clone();
        let store = cell.read();
        if let Some(flag) = &tx_active {
            if !flag.load(AtomicOrdering::Acquire) {
                return Err(StoreError::transaction_inactive(
                    "cannot open a cursor after the transaction finished",
                ));
            }
        }
        store.ensure_live()?;

        // Store cursors compare against folded stored keys; index keys
        // never fold.
        let range = match &source {
            CursorSource::Store(_) => store.fold_range(&range).into_owned(),
            CursorSource::Index { .. } => range,
        };

        let state = match &source {
            CursorSource::Store(_) => initial_store(&store, &range, direction.forward()).map(
                |(key, position)| CursorState::Positioned {
                    primary_key: key.clone(),
                    key,
                    position,
                },
            ),
            CursorSource::Index { index, .. } => {
                let engine = store.index(index)?;
                initial_index(engine.entries(), &range, direction).map(
                    |(key, primary_key, position)| CursorState::Positioned {
                        key,
                        primary_key,
                        position,
                    },
                )
            }
        }
        .unwrap_or(CursorState::Exhausted);

        let generation = store.generation();
        let store_name = store.name().to_string();
        drop(store);

        Ok(Self {
            source,
            store_name,
            range,
            direction,
            key_only,
            read_only,
            sink,
            tx_active,
            generation,
            state,
        })
    }

    /// The cursor's iteration direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns `true` if this cursor exposes keys but not values.
    pub fn is_key_only(&self) -> bool {
        self.key_only
    }

    /// Returns `true` while the cursor sits on a record.
    pub fn is_positioned(&self) -> bool {
        matches!(self.state, CursorState::Positioned { .. })
    }

    /// Returns `true` once iteration has run off the range.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, CursorState::Exhausted)
    }

    /// The key at the current position.
    ///
    /// For an index cursor this is the index key; for a store cursor it
    /// equals the primary key.
    pub fn key(&self) -> Option<&Key> {
        match &self.state {
            CursorState::Positioned { key, .. } => Some(key),
            CursorState::Exhausted => None,
        }
    }

    /// The primary key of the record at the current position.
    pub fn primary_key(&self) -> Option<&Key> {
        match &self.state {
            CursorState::Positioned { primary_key, .. } => Some(primary_key),
            CursorState::Exhausted => None,
        }
    }

    /// The value of the record at the current position, read live.
    ///
    /// Returns `None` on a key-only cursor, past the end, or when the
    /// record was deleted after the cursor landed on it.
    pub fn value(&self) -> StoreResult<Option<Value>> {
        let cell = self.source.cell().clone();
        let store = cell.read();
        self.ensure_usable(&store)?;
        if self.key_only {
            return Ok(None);
        }
        match &self.state {
            CursorState::Positioned { primary_key, .. } => {
                Ok(store.get(primary_key).map(|record| record.value.clone()))
            }
            CursorState::Exhausted => Ok(None),
        }
    }

    /// Steps to the next record in the cursor's direction.
    ///
    /// Returns `true` while the cursor remains positioned. Stepping an
    /// exhausted cursor is an error.
    pub fn next(&mut self) -> StoreResult<bool> {
        self.advance(1)
    }

    /// Steps `count` records forward in the cursor's direction.
    ///
    /// `count` must be at least one. Running off the range mid-way
    /// exhausts the cursor and returns `false`.
    pub fn advance(&mut self, count: usize) -> StoreResult<bool> {
        if count == 0 {
            return Err(StoreError::data("cursor advance needs a count of at least 1"));
        }
        if self.is_exhausted() {
            return Err(StoreError::invalid_state("cursor is exhausted"));
        }
        for _ in 0..count {
            self.step_once()?;
            if self.is_exhausted() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Jumps to `target` without visiting the records in between.
    ///
    /// On a sorted source the cursor lands on the first key at or past
    /// `target` in its direction; the target must lie strictly beyond
    /// the current position. On a natural-order store there is no key
    /// order to jump by, so the cursor scans ahead for an exact match.
    pub fn seek(&mut self, target: impl Into<Key>) -> StoreResult<bool> {
        let target = target.into().validated()?;
        let cell = self.source.cell().clone();
        let store = cell.read();
        self.ensure_usable(&store)?;
        let target = match &self.source {
            CursorSource::Store(_) => store.fold_key(&target).into_owned(),
            CursorSource::Index { .. } => target,
        };

        let CursorState::Positioned { key, position, .. } = &self.state else {
            return Err(StoreError::invalid_state("cursor is exhausted"));
        };
        let forward = self.direction.forward();

        let next = match &self.source {
            CursorSource::Store(_) => match store.config().ordering {
                StoreOrdering::Sorted => {
                    check_seek_direction(forward, &target, key)?;
                    let bracket = store.retrieve(&target);
                    let candidate = if forward {
                        bracket.eq.or(bracket.gt)
                    } else {
                        bracket.eq.or(bracket.lt)
                    };
                    candidate.and_then(|at| {
                        let record = &store.records()[at];
                        self.range
                            .contains(&record.key)
                            .then(|| (record.key.clone(), record.key.clone(), at))
                    })
                }
                StoreOrdering::Natural => {
                    scan_natural_for(store.records(), &self.range, forward, *position, &target)
                }
            },
            CursorSource::Index { index, .. } => {
                check_seek_direction(forward, &target, key)?;
                let entries = store.index(index)?.entries();
                let bracket = search(entries, &target);
                let candidate = if forward {
                    bracket.eq.or(bracket.gt)
                } else {
                    bracket.eq.or(bracket.lt)
                };
                candidate.and_then(|at| {
                    land(entries, &self.range, at, self.direction == Direction::Prev)
                })
            }
        };
        drop(store);

        self.reposition(next);
        Ok(self.is_positioned())
    }

    /// Replaces the record at the current position.
    ///
    /// The new value must resolve to the cursor's primary key; moving a
    /// record is not what update is for. Key-only cursors cannot update.
    pub fn update(&mut self, value: Value) -> StoreResult<()> {
        self.ensure_mutable()?;
        let report = {
            let cell = self.source.cell().clone();
            let mut store = cell.write();
            self.ensure_usable(&store)?;
            let CursorState::Positioned { primary_key, .. } = &self.state else {
                return Err(StoreError::invalid_state("cursor is exhausted"));
            };
            let options = if store.config().key_path.is_some() {
                WriteOptions::put()
            } else {
                WriteOptions::put().with_key(primary_key.clone())
            };
            let landing = store.peek_key(&value, &options)?;
            if landing != *primary_key {
                return Err(StoreError::data(
                    "updated value must keep the record's primary key",
                ));
            }
            store.store_record(value, options)?
        };
        self.sink.record(&self.store_name, &report);
        Ok(())
    }

    /// Deletes the record at the current position.
    ///
    /// The cursor stays where it is; the next step re-resolves past the
    /// deleted key. Deleting through a key-only cursor is an error.
    pub fn remove(&mut self) -> StoreResult<()> {
        self.ensure_mutable()?;
        let reports = {
            let cell = self.source.cell().clone();
            let mut store = cell.write();
            self.ensure_usable(&store)?;
            let CursorState::Positioned { primary_key, .. } = &self.state else {
                return Err(StoreError::invalid_state("cursor is exhausted"));
            };
            let range = KeyRange::only(primary_key.clone())?;
            store.delete_record(&range)
        };
        self.sink.record_all(&self.store_name, &reports);
        Ok(())
    }

    fn step_once(&mut self) -> StoreResult<()> {
        let cell = self.source.cell().clone();
        let store = cell.read();
        self.ensure_usable(&store)?;
        let CursorState::Positioned {
            key,
            primary_key,
            position,
        } = &self.state
        else {
            return Err(StoreError::invalid_state("cursor is exhausted"));
        };

        let next = match &self.source {
            CursorSource::Store(_) => {
                step_store(&store, &self.range, self.direction.forward(), key, *position)
                    .map(|(key, at)| (key.clone(), key, at))
            }
            CursorSource::Index { index, .. } => {
                let engine = store.index(index)?;
                step_index(
                    engine.entries(),
                    &self.range,
                    self.direction,
                    key,
                    primary_key,
                )
            }
        };
        drop(store);

        self.reposition(next);
        Ok(())
    }

    fn reposition(&mut self, next: Option<(Key, Key, usize)>) {
        self.state = match next {
            Some((key, primary_key, position)) => CursorState::Positioned {
                key,
                primary_key,
                position,
            },
            None => CursorState::Exhausted,
        };
    }

    fn ensure_mutable(&self) -> StoreResult<()> {
        if self.key_only {
            return Err(StoreError::invalid_state(
                "key-only cursors cannot modify records",
            ));
        }
        if self.read_only {
            return Err(StoreError::read_only(
                "cursor belongs to a read-only transaction",
            ));
        }
        Ok(())
    }

    fn ensure_usable(&self, store: &RecordStore) -> StoreResult<()> {
        if let Some(flag) = &self.tx_active {
            if !flag.load(AtomicOrdering::Acquire) {
                return Err(StoreError::transaction_inactive(
                    "cursor outlived its transaction",
                ));
            }
        }
        store.ensure_live()?;
        if store.generation() != self.generation {
            return Err(StoreError::invalid_state(
                "cursor invalidated: the store was cleared",
            ));
        }
        Ok(())
    }
}

fn check_seek_direction(forward: bool, target: &Key, current: &Key) -> StoreResult<()> {
    let ok = if forward {
        target > current
    } else {
        target < current
    };
    if ok {
        Ok(())
    } else {
        Err(StoreError::data(
            "seek target must lie beyond the cursor's position",
        ))
    }
}

fn initial_store(store: &RecordStore, range: &KeyRange, forward: bool) -> Option<(Key, usize)> {
    let records = store.records();
    match store.config().ordering {
        StoreOrdering::Sorted => {
            let descriptor = resolve_range(records, range);
            let at = if forward {
                descriptor.first
            } else {
                descriptor.last
            }?;
            Some((records[at].key.clone(), at))
        }
        StoreOrdering::Natural => {
            let at = if forward {
                records.iter().position(|r| range.contains(&r.key))
            } else {
                records.iter().rposition(|r| range.contains(&r.key))
            }?;
            Some((records[at].key.clone(), at))
        }
    }
}

fn step_store(
    store: &RecordStore,
    range: &KeyRange,
    forward: bool,
    key: &Key,
    position: usize,
) -> Option<(Key, usize)> {
    let records = store.records();
    let bracket = store.retrieve(key);
    match store.config().ordering {
        StoreOrdering::Sorted => {
            let candidate = if forward {
                match bracket.eq {
                    Some(at) => Some(at + 1).filter(|at| *at < records.len()),
                    None => bracket.gt,
                }
            } else {
                match bracket.eq {
                    Some(at) => at.checked_sub(1),
                    None => bracket.lt,
                }
            }?;
            let record = &records[candidate];
            range
                .contains(&record.key)
                .then(|| (record.key.clone(), candidate))
        }
        StoreOrdering::Natural => {
            // When the current record is gone the bracket carries no
            // adjacency, so fall back to the remembered position.
            if forward {
                let from = match bracket.eq {
                    Some(at) => at + 1,
                    None => position,
                };
                let from = from.min(records.len());
                records[from..]
                    .iter()
                    .position(|r| range.contains(&r.key))
                    .map(|offset| (records[from + offset].key.clone(), from + offset))
            } else {
                let from = match bracket.eq {
                    Some(at) => at,
                    None => position.min(records.len()),
                }
                .checked_sub(1)?;
                records[..=from]
                    .iter()
                    .rposition(|r| range.contains(&r.key))
                    .map(|at| (records[at].key.clone(), at))
            }
        }
    }
}

fn scan_natural_for(
    records: &[Record],
    range: &KeyRange,
    forward: bool,
    position: usize,
    target: &Key,
) -> Option<(Key, Key, usize)> {
    let hit = if forward {
        let from = (position + 1).min(records.len());
        records[from..]
            .iter()
            .position(|r| r.key == *target && range.contains(&r.key))
            .map(|offset| from + offset)
    } else {
        let until = position.min(records.len());
        records[..until]
            .iter()
            .rposition(|r| r.key == *target && range.contains(&r.key))
    }?;
    let key = records[hit].key.clone();
    Some((key.clone(), key, hit))
}

/// Positions on entry `at`, picking its first or last primary key.
fn land(
    entries: &[IndexRecord],
    range: &KeyRange,
    at: usize,
    last_pk: bool,
) -> Option<(Key, Key, usize)> {
    let entry = entries.get(at)?;
    if !range.contains(&entry.key) {
        return None;
    }
    let pk = if last_pk {
        entry.primary_keys.last()
    } else {
        entry.primary_keys.first()
    }?;
    Some((entry.key.clone(), pk.clone(), at))
}

fn initial_index(
    entries: &[IndexRecord],
    range: &KeyRange,
    direction: Direction,
) -> Option<(Key, Key, usize)> {
    let descriptor = resolve_range(entries, range);
    match direction {
        Direction::Next | Direction::NextUnique => land(entries, range, descriptor.first?, false),
        Direction::Prev => land(entries, range, descriptor.last?, true),
        Direction::PrevUnique => land(entries, range, descriptor.last?, false),
    }
}

fn step_index(
    entries: &[IndexRecord],
    range: &KeyRange,
    direction: Direction,
    key: &Key,
    primary_key: &Key,
) -> Option<(Key, Key, usize)> {
    let bracket = search(entries, key);
    match direction {
        Direction::Next => {
            if let Some(at) = bracket.eq {
                let pks = &entries[at].primary_keys;
                let pos = pks.partition_point(|pk| pk < primary_key);
                let next = if pks.get(pos) == Some(primary_key) {
                    pos + 1
                } else {
                    pos
                };
                if let Some(pk) = pks.get(next) {
                    return Some((entries[at].key.clone(), pk.clone(), at));
                }
                land(entries, range, at + 1, false)
            } else {
                land(entries, range, bracket.gt?, false)
            }
        }
        Direction::NextUnique => {
            let at = match bracket.eq {
                Some(at) => at + 1,
                None => bracket.gt?,
            };
            land(entries, range, at, false)
        }
        Direction::Prev => {
            if let Some(at) = bracket.eq {
                let pks = &entries[at].primary_keys;
                let pos = pks.partition_point(|pk| pk < primary_key);
                if pos > 0 {
                    return Some((entries[at].key.clone(), pks[pos - 1].clone(), at));
                }
                land(entries, range, at.checked_sub(1)?, true)
            } else {
                land(entries, range, bracket.lt?, true)
            }
        }
        Direction::PrevUnique => {
            let at = match bracket.eq {
                Some(at) => at.checked_sub(1)?,
                None => bracket.lt?,
            };
            land(entries, range, at, false)
        }
    }
}
