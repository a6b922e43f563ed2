//! Record stores.
//!
//! A [`RecordStore`] owns one record array, its secondary indexes, a
//! revision counter, and the auto-increment state. The array itself is
//! managed through the [`Storage`] contract, which has a key-sorted and
//! an insertion-ordered implementation; everything above the contract is
//! strategy-agnostic.
//!
//! Stores never notify and never journal. Every mutation returns a
//! [`MutationReport`] and the caller decides whether that report is
//! emitted immediately (direct access) or journaled (transactions).

mod natural;
mod sorted;

pub(crate) use natural::NaturalStorage;
pub(crate) use sorted::SortedStorage;

use std::borrow::Cow;
use std::fmt;

use crate::config::{StoreConfig, StoreOrdering, WriteOptions};
use crate::error::{StoreError, StoreResult};
use crate::index::IndexEngine;
use crate::key::{Key, KeyRange, PositionBracket};
use crate::notify::{ChangeEvent, OpCode};
use crate::record::Record;
use crate::value::Value;

/// Storage-procedure contract shared by the ordering strategies.
///
/// Implementations keep their record array behind an `Arc` and mutate it
/// through `Arc::make_mut`, so [`Storage::snapshot`] is cheap and a
/// snapshot's first write copies the array instead of the original.
pub(crate) trait Storage: Send + Sync + fmt::Debug {
    /// Number of records.
    fn len(&self) -> usize;

    /// The record array, in this strategy's order.
    fn records(&self) -> &[Record];

    /// Locates `key` relative to the array.
    fn retrieve(&self, key: &Key) -> PositionBracket;

    /// The record stored under `key`.
    fn get(&self, key: &Key) -> Option<&Record>;

    /// Positions of in-range records, in array order.
    fn in_range_positions(&self, range: &KeyRange) -> Vec<usize>;

    /// Splices a new record in, optionally before an existing key.
    fn insert(&mut self, record: Record, before: Option<&Key>) -> StoreResult<usize>;

    /// Replaces the record already stored under the same key.
    fn replace(&mut self, record: Record) -> StoreResult<usize>;

    /// Removes the record under `key`, reporting where it sat.
    fn remove(&mut self, key: &Key) -> Option<(usize, Record)>;

    /// Empties the array, returning the previous contents.
    fn clear(&mut self) -> Vec<Record>;

    /// A copy-on-write snapshot of this storage.
    fn snapshot(&self) -> Box<dyn Storage>;
}

/// What a mutation did, in enough detail to notify or journal it.
#[derive(Debug, Clone)]
pub(crate) enum MutationReport {
    /// A record was inserted or overwritten.
    Write {
        opcode: OpCode,
        key: Key,
        new_value: Value,
        old_value: Option<Value>,
        old_rev: u64,
        position: usize,
        options: WriteOptions,
    },
    /// A record was deleted.
    Delete {
        key: Key,
        old_value: Value,
        old_rev: u64,
        position: usize,
    },
    /// The store was emptied.
    Clear {
        /// Previous contents, already marked stale.
        cleared: Vec<Record>,
    },
}

impl MutationReport {
    /// The mutation kind.
    pub(crate) fn opcode(&self) -> OpCode {
        match self {
            Self::Write { opcode, .. } => *opcode,
            Self::Delete { .. } => OpCode::Delete,
            Self::Clear { .. } => OpCode::Clear,
        }
    }

    /// The mutated key, absent for clears.
    pub(crate) fn key(&self) -> Option<&Key> {
        match self {
            Self::Write { key, .. } => Some(key),
            Self::Delete { key, .. } => Some(key),
            Self::Clear { .. } => None,
        }
    }

    /// Renders this report as a change event for `store`.
    pub(crate) fn to_event(&self, store: &str) -> ChangeEvent {
        match self {
            Self::Write {
                opcode: OpCode::New,
                key,
                new_value,
                position,
                options,
                ..
            } => ChangeEvent::new_record(
                store,
                key.clone(),
                new_value.clone(),
                *position,
                options.clone(),
            ),
            Self::Write {
                key,
                new_value,
                old_value,
                position,
                options,
                ..
            } => ChangeEvent::updated(
                store,
                key.clone(),
                new_value.clone(),
                old_value.clone().unwrap_or(Value::Null),
                *position,
                options.clone(),
            ),
            Self::Delete {
                key,
                old_value,
                position,
                ..
            } => ChangeEvent::deleted(store, key.clone(), old_value.clone(), *position),
            Self::Clear { .. } => ChangeEvent::cleared(store),
        }
    }
}

/// One record store: array, indexes, revision, and key generator.
#[derive(Debug)]
pub(crate) struct RecordStore {
    config: StoreConfig,
    storage: Box<dyn Storage>,
    indexes: Vec<IndexEngine>,
    /// Bumped on every successful mutation.
    revision: u64,
    /// Bumped when the store is cleared or destroyed; open cursors check it.
    generation: u64,
    /// Next key the auto-increment generator would hand out.
    next_auto_key: u64,
    destroyed: bool,
}

impl RecordStore {
    /// Builds an empty store, validating its configuration.
    pub(crate) fn new(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let storage: Box<dyn Storage> = match config.ordering {
            StoreOrdering::Sorted => Box::new(SortedStorage::new()),
            StoreOrdering::Natural => Box::new(NaturalStorage::new()),
        };
        let indexes = config
            .indexes
            .iter()
            .cloned()
            .map(IndexEngine::new)
            .collect();
        Ok(Self {
            config,
            storage,
            indexes,
            revision: 0,
            generation: 0,
            next_auto_key: 1,
            destroyed: false,
        })
    }

    /// Store name.
    pub(crate) fn name(&self) -> &str {
        &self.config.name
    }

    /// Store configuration.
    pub(crate) fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Revision counter.
    pub(crate) fn revision(&self) -> u64 {
        self.revision
    }

    /// Clear/destroy generation counter.
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of records.
    pub(crate) fn len(&self) -> usize {
        self.storage.len()
    }

    /// The record array, in storage order.
    pub(crate) fn records(&self) -> &[Record] {
        self.storage.records()
    }

    /// Fails unless the store is still live.
    pub(crate) fn ensure_live(&self) -> StoreResult<()> {
        if self.destroyed {
            return Err(StoreError::invalid_state(format!(
                "store {:?} has been dropped",
                self.config.name
            )));
        }
        Ok(())
    }

    /// Marks the store dropped; open cursors and handles go stale.
    pub(crate) fn destroy(&mut self) {
        self.destroyed = true;
        self.generation += 1;
    }

    /// The index named `name`.
    pub(crate) fn index(&self, name: &str) -> StoreResult<&IndexEngine> {
        self.indexes
            .iter()
            .find(|index| index.name() == name)
            .ok_or_else(|| StoreError::index_not_found(name))
    }

    /// All indexes on this store.
    pub(crate) fn indexes(&self) -> &[IndexEngine] {
        &self.indexes
    }

    /// Copy-on-write fork for a transaction clone.
    ///
    /// Shares every array with `self` until one side writes.
    pub(crate) fn fork(&self) -> Self {
        Self {
            config: self.config.clone(),
            storage: self.storage.snapshot(),
            indexes: self.indexes.clone(),
            revision: self.revision,
            generation: self.generation,
            next_auto_key: self.next_auto_key,
            destroyed: self.destroyed,
        }
    }

    /// Adopts a committed fork's state wholesale.
    pub(crate) fn absorb(&mut self, fork: Self) {
        self.storage = fork.storage;
        self.indexes = fork.indexes;
        self.revision = fork.revision;
        self.generation = fork.generation;
        self.next_auto_key = fork.next_auto_key;
    }

    /// Uppercase-folds a string lookup key when the store is configured
    /// to fold keys.
    ///
    /// Stored keys fold at write time, so every read-side key must fold
    /// the same way to land on them.
    pub(crate) fn fold_key<'a>(&self, key: &'a Key) -> Cow<'a, Key> {
        match key {
            Key::String(s) if self.config.uppercase_keys => {
                Cow::Owned(Key::String(s.to_uppercase()))
            }
            _ => Cow::Borrowed(key),
        }
    }

    /// Folds a range's bound keys the way [`RecordStore::fold_key`] folds
    /// lookup keys.
    pub(crate) fn fold_range<'a>(&self, range: &'a KeyRange) -> Cow<'a, KeyRange> {
        if self.config.uppercase_keys {
            Cow::Owned(range.map_bounds(|key| self.fold_key(key).into_owned()))
        } else {
            Cow::Borrowed(range)
        }
    }

    /// Locates `key` relative to the record array.
    pub(crate) fn retrieve(&self, key: &Key) -> PositionBracket {
        self.storage.retrieve(self.fold_key(key).as_ref())
    }

    /// The record stored under `key`.
    pub(crate) fn get(&self, key: &Key) -> Option<&Record> {
        self.storage.get(self.fold_key(key).as_ref())
    }

    /// In-range records in storage order, up to `limit`.
    pub(crate) fn get_range(
        &self,
        range: Option<&KeyRange>,
        limit: Option<usize>,
    ) -> Vec<&Record> {
        let records = self.storage.records();
        let limit = limit.unwrap_or(usize::MAX);
        match range {
            None => records.iter().take(limit).collect(),
            Some(range) => self
                .storage
                .in_range_positions(self.fold_range(range).as_ref())
                .into_iter()
                .take(limit)
                .map(|at| &records[at])
                .collect(),
        }
    }

    /// Number of in-range records.
    pub(crate) fn count(&self, range: Option<&KeyRange>) -> usize {
        match range {
            None => self.storage.len(),
            Some(range) => self
                .storage
                .in_range_positions(self.fold_range(range).as_ref())
                .len(),
        }
    }

    /// The key a write of `value` would land under, without writing.
    pub(crate) fn peek_key(&self, value: &Value, options: &WriteOptions) -> StoreResult<Key> {
        let value = self.apply_defaults(value.clone());
        let (key, _, _) = self.resolve_key(value, options)?;
        Ok(key)
    }

    /// Stores one record per the write options.
    ///
    /// Key resolution, defaults, uppercase folding, uniqueness, index
    /// maintenance, and the splice happen here; the array is only touched
    /// once every index accepted the record.
    pub(crate) fn store_record(
        &mut self,
        value: Value,
        options: WriteOptions,
    ) -> StoreResult<MutationReport> {
        let value = self.apply_defaults(value);
        let (key, value, bump) = self.resolve_key(value, &options)?;

        let existing = self.storage.get(&key).cloned();
        if let Some(old) = existing {
            if !options.overwrite {
                return Err(StoreError::constraint(
                    format!("store {:?}", self.config.name),
                    key.to_string(),
                ));
            }
            let mut record = Record::new(key, value);
            record.tags.rev = old.tags.rev + 1;
            self.reindex(&old, &record)?;
            let position = self.storage.replace(record.clone())?;
            self.revision += 1;
            self.bump_generator(bump);
            Ok(MutationReport::Write {
                opcode: OpCode::Update,
                key: record.key,
                new_value: record.value,
                old_value: Some(old.value),
                old_rev: old.tags.rev,
                position,
                options,
            })
        } else {
            let record = Record::new(key, value);
            self.index_new(&record)?;
            let before = options.before.as_ref().map(|anchor| self.fold_key(anchor));
            let position = match self.storage.insert(record.clone(), before.as_deref()) {
                Ok(position) => position,
                Err(err) => {
                    // Splice refused (bad anchor): back the indexes out.
                    for index in &mut self.indexes {
                        index.remove(&record);
                    }
                    return Err(err);
                }
            };
            self.revision += 1;
            self.bump_generator(bump);
            Ok(MutationReport::Write {
                opcode: OpCode::New,
                key: record.key,
                new_value: record.value,
                old_value: None,
                old_rev: 0,
                position,
                options,
            })
        }
    }

    /// Stores many records with index bulk loading engaged.
    ///
    /// The batch is all-or-nothing: records land in a fork that only
    /// replaces this store once every write has been accepted. A failure
    /// part-way leaves the store exactly as it was.
    pub(crate) fn store_all(
        &mut self,
        values: Vec<Value>,
        options: &WriteOptions,
    ) -> StoreResult<Vec<MutationReport>> {
        let mut fork = self.fork();
        for index in &mut fork.indexes {
            index.begin_load();
        }
        let mut reports = Vec::with_capacity(values.len());
        for value in values {
            reports.push(fork.store_record(value, options.clone())?);
        }
        for index in &mut fork.indexes {
            index.end_load();
        }
        self.absorb(fork);
        Ok(reports)
    }

    /// Deletes every in-range record, one report per removal.
    ///
    /// Each record comes out of the indexes first and off the array after.
    pub(crate) fn delete_record(&mut self, range: &KeyRange) -> Vec<MutationReport> {
        let range = self.fold_range(range);
        let keys: Vec<Key> = self
            .storage
            .in_range_positions(range.as_ref())
            .into_iter()
            .map(|at| self.storage.records()[at].key.clone())
            .collect();

        let mut reports = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(record) = self.storage.get(&key) {
                for index in &mut self.indexes {
                    index.remove(record);
                }
            }
            if let Some((position, mut record)) = self.storage.remove(&key) {
                record.tags.stale = true;
                self.revision += 1;
                reports.push(MutationReport::Delete {
                    key: record.key,
                    old_value: record.value,
                    old_rev: record.tags.rev,
                    position,
                });
            }
        }
        reports
    }

    /// Empties the store and its indexes.
    pub(crate) fn clear_all(&mut self) -> MutationReport {
        let mut cleared = self.storage.clear();
        for record in &mut cleared {
            record.tags.stale = true;
        }
        for index in &mut self.indexes {
            index.clear();
        }
        self.revision += 1;
        self.generation += 1;
        MutationReport::Clear { cleared }
    }

    /// Adds a record to every index, backing out on first failure.
    fn index_new(&mut self, record: &Record) -> StoreResult<()> {
        for at in 0..self.indexes.len() {
            if let Err(err) = self.indexes[at].add(record) {
                for earlier in &mut self.indexes[..at] {
                    earlier.remove(record);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Swaps a record's index entries from `old` to `new`, restoring the
    /// old entries if any index refuses the new ones.
    fn reindex(&mut self, old: &Record, new: &Record) -> StoreResult<()> {
        for at in 0..self.indexes.len() {
            self.indexes[at].remove(old);
            if let Err(err) = self.indexes[at].add(new) {
                // Old entries were unique before, so re-adding cannot fail.
                let _ = self.indexes[at].add(old);
                for earlier in &mut self.indexes[..at] {
                    earlier.remove(new);
                    let _ = earlier.add(old);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Merges configured default fields into an object value.
    fn apply_defaults(&self, mut value: Value) -> Value {
        if let (Some(defaults), Some(map)) = (&self.config.defaults, value.as_object_mut()) {
            for (field, default) in defaults {
                if !map.contains_key(field) {
                    map.insert(field.clone(), default.clone());
                }
            }
        }
        value
    }

    /// Resolves the primary key for a write.
    ///
    /// Returns the key, the (possibly key-injected) value, and the
    /// generator value to adopt once the write succeeds.
    fn resolve_key(
        &self,
        mut value: Value,
        options: &WriteOptions,
    ) -> StoreResult<(Key, Value, Option<u64>)> {
        let key = match &self.config.key_path {
            Some(path) => {
                if options.key.is_some() {
                    return Err(StoreError::data(
                        "explicit key not allowed on a store with an in-line key path",
                    ));
                }
                match path.extract(&value) {
                    Some(key) => key.validated()?,
                    None if self.config.auto_increment => {
                        let key = Key::from(self.next_auto_key as i64);
                        if !path.inject(&mut value, &key) {
                            return Err(StoreError::data(
                                "generated key cannot be injected at the key path",
                            ));
                        }
                        key
                    }
                    None => {
                        return Err(StoreError::data(
                            "no key could be extracted from the value",
                        ));
                    }
                }
            }
            None => match &options.key {
                Some(key) => key.clone().validated()?,
                None if self.config.auto_increment => Key::from(self.next_auto_key as i64),
                None => {
                    return Err(StoreError::data(
                        "a key is required for a store without a key path",
                    ));
                }
            },
        };

        let key = match key {
            Key::String(s) if self.config.uppercase_keys => Key::String(s.to_uppercase()),
            other => other,
        };

        // The generator only moves once the write lands.
        let bump = match &key {
            Key::Number(n) if n.is_finite() && *n >= self.next_auto_key as f64 => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                Some((n.floor() as u64).saturating_add(1))
            }
            _ => None,
        };
        Ok((key, value, bump))
    }

    fn bump_generator(&mut self, bump: Option<u64>) {
        if let Some(next) = bump {
            self.next_auto_key = self.next_auto_key.max(next);
        }
    }
}
