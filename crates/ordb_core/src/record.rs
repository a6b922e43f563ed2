//! Stored records.

use crate::key::{Key, Keyed};
use crate::value::Value;

/// Bookkeeping carried by every stored record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordTags {
    /// Revision of this record: 0 at insert, +1 per overwrite.
    pub rev: u64,
    /// Set once the record has been superseded or evicted.
    pub stale: bool,
}

/// A primary key paired with its stored value.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Primary key.
    pub key: Key,
    /// Stored value.
    pub value: Value,
    /// Revision and liveness tags.
    pub tags: RecordTags,
}

impl Record {
    /// Creates a fresh record at revision zero.
    pub fn new(key: Key, value: Value) -> Self {
        Self {
            key,
            value,
            tags: RecordTags::default(),
        }
    }
}

impl Keyed for Record {
    fn sort_key(&self) -> &Key {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_records_start_at_revision_zero() {
        let record = Record::new(Key::from(1), Value::from("a"));
        assert_eq!(record.tags.rev, 0);
        assert!(!record.tags.stale);
        assert_eq!(record.sort_key(), &Key::from(1));
    }
}
