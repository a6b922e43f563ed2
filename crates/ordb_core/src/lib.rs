//! # OrdDB Core
//!
//! Embedded, in-process ordered data store.
//!
//! This crate provides:
//! - Uniquely-keyed records kept in primary-key order or insertion order
//! - Secondary indexes, including unique and multi-entry flavors
//! - Range-bounded cursors over stores and indexes
//! - Scope-scheduled transactions with copy-on-write isolation
//! - A change feed replaying committed mutations in order
//!
//! Everything runs in the calling thread; there is no I/O and nothing
//! persists. OrdDB is the storage layer for higher-level query and
//! observation layers, not a full database.
//!
//! ## Usage
//!
//! ```
//! use ordb_core::{Database, KeyPath, StoreConfig, TxMode, Value};
//!
//! let db = Database::new();
//! db.create_store(StoreConfig::new("users").key_path(KeyPath::single("id")))
//!     .unwrap();
//!
//! let users = db.store("users").unwrap();
//! users
//!     .put(Value::object([("id", Value::from(2)), ("name", Value::from("brin"))]))
//!     .unwrap();
//! users
//!     .put(Value::object([("id", Value::from(1)), ("name", Value::from("ada"))]))
//!     .unwrap();
//!
//! // Records come back in key order regardless of insertion order.
//! let names: Vec<_> = users.get_all(None, None).unwrap();
//! assert_eq!(names.len(), 2);
//!
//! // Transactions apply all-or-nothing.
//! db.transaction(&["users"], TxMode::ReadWrite, |tx| {
//!     tx.store("users")?.remove(1)?;
//!     Ok(())
//! })
//! .unwrap();
//! assert_eq!(users.len().unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod cursor;
mod database;
mod error;
mod handle;
mod index;
pub mod key;
mod notify;
mod record;
mod stats;
mod store;
mod transaction;
mod value;

pub use config::{IndexConfig, StoreConfig, StoreOrdering, WriteOptions};
pub use cursor::{Cursor, Direction};
pub use database::Database;
pub use error::{StoreError, StoreResult};
pub use handle::{IndexHandle, StoreHandle};
pub use key::{Key, KeyPath, KeyRange};
pub use notify::{ChangeEvent, ChangeFeed, OpCode};
pub use record::{Record, RecordTags};
pub use stats::StatsSnapshot;
pub use transaction::{CommitHook, JournalEntry, TxHandle, TxId, TxMode, TxState};
pub use value::Value;
