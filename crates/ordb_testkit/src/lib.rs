//! # OrdDB Testkit
//!
//! Test utilities for OrdDB.
//!
//! This crate provides:
//! - Store and database fixtures with common shapes pre-configured
//! - A model-tracking store harness for randomized testing
//! - Property-based test generators using proptest
//! - Invariant checkers that audit live stores through the public API
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ordb_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_store() {
//!     with_users_db(|db| {
//!         let users = db.store("users").unwrap();
//!         users.put(user(1, "ada")).unwrap();
//!         assert_key_order(&users);
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod invariants;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::invariants::*;
}

pub use fixtures::*;
pub use generators::*;
pub use invariants::*;
