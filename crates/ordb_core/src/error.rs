//! Error types for OrdDB core.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in OrdDB operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A key or value failed validation.
    #[error("data error: {message}")]
    Data {
        /// Description of the validation failure.
        message: String,
    },

    /// A uniqueness constraint was violated.
    #[error("constraint violation on {scope}: key already exists: {key}")]
    Constraint {
        /// Store or index the violation occurred in.
        scope: String,
        /// Rendering of the conflicting key.
        key: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// A named store or index does not exist.
    #[error("not found: {kind} {name}")]
    NotFound {
        /// What was looked up ("store" or "index").
        kind: &'static str,
        /// Name that was not found.
        name: String,
    },

    /// Operation attempted on a transaction that is no longer active.
    #[error("transaction inactive: {message}")]
    TransactionInactive {
        /// Description of the attempted operation.
        message: String,
    },

    /// Write attempted through a read-only transaction.
    #[error("read-only transaction: {message}")]
    ReadOnly {
        /// Description of the attempted write.
        message: String,
    },

    /// A queued transaction was not scheduled before its deadline.
    #[error("transaction timed out after {waited_ms} ms while pending")]
    Timeout {
        /// Milliseconds spent in the pending queue.
        waited_ms: u64,
    },
}

impl StoreError {
    /// Creates a data validation error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data {
            message: message.into(),
        }
    }

    /// Creates a uniqueness constraint error.
    pub fn constraint(scope: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Constraint {
            scope: scope.into(),
            key: key.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates a store-not-found error.
    pub fn store_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "store",
            name: name.into(),
        }
    }

    /// Creates an index-not-found error.
    pub fn index_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "index",
            name: name.into(),
        }
    }

    /// Creates a transaction inactive error.
    pub fn transaction_inactive(message: impl Into<String>) -> Self {
        Self::TransactionInactive {
            message: message.into(),
        }
    }

    /// Creates a read-only transaction error.
    pub fn read_only(message: impl Into<String>) -> Self {
        Self::ReadOnly {
            message: message.into(),
        }
    }

    /// Returns `true` if this error is a uniqueness constraint violation.
    #[must_use]
    pub fn is_constraint(&self) -> bool {
        matches!(self, Self::Constraint { .. })
    }

    /// Returns `true` if this error is a data validation failure.
    #[must_use]
    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data { .. })
    }
}
