//! Store Error Types
//!
//! Errors surfaced by a store backend. Only [`StoreError::Conflict`] is
//! transient; everything else is fatal for the transaction that hit it.

use crate::models::Uid;
use thiserror::Error;

/// Store operation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Commit aborted because a concurrent transaction committed an
    /// overlapping write after this transaction's snapshot
    #[error("Transaction at snapshot {start_ts} aborted: conflicting write on {key}")]
    Conflict { start_ts: u64, key: String },

    /// Field is not declared in the applied schema
    #[error("Unknown predicate: {field}")]
    UnknownPredicate { field: String },

    /// Equality lookup on a field without an exact index
    #[error("Predicate '{field}' is not indexed")]
    UnindexedPredicate { field: String },

    /// Mutation addressed to an entity that does not exist
    #[error("Entity {uid} does not exist")]
    EntityNotFound { uid: Uid },

    /// Store cannot serve requests
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Internal store failure (poisoned lock, broken invariant)
    #[error("Internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn conflict(start_ts: u64, key: impl Into<String>) -> Self {
        Self::Conflict {
            start_ts,
            key: key.into(),
        }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_display() {
        let err = StoreError::conflict(7, "count@x");
        assert!(err.is_conflict());
        assert_eq!(
            err.to_string(),
            "Transaction at snapshot 7 aborted: conflicting write on count@x"
        );
    }

    #[test]
    fn test_non_conflicts_are_not_retryable() {
        assert!(!StoreError::unavailable("down").is_conflict());
        assert!(!StoreError::internal("poisoned").is_conflict());
    }
}
