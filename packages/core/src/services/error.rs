//! Transaction Error Types
//!
//! Error taxonomy for the transaction layer. Only
//! [`TransactionError::ConflictAborted`] is retryable; every other kind is
//! fatal for the attempt that raised it and is surfaced to the caller as is.

use crate::db::StoreError;
use crate::models::{SchemaViolation, Uid};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Lifecycle state of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionState {
    Open,
    Committed,
    Discarded,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Open => f.write_str("open"),
            TransactionState::Committed => f.write_str("committed"),
            TransactionState::Discarded => f.write_str("discarded"),
        }
    }
}

/// Serializable error classification used in scenario reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SchemaViolation,
    AmbiguousMatch,
    ConflictAborted,
    RetryBudgetExhausted,
    TransactionMisuse,
    EntityNotFound,
    ReadBackFailed,
    Store,
    /// Writer task died without producing an outcome
    Internal,
}

/// Transaction layer errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransactionError {
    /// A value or predicate does not fit the schema (fatal)
    #[error(transparent)]
    SchemaViolation(#[from] SchemaViolation),

    /// The identity predicate matched more than one entity (fatal)
    #[error("Predicate {predicate} matched {matches} entities, expected at most one")]
    AmbiguousMatch { predicate: String, matches: usize },

    /// Commit lost to a concurrent writer; nothing was applied (retryable)
    #[error("Transaction aborted on conflict: {reason}")]
    ConflictAborted { reason: String },

    /// Conflicts persisted through every allowed attempt (terminal)
    #[error("Retry budget exhausted after {attempts} attempt(s): {last_conflict}")]
    RetryBudgetExhausted {
        attempts: usize,
        last_conflict: String,
    },

    /// Operation on a closed transaction; indicates a caller bug (fatal)
    #[error("Cannot {operation} a {state} transaction")]
    TransactionMisuse {
        operation: &'static str,
        state: TransactionState,
    },

    /// Mutation or lookup addressed a uid that does not exist (fatal)
    #[error("Entity {uid} does not exist")]
    EntityNotFound { uid: Uid },

    /// The upsert committed but its entity could not be read back
    #[error("Committed {uid} at {commit_ts} but read-back failed: {reason}")]
    ReadBackFailed {
        uid: Uid,
        created: bool,
        commit_ts: u64,
        reason: String,
    },

    /// Any other store failure (fatal)
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl TransactionError {
    pub fn ambiguous_match(predicate: impl ToString, matches: usize) -> Self {
        Self::AmbiguousMatch {
            predicate: predicate.to_string(),
            matches,
        }
    }

    pub fn conflict_aborted(reason: impl Into<String>) -> Self {
        Self::ConflictAborted {
            reason: reason.into(),
        }
    }

    pub fn retry_budget_exhausted(attempts: usize, last_conflict: impl Into<String>) -> Self {
        Self::RetryBudgetExhausted {
            attempts,
            last_conflict: last_conflict.into(),
        }
    }

    pub fn misuse(operation: &'static str, state: TransactionState) -> Self {
        Self::TransactionMisuse { operation, state }
    }

    /// Whether re-running the whole resolve/mutate/commit unit may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransactionError::ConflictAborted { .. })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TransactionError::SchemaViolation(_) => ErrorKind::SchemaViolation,
            TransactionError::AmbiguousMatch { .. } => ErrorKind::AmbiguousMatch,
            TransactionError::ConflictAborted { .. } => ErrorKind::ConflictAborted,
            TransactionError::RetryBudgetExhausted { .. } => ErrorKind::RetryBudgetExhausted,
            TransactionError::TransactionMisuse { .. } => ErrorKind::TransactionMisuse,
            TransactionError::EntityNotFound { .. } => ErrorKind::EntityNotFound,
            TransactionError::ReadBackFailed { .. } => ErrorKind::ReadBackFailed,
            TransactionError::Store(_) => ErrorKind::Store,
        }
    }
}

impl From<StoreError> for TransactionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } => Self::conflict_aborted(err.to_string()),
            StoreError::EntityNotFound { uid } => Self::EntityNotFound { uid },
            StoreError::UnknownPredicate { field } => {
                Self::SchemaViolation(SchemaViolation::unknown_field(field))
            }
            StoreError::UnindexedPredicate { field } => Self::SchemaViolation(
                SchemaViolation::new(field, "predicate is not indexed"),
            ),
            other => Self::Store(other),
        }
    }
}
