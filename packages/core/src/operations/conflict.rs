//! Commit outcome classification

use crate::db::CommitReceipt;
use crate::services::TransactionError;
use serde::Serialize;

/// Tag for a single commit attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitOutcome {
    Success,
    /// Lost to a concurrent writer; no effect is observable
    AbortedConflict,
    FatalError,
}

impl CommitOutcome {
    pub fn of(result: &Result<CommitReceipt, TransactionError>) -> Self {
        match result {
            Ok(_) => CommitOutcome::Success,
            Err(e) if e.is_retryable() => CommitOutcome::AbortedConflict,
            Err(_) => CommitOutcome::FatalError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Uid;

    #[test]
    fn test_classification() {
        let conflict: Result<CommitReceipt, _> =
            Err(TransactionError::conflict_aborted("count@x"));
        assert_eq!(CommitOutcome::of(&conflict), CommitOutcome::AbortedConflict);

        let fatal: Result<CommitReceipt, _> = Err(TransactionError::EntityNotFound {
            uid: Uid::allocate(),
        });
        assert_eq!(CommitOutcome::of(&fatal), CommitOutcome::FatalError);

        let exhausted: Result<CommitReceipt, _> =
            Err(TransactionError::retry_budget_exhausted(2, "count@x"));
        assert_eq!(CommitOutcome::of(&exhausted), CommitOutcome::FatalError);
    }
}
