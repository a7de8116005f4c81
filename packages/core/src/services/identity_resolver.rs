//! Identity Resolver
//!
//! Runs an identity lookup inside the transaction that will later mutate, so
//! resolution and mutation observe the same snapshot. The lookup extends the
//! transaction's read set; a concurrent commit that changes the match makes
//! this transaction's commit abort.
//!
//! A predicate matching more than one entity is rejected with
//! [`TransactionError::AmbiguousMatch`]: the schema only declares an exact
//! index, not uniqueness, so picking one candidate would silently write to an
//! arbitrary entity.

use crate::db::TxnHandle;
use crate::models::{Predicate, PredicateSchema, Uid};
use crate::services::error::TransactionError;

/// Resolve `predicate` to at most one uid within `handle`'s snapshot
pub async fn resolve_identity(
    handle: &mut dyn TxnHandle,
    schema: &PredicateSchema,
    predicate: &Predicate,
) -> Result<Option<Uid>, TransactionError> {
    predicate.validate(schema)?;

    let matches = handle.query(predicate).await?;
    match matches.as_slice() {
        [] => {
            tracing::debug!("{} resolved to no entity", predicate);
            Ok(None)
        }
        [uid] => {
            tracing::debug!("{} resolved to {}", predicate, uid);
            Ok(Some(*uid))
        }
        many => Err(TransactionError::ambiguous_match(predicate, many.len())),
    }
}
