//! Upsert Service - Update-or-Create by Predicate
//!
//! Each attempt is one retry unit: open a transaction, resolve the predicate
//! inside it, build the mutation for the resolved entity (or a new one),
//! attach and commit. A conflict throws the whole unit away and
//! [`RetryPolicy`] runs it again from a fresh snapshot.
//!
//! Creation is race-free: a writer that found no match has the predicate's
//! index entry in its read set, and the winner that created the entity
//! writes that same entry, so a concurrent creator aborts instead of
//! producing a duplicate.

use crate::db::{CommitReceipt, StoreClient, StoreError};
use crate::models::{Entity, FieldDelta, MutationBuilder, MutationTarget, Predicate, Uid};
use crate::operations::RetryPolicy;
use crate::services::error::TransactionError;
use serde::Serialize;
use std::sync::Arc;

/// Blank label for the entity created by an upsert that matched nothing
pub const UPSERT_LABEL: &str = "upsert";

/// Final state of a successful upsert
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpsertOutcome {
    pub uid: Uid,
    /// Whether the entity was created by this upsert
    pub created: bool,
    pub commit_ts: u64,
    pub attempts: usize,
    /// Entity as read back after the commit
    pub state: Entity,
}

/// Result of one committed attempt, before the read-back
struct Applied {
    uid: Uid,
    created: bool,
    receipt: CommitReceipt,
}

/// Upsert-by-predicate over a shared store client
///
/// The client is shared by every writer; each call owns its transactions.
#[derive(Clone)]
pub struct UpsertService {
    client: Arc<dyn StoreClient>,
}

impl UpsertService {
    pub fn new(client: Arc<dyn StoreClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<dyn StoreClient> {
        &self.client
    }

    /// Apply `delta` to the entity matched by `predicate`, creating it if absent
    ///
    /// For an `eq` predicate a created entity also gets the predicate's
    /// field set, so the next upsert with the same predicate finds it. A
    /// `uid` predicate never creates: a missing uid is `EntityNotFound`.
    ///
    /// # Errors
    ///
    /// - `SchemaViolation`, `AmbiguousMatch`, `EntityNotFound`: returned on the
    ///   first attempt, never retried
    /// - `RetryBudgetExhausted`: every allowed attempt lost to a conflict
    /// - `ReadBackFailed`: the commit succeeded but the entity could not be
    ///   read afterwards; the error carries the committed uid
    pub async fn upsert(
        &self,
        predicate: &Predicate,
        delta: &FieldDelta,
        policy: &RetryPolicy,
    ) -> Result<UpsertOutcome, TransactionError> {
        self.upsert_counted(predicate, delta, policy).await.0
    }

    /// Like [`upsert`](Self::upsert) but also reports how many attempts ran,
    /// including when the upsert failed
    pub(crate) async fn upsert_counted(
        &self,
        predicate: &Predicate,
        delta: &FieldDelta,
        policy: &RetryPolicy,
    ) -> (Result<UpsertOutcome, TransactionError>, usize) {
        let mut attempts = 0;
        let counter = &mut attempts;
        let result = policy
            .run(move |attempt| {
                *counter = attempt;
                self.upsert_once(predicate, delta)
            })
            .await;

        let outcome = match result {
            Ok(retried) => self.read_back(retried.value, retried.attempts).await,
            Err(e) => Err(e),
        };
        (outcome, attempts)
    }

    async fn upsert_once(
        &self,
        predicate: &Predicate,
        delta: &FieldDelta,
    ) -> Result<Applied, TransactionError> {
        let mut txn = self.client.begin_transaction().await?;

        let resolved = txn.resolve(predicate).await?;
        let (target, created) = match (resolved, predicate) {
            (Some(uid), _) => (MutationTarget::Existing(uid), false),
            (None, Predicate::Uid { uid }) => {
                return Err(TransactionError::EntityNotFound { uid: *uid })
            }
            (None, Predicate::Eq { .. }) => (MutationTarget::blank(UPSERT_LABEL), true),
        };

        let mut builder = MutationBuilder::new(target);
        if let (true, Predicate::Eq { field, value }) = (created, predicate) {
            builder = builder.set(field.clone(), value.clone());
        }
        let descriptor = builder.with_delta(delta).build(txn.schema())?;
        txn.attach(descriptor)?;

        let receipt = txn.commit().await?;
        let uid = match resolved {
            Some(uid) => uid,
            None => *receipt.uids.get(UPSERT_LABEL).ok_or_else(|| {
                TransactionError::Store(StoreError::internal(
                    "commit did not allocate a uid for the created entity",
                ))
            })?,
        };

        tracing::debug!(
            "Upsert {} {} at commit {}",
            if created { "created" } else { "updated" },
            uid,
            receipt.commit_ts
        );
        Ok(Applied {
            uid,
            created,
            receipt,
        })
    }

    async fn read_back(
        &self,
        applied: Applied,
        attempts: usize,
    ) -> Result<UpsertOutcome, TransactionError> {
        match self.fetch(applied.uid).await {
            Ok(state) => Ok(UpsertOutcome {
                uid: applied.uid,
                created: applied.created,
                commit_ts: applied.receipt.commit_ts,
                attempts,
                state,
            }),
            Err(e) => {
                tracing::warn!("Upsert of {} committed but read-back failed: {}", applied.uid, e);
                Err(TransactionError::ReadBackFailed {
                    uid: applied.uid,
                    created: applied.created,
                    commit_ts: applied.receipt.commit_ts,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn fetch(&self, uid: Uid) -> Result<Entity, TransactionError> {
        let mut txn = self.client.begin_transaction().await?;
        let state = txn
            .get(uid)
            .await?
            .ok_or(TransactionError::EntityNotFound { uid })?;
        txn.discard();
        Ok(state)
    }
}

impl std::fmt::Debug for UpsertService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpsertService").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, TxnHandle};
    use crate::models::{FieldValue, PredicateSchema, SchemaError};
    use crate::services::{run_concurrent_upsert_scenario, ExecutionMode, ScenarioSpec, WriterStatus};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store whose `begin` fails exactly once, on the call numbered `fail_on`
    struct FlakyBegin {
        inner: MemoryStore,
        begins: AtomicUsize,
        fail_on: usize,
    }

    #[async_trait]
    impl StoreClient for FlakyBegin {
        async fn apply_schema(&self, schema: PredicateSchema) -> Result<(), SchemaError> {
            self.inner.apply_schema(schema).await
        }

        async fn schema(&self) -> Result<Arc<PredicateSchema>, StoreError> {
            self.inner.schema().await
        }

        async fn begin(&self) -> Result<Box<dyn TxnHandle>, StoreError> {
            if self.begins.fetch_add(1, Ordering::SeqCst) == self.fail_on {
                return Err(StoreError::unavailable("replica offline"));
            }
            self.inner.begin().await
        }

        async fn reset_all(&self) -> Result<(), StoreError> {
            self.inner.reset_all().await
        }
    }

    fn flaky_service(store: &MemoryStore, fail_on: usize) -> UpsertService {
        UpsertService::new(Arc::new(FlakyBegin {
            inner: store.clone(),
            begins: AtomicUsize::new(0),
            fail_on,
        }))
    }

    async fn service() -> (MemoryStore, UpsertService) {
        let store = MemoryStore::new();
        store
            .apply_schema(
                "name: string @index(exact) .\ncount: [int] .\nage: int ."
                    .parse()
                    .unwrap(),
            )
            .await
            .unwrap();
        let service = UpsertService::new(Arc::new(store.clone()));
        (store, service)
    }

    #[tokio::test]
    async fn test_upsert_creates_then_updates() {
        let (store, service) = service().await;
        let alice = Predicate::eq("name", "Alice");
        let policy = RetryPolicy::bounded(3);

        let first = service
            .upsert(&alice, &FieldDelta::new().append("count", 1), &policy)
            .await
            .unwrap();
        assert!(first.created);
        assert_eq!(first.attempts, 1);
        assert_eq!(
            first.state.scalar("name"),
            Some(&FieldValue::String("Alice".to_string()))
        );

        let second = service
            .upsert(&alice, &FieldDelta::new().append("count", 2), &policy)
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.uid, first.uid);
        assert_eq!(
            second.state.list("count"),
            &[FieldValue::Int(1), FieldValue::Int(2)]
        );
        assert_eq!(store.entity_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_read_back_failure_reports_committed_uid() {
        let (store, _) = service().await;
        // Call 0 is the upsert attempt, call 1 the read-back
        let service = flaky_service(&store, 1);

        let err = service
            .upsert(
                &Predicate::eq("name", "Alice"),
                &FieldDelta::new().append("count", 1),
                &RetryPolicy::bounded(3),
            )
            .await
            .unwrap_err();

        let uid = match err {
            TransactionError::ReadBackFailed {
                uid,
                created,
                commit_ts,
                ..
            } => {
                assert!(created);
                assert_eq!(commit_ts, 1);
                uid
            }
            other => panic!("Expected ReadBackFailed, got {:?}", other),
        };
        let mut txn = store.begin_transaction().await.unwrap();
        let entity = txn.get(uid).await.unwrap().expect("commit should be visible");
        assert_eq!(entity.list("count"), &[FieldValue::Int(1)]);
    }

    #[tokio::test]
    async fn test_scenario_counts_unreadable_commit_as_committed() {
        let (store, _) = service().await;
        let service = Arc::new(flaky_service(&store, 1));

        let spec = ScenarioSpec::new(Predicate::eq("name", "Alice"), "count")
            .with_writers(1)
            .with_mode(ExecutionMode::Sequential);
        let report = run_concurrent_upsert_scenario(service, &spec).await.unwrap();

        assert_eq!(report.succeeded(), 1);
        assert!(matches!(
            report.per_writer[0].status,
            WriterStatus::Committed { created: true, .. }
        ));
        assert_eq!(report.observed_values(), vec![&FieldValue::Int(0)]);
    }

    #[tokio::test]
    async fn test_upsert_by_missing_uid_is_not_found() {
        let (_store, service) = service().await;
        let missing = Uid::allocate();

        let err = service
            .upsert(
                &Predicate::uid(missing),
                &FieldDelta::new().set("age", 3),
                &RetryPolicy::unbounded(),
            )
            .await
            .unwrap_err();
        assert_eq!(err, TransactionError::EntityNotFound { uid: missing });
    }

    #[tokio::test]
    async fn test_schema_violation_runs_once() {
        let (store, service) = service().await;

        let (result, attempts) = service
            .upsert_counted(
                &Predicate::eq("name", "Alice"),
                &FieldDelta::new().set("age", "old"),
                &RetryPolicy::unbounded(),
            )
            .await;
        assert!(matches!(result, Err(TransactionError::SchemaViolation(_))));
        assert_eq!(attempts, 1);
        assert_eq!(store.entity_count().unwrap(), 0);
    }
}
