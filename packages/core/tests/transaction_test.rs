//! Transaction Tests
//!
//! Covers the transaction state machine and the isolation guarantees of the
//! in-memory store: all-or-nothing commits, no dirty reads, idempotent
//! discard and misuse of closed transactions.

#[cfg(test)]
mod transaction_tests {
    use anyhow::Result;
    use edgestore_core::db::{MemoryStore, StoreClient};
    use edgestore_core::models::{
        FieldValue, MutationBuilder, MutationTarget, Predicate, PredicateSchema, Uid,
    };
    use edgestore_core::operations::CommitOutcome;
    use edgestore_core::services::{ErrorKind, TransactionError, TransactionState};

    const SCHEMA: &str = "
        name: string @index(exact) .
        email: string @index(exact) .
        count: [int] .
    ";

    /// Helper to create a store with the schema applied
    async fn create_test_store() -> Result<MemoryStore> {
        let store = MemoryStore::new();
        store.apply_schema(SCHEMA.parse()?).await?;
        Ok(store)
    }

    /// Helper to commit a new entity with the given name
    async fn seed(store: &MemoryStore, name: &str) -> Result<Uid> {
        let mut txn = store.begin_transaction().await?;
        let descriptor = MutationBuilder::new(MutationTarget::blank("seed"))
            .set("name", name)
            .build(txn.schema())?;
        txn.attach(descriptor)?;
        let receipt = txn.commit().await?;
        Ok(receipt.uids["seed"])
    }

    #[tokio::test]
    async fn test_commit_applies_every_mutation() -> Result<()> {
        let store = create_test_store().await?;
        let alice = seed(&store, "Alice").await?;

        let mut txn = store.begin_transaction().await?;
        let update = MutationBuilder::new(MutationTarget::Existing(alice))
            .append("count", 1)
            .build(txn.schema())?;
        let create = MutationBuilder::new(MutationTarget::blank("bob"))
            .set("name", "Bob")
            .build(txn.schema())?;
        txn.attach(update)?;
        txn.attach(create)?;
        let receipt = txn.commit().await?;

        assert_eq!(txn.state(), TransactionState::Committed);
        assert!(!receipt.is_read_only());
        assert_eq!(receipt.touched.len(), 2);
        assert!(receipt.commit_ts > receipt.start_ts);

        let mut check = store.begin_transaction().await?;
        let bob = check.resolve(&Predicate::eq("name", "Bob")).await?;
        assert_eq!(bob, Some(receipt.uids["bob"]));
        let entity = check.get(alice).await?.expect("Alice should exist");
        assert_eq!(entity.list("count"), &[FieldValue::Int(1)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_commit_applies_nothing() -> Result<()> {
        let store = create_test_store().await?;
        let missing = Uid::allocate();

        let mut txn = store.begin_transaction().await?;
        let create = MutationBuilder::new(MutationTarget::blank("carol"))
            .set("name", "Carol")
            .build(txn.schema())?;
        let update = MutationBuilder::new(MutationTarget::Existing(missing))
            .append("count", 1)
            .build(txn.schema())?;
        txn.attach(create)?;
        txn.attach(update)?;

        let err = txn.commit().await.unwrap_err();
        assert_eq!(err, TransactionError::EntityNotFound { uid: missing });
        assert_eq!(txn.state(), TransactionState::Discarded);

        // The valid half must not be visible either
        assert_eq!(store.entity_count()?, 0);

        let metrics = store.metrics();
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.open(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_conflicting_commit_is_aborted_without_effect() -> Result<()> {
        let store = create_test_store().await?;
        let alice = seed(&store, "Alice").await?;

        let mut first = store.begin_transaction().await?;
        let mut second = store.begin_transaction().await?;
        assert_eq!(first.resolve(&Predicate::eq("name", "Alice")).await?, Some(alice));
        assert_eq!(second.resolve(&Predicate::eq("name", "Alice")).await?, Some(alice));

        let winner = MutationBuilder::new(MutationTarget::Existing(alice))
            .append("count", 1)
            .build(first.schema())?;
        first.attach(winner)?;
        first.commit().await?;

        let loser = MutationBuilder::new(MutationTarget::Existing(alice))
            .append("count", 2)
            .build(second.schema())?;
        let side_effect = MutationBuilder::new(MutationTarget::blank("dave"))
            .set("name", "Dave")
            .build(second.schema())?;
        second.attach(loser)?;
        second.attach(side_effect)?;

        let result = second.commit().await;
        assert_eq!(CommitOutcome::of(&result), CommitOutcome::AbortedConflict);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConflictAborted);
        assert!(err.is_retryable());
        assert_eq!(second.state(), TransactionState::Discarded);

        let mut check = store.begin_transaction().await?;
        let entity = check.get(alice).await?.expect("Alice should exist");
        assert_eq!(entity.list("count"), &[FieldValue::Int(1)]);
        assert!(check.resolve(&Predicate::eq("name", "Dave")).await?.is_none());
        assert_eq!(store.metrics().conflicts, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_resolver_never_sees_uncommitted_mutations() -> Result<()> {
        let store = create_test_store().await?;

        let mut writer = store.begin_transaction().await?;
        let create = MutationBuilder::new(MutationTarget::blank("eve"))
            .set("name", "Eve")
            .build(writer.schema())?;
        writer.attach(create)?;

        let mut reader = store.begin_transaction().await?;
        assert!(reader.resolve(&Predicate::eq("name", "Eve")).await?.is_none());

        writer.commit().await?;

        // Still invisible: the reader's snapshot predates the commit
        assert!(reader.resolve(&Predicate::eq("name", "Eve")).await?.is_none());
        reader.discard();

        let mut fresh = store.begin_transaction().await?;
        assert!(fresh.resolve(&Predicate::eq("name", "Eve")).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_discard_is_idempotent() -> Result<()> {
        let store = create_test_store().await?;

        let mut committed = store.begin_transaction().await?;
        let receipt = committed.commit().await?;
        assert!(receipt.is_read_only());
        assert_eq!(receipt.commit_ts, receipt.start_ts);
        committed.discard();
        committed.discard();
        assert_eq!(committed.state(), TransactionState::Committed);

        let mut discarded = store.begin_transaction().await?;
        discarded.discard();
        discarded.discard();
        assert_eq!(discarded.state(), TransactionState::Discarded);

        assert_eq!(store.metrics().discarded, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_operations_on_closed_transaction_are_misuse() -> Result<()> {
        let store = create_test_store().await?;

        let mut txn = store.begin_transaction().await?;
        txn.commit().await?;

        let descriptor = MutationBuilder::new(MutationTarget::blank("x"))
            .set("name", "X")
            .build(txn.schema())?;
        let err = txn.attach(descriptor).unwrap_err();
        assert_eq!(
            err,
            TransactionError::misuse("attach", TransactionState::Committed)
        );
        assert_eq!(err.kind(), ErrorKind::TransactionMisuse);

        let err = txn.commit().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransactionMisuse);

        let mut txn = store.begin_transaction().await?;
        txn.discard();
        let err = txn
            .resolve(&Predicate::eq("name", "Alice"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransactionError::misuse("resolve", TransactionState::Discarded)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_attach_rejects_descriptor_outside_schema() -> Result<()> {
        let store = create_test_store().await?;
        let loose: PredicateSchema = "name: string @index(exact) .\nage: int .".parse()?;

        let mut txn = store.begin_transaction().await?;
        let descriptor = MutationBuilder::new(MutationTarget::blank("x"))
            .set("age", 3)
            .build(&loose)?;

        let err = txn.attach(descriptor).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);
        assert_eq!(txn.state(), TransactionState::Open);
        assert!(txn.pending().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_rejects_unindexed_predicate() -> Result<()> {
        let store = create_test_store().await?;

        let mut txn = store.begin_transaction().await?;
        let err = txn
            .resolve(&Predicate::eq("count", 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);
        Ok(())
    }

    #[tokio::test]
    async fn test_ambiguous_match_is_rejected() -> Result<()> {
        let store = create_test_store().await?;
        seed(&store, "Alice").await?;
        seed(&store, "Alice").await?;

        let mut txn = store.begin_transaction().await?;
        let err = txn
            .resolve(&Predicate::eq("name", "Alice"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousMatch);
        assert!(!err.is_retryable());

        // query still lists every match, ordered by uid
        let matches = txn.query(&Predicate::eq("name", "Alice")).await?;
        assert_eq!(matches.len(), 2);
        assert!(matches[0].uid < matches[1].uid);
        Ok(())
    }

    #[tokio::test]
    async fn test_drop_discards_open_transaction() -> Result<()> {
        let store = create_test_store().await?;

        {
            let mut txn = store.begin_transaction().await?;
            let descriptor = MutationBuilder::new(MutationTarget::blank("x"))
                .set("name", "Dropped")
                .build(txn.schema())?;
            txn.attach(descriptor)?;
        }

        assert_eq!(store.metrics().discarded, 1);
        assert_eq!(store.entity_count()?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_blank_labels_share_one_entity() -> Result<()> {
        let store = create_test_store().await?;

        let mut txn = store.begin_transaction().await?;
        let name = MutationBuilder::new(MutationTarget::blank("frank"))
            .set("name", "Frank")
            .build(txn.schema())?;
        let email = MutationBuilder::new(MutationTarget::blank("frank"))
            .set("email", "frank@example.com")
            .build(txn.schema())?;
        txn.attach(name)?;
        txn.attach(email)?;
        let receipt = txn.commit().await?;

        assert_eq!(receipt.uids.len(), 1);
        assert_eq!(store.entity_count()?, 1);

        let mut check = store.begin_transaction().await?;
        let by_email = check
            .resolve(&Predicate::eq("email", "frank@example.com"))
            .await?;
        assert_eq!(by_email, Some(receipt.uids["frank"]));
        Ok(())
    }
}
