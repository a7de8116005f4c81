//! Transaction - Unit of Atomicity
//!
//! Wraps a backend [`TxnHandle`] with the `open -> committed | discarded`
//! state machine:
//!
//! - `resolve`, `get`, `query`, `attach` and `commit` require `open`; on a
//!   closed transaction they fail with [`TransactionError::TransactionMisuse`]
//! - `commit` applies every attached mutation or none of them; any failure,
//!   conflict or fatal, leaves the transaction `discarded`
//! - `discard` is idempotent and always safe, including after `commit`
//! - dropping an open transaction discards it
//!
//! A transaction is owned by the task that opened it and is never shared.
//!
//! # Examples
//!
//! ```rust,no_run
//! use edgestore_core::db::{MemoryStore, StoreClient};
//! use edgestore_core::models::{MutationBuilder, MutationTarget, Predicate};
//!
//! # async fn example(store: MemoryStore) -> anyhow::Result<()> {
//! let mut txn = store.begin_transaction().await?;
//! if let Some(uid) = txn.resolve(&Predicate::eq("name", "Alice")).await? {
//!     let descriptor = MutationBuilder::new(MutationTarget::Existing(uid))
//!         .append("count", 1)
//!         .build(txn.schema())?;
//!     txn.attach(descriptor)?;
//!     txn.commit().await?;
//! }
//! txn.discard(); // no-op after commit
//! # Ok(())
//! # }
//! ```

use crate::db::{CommitReceipt, TxnHandle};
use crate::models::{Entity, MutationDescriptor, Predicate, PredicateSchema, Uid};
use crate::operations::CommitOutcome;
use crate::services::error::{TransactionError, TransactionState};
use crate::services::identity_resolver::resolve_identity;
use std::sync::Arc;

pub struct Transaction {
    handle: Option<Box<dyn TxnHandle>>,
    schema: Arc<PredicateSchema>,
    state: TransactionState,
    start_ts: u64,
    pending: Vec<MutationDescriptor>,
}

impl Transaction {
    /// Wrap an open backend handle; `schema` is the snapshot used for validation
    pub fn new(handle: Box<dyn TxnHandle>, schema: Arc<PredicateSchema>) -> Self {
        let start_ts = handle.start_ts();
        Self {
            handle: Some(handle),
            schema,
            state: TransactionState::Open,
            start_ts,
            pending: Vec::new(),
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn start_ts(&self) -> u64 {
        self.start_ts
    }

    pub fn schema(&self) -> &PredicateSchema {
        &self.schema
    }

    /// Mutations attached but not yet committed
    pub fn pending(&self) -> &[MutationDescriptor] {
        &self.pending
    }

    fn open_handle(
        &mut self,
        operation: &'static str,
    ) -> Result<&mut Box<dyn TxnHandle>, TransactionError> {
        let state = self.state;
        match self.handle.as_mut() {
            Some(handle) if state == TransactionState::Open => Ok(handle),
            _ => Err(TransactionError::misuse(operation, state)),
        }
    }

    /// Resolve `predicate` to at most one entity in this transaction's snapshot
    pub async fn resolve(&mut self, predicate: &Predicate) -> Result<Option<Uid>, TransactionError> {
        let schema = self.schema.clone();
        let handle = self.open_handle("resolve")?;
        resolve_identity(&mut **handle, &schema, predicate).await
    }

    /// Read one entity as of the snapshot
    pub async fn get(&mut self, uid: Uid) -> Result<Option<Entity>, TransactionError> {
        let handle = self.open_handle("read")?;
        Ok(handle.read(uid).await?)
    }

    /// Read every entity matching `predicate`, ordered by uid
    pub async fn query(&mut self, predicate: &Predicate) -> Result<Vec<Entity>, TransactionError> {
        predicate.validate(&self.schema)?;
        let handle = self.open_handle("query")?;

        let uids = handle.query(predicate).await?;
        let mut entities = Vec::with_capacity(uids.len());
        for uid in uids {
            if let Some(entity) = handle.read(uid).await? {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    /// Add a mutation to the pending set after validating it against the schema
    pub fn attach(&mut self, descriptor: MutationDescriptor) -> Result<(), TransactionError> {
        self.open_handle("attach")?;
        descriptor.validate(&self.schema)?;
        self.pending.push(descriptor);
        Ok(())
    }

    /// Atomically apply every pending mutation
    ///
    /// Suspends until the store decides. On success the transaction is
    /// `committed`; on any error (including a conflict) it is `discarded`
    /// and no effect is visible.
    pub async fn commit(&mut self) -> Result<CommitReceipt, TransactionError> {
        self.open_handle("commit")?;
        let mutations = std::mem::take(&mut self.pending);
        let start_ts = self.start_ts;
        let handle = self.open_handle("commit")?;

        let result = handle.commit(mutations).await.map_err(TransactionError::from);
        if let Some(mut handle) = self.handle.take() {
            handle.discard();
        }

        let outcome = CommitOutcome::of(&result);
        self.state = match outcome {
            CommitOutcome::Success => TransactionState::Committed,
            CommitOutcome::AbortedConflict | CommitOutcome::FatalError => {
                TransactionState::Discarded
            }
        };
        match &result {
            Ok(receipt) if receipt.is_read_only() => {
                tracing::debug!("Snapshot {} closed without writes", start_ts)
            }
            Ok(receipt) => {
                tracing::debug!("Snapshot {} committed at {}", start_ts, receipt.commit_ts)
            }
            Err(e) => tracing::debug!("Commit of snapshot {} {:?}: {}", start_ts, outcome, e),
        }
        result
    }

    /// Abandon the transaction, releasing its snapshot and pending mutations
    ///
    /// Idempotent: a no-op after `commit` or a previous `discard`.
    pub fn discard(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.discard();
        }
        self.pending.clear();
        if self.state == TransactionState::Open {
            self.state = TransactionState::Discarded;
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state == TransactionState::Open {
            tracing::debug!("Discarding open transaction {} on drop", self.start_ts);
            self.discard();
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("start_ts", &self.start_ts)
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .finish()
    }
}
