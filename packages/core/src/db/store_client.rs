//! StoreClient Trait - Store Abstraction Layer
//!
//! This module defines the capability surface the transaction layer consumes.
//! Any backend (the in-process [`MemoryStore`](crate::db::MemoryStore), a
//! remote cluster client) plugs in behind these two traits without changing
//! the upsert logic.
//!
//! # Architecture
//!
//! - **`StoreClient`**: shared, `Send + Sync`, safe for concurrent use by many
//!   writer tasks. Applies the schema, opens transactions, resets state.
//! - **`TxnHandle`**: one backend transaction, owned by exactly one task.
//!   Reads from a fixed snapshot and records the read set; commit validates
//!   that read set and the write set against later commits.
//!
//! The open/committed/discarded state machine lives in
//! [`Transaction`](crate::services::Transaction), which wraps a handle.
//!
//! # Examples
//!
//! ```rust,no_run
//! use edgestore_core::db::{MemoryStore, StoreClient};
//! use edgestore_core::models::Predicate;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = MemoryStore::new();
//!     store
//!         .apply_schema("name: string @index(exact) .".parse()?)
//!         .await?;
//!
//!     let mut txn = store.begin_transaction().await?;
//!     let alice = txn.resolve(&Predicate::eq("name", "Alice")).await?;
//!     assert!(alice.is_none());
//!     txn.discard();
//!     Ok(())
//! }
//! ```

use crate::db::StoreError;
use crate::models::{Entity, MutationDescriptor, Predicate, PredicateSchema, SchemaError, Uid};
use crate::services::{Transaction, TransactionError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Result of a successful commit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitReceipt {
    /// Snapshot the transaction read from
    pub start_ts: u64,
    /// Timestamp at which the writes became visible; equals `start_ts` for
    /// read-only commits
    pub commit_ts: u64,
    pub committed_at: DateTime<Utc>,
    /// Uids allocated for blank targets, keyed by blank label
    pub uids: BTreeMap<String, Uid>,
    /// Every entity written by the commit
    pub touched: Vec<Uid>,
}

impl CommitReceipt {
    pub fn is_read_only(&self) -> bool {
        self.touched.is_empty()
    }
}

/// Backend transaction owned by a single task
///
/// Reads observe only data committed at or before the handle's snapshot.
/// Implementations record every key read so `commit` can detect conflicting
/// writes committed after the snapshot.
#[async_trait]
pub trait TxnHandle: Send {
    /// Snapshot timestamp of this transaction
    fn start_ts(&self) -> u64;

    /// Uids matching `predicate`, ordered by uid
    async fn query(&mut self, predicate: &Predicate) -> Result<Vec<Uid>, StoreError>;

    /// Entity as of the snapshot, or `None` if it does not exist there
    async fn read(&mut self, uid: Uid) -> Result<Option<Entity>, StoreError>;

    /// Atomically apply `mutations` if no conflicting write was committed
    /// since the snapshot; either every mutation is applied or none is
    async fn commit(
        &mut self,
        mutations: Vec<MutationDescriptor>,
    ) -> Result<CommitReceipt, StoreError>;

    /// Release the snapshot and read set without touching the store
    fn discard(&mut self);
}

/// Shared client capability for a transactional store
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Replace the predicate schema; called once before any transaction
    async fn apply_schema(&self, schema: PredicateSchema) -> Result<(), SchemaError>;

    /// Schema currently in effect
    async fn schema(&self) -> Result<Arc<PredicateSchema>, StoreError>;

    /// Open a backend transaction at the latest committed snapshot
    async fn begin(&self) -> Result<Box<dyn TxnHandle>, StoreError>;

    /// Drop all data and schema (administrative; not used by upsert logic)
    async fn reset_all(&self) -> Result<(), StoreError>;

    /// Open a [`Transaction`] bound to the current schema
    async fn begin_transaction(&self) -> Result<Transaction, TransactionError> {
        let schema = self.schema().await?;
        let handle = self.begin().await?;
        Ok(Transaction::new(handle, schema))
    }
}
