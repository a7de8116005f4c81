//! Transaction Services
//!
//! This module contains the transaction protocol built on a [`StoreClient`](crate::db::StoreClient):
//!
//! - `Transaction` - open/committed/discarded unit of atomicity
//! - `resolve_identity` - predicate lookup inside the mutating transaction
//! - `UpsertService` - update-or-create by predicate under a retry policy
//! - `run_concurrent_upsert_scenario` - N writers against one entity, plus verification
//!
//! Services never hold a transaction across writers: each writer task opens
//! and owns its own.

pub mod error;
pub mod identity_resolver;
pub mod scenario;
pub mod transaction;
pub mod upsert_service;

pub use error::{ErrorKind, TransactionError, TransactionState};
pub use identity_resolver::resolve_identity;
pub use scenario::{
    run_concurrent_upsert_scenario, ExecutionMode, ScenarioReport, ScenarioSpec, WriterOutcome,
    WriterStatus,
};
pub use transaction::Transaction;
pub use upsert_service::{UpsertOutcome, UpsertService, UPSERT_LABEL};
