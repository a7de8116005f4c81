//! EdgeStore Core Transaction Layer
//!
//! This crate provides the client-side transactional upsert protocol for a
//! snapshot-isolated entity store: resolve an identity by predicate, mutate
//! it (or create it), and commit or abort under concurrent writers.
//!
//! # Architecture
//!
//! - **Store abstraction**: the protocol talks to any backend through the
//!   [`db::StoreClient`] / [`db::TxnHandle`] traits
//! - **Snapshot isolation**: [`db::MemoryStore`] is an in-process MVCC store
//!   with first-committer-wins conflict detection
//! - **Retry unit**: resolution, mutation and commit are retried together,
//!   never the commit alone
//!
//! # Modules
//!
//! - [`models`] - Entities, predicate schema, predicates, mutation builder
//! - [`db`] - Store client traits and the in-memory store
//! - [`services`] - Transaction, identity resolver, upsert service, scenario driver
//! - [`operations`] - Retry policy and commit outcome classification
//! - [`config`] - Upsert and retry configuration

pub mod config;
pub mod db;
pub mod models;
pub mod operations;
pub mod services;

// Re-export commonly used types
pub use config::{RetryConfig, UpsertConfig};
pub use db::{MemoryStore, StoreClient, StoreError};
pub use models::*;
pub use operations::{CommitOutcome, RetryPolicy};
pub use services::*;
