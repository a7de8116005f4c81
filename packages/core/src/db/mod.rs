//! Store Layer
//!
//! This module handles every interaction with the underlying store:
//!
//! - The `StoreClient` / `TxnHandle` capability traits the transaction layer
//!   depends on
//! - `MemoryStore`, an in-process backend with snapshot isolation and
//!   first-committer-wins conflict detection
//! - Store events (broadcast) and transaction outcome metrics
//!
//! # Architecture
//!
//! Business logic never talks to a concrete backend. The upsert service holds
//! an `Arc<dyn StoreClient>`; each writer task opens its own transaction and
//! owns it exclusively until commit or discard.

mod error;
pub mod events;
mod memory_store;
pub mod metrics;
mod store_client;

pub use error::StoreError;
pub use events::StoreEvent;
pub use memory_store::MemoryStore;
pub use metrics::{MetricsSnapshot, StoreMetrics};
pub use store_client::{CommitReceipt, StoreClient, TxnHandle};
