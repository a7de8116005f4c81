//! Store Events
//!
//! Events emitted by [`MemoryStore`](crate::db::MemoryStore) after a state
//! change has been applied. Subscribers receive them through a tokio
//! broadcast channel, so slow subscribers may observe `Lagged` and skip
//! events; the store never blocks on them.

use crate::models::Uid;
use serde::Serialize;

/// Domain events emitted by the store
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StoreEvent {
    /// A transaction committed writes
    Committed {
        start_ts: u64,
        commit_ts: u64,
        touched: Vec<Uid>,
    },

    /// A commit was rejected because of a conflicting write
    Aborted { start_ts: u64, key: String },

    /// A new schema was applied
    SchemaApplied { fields: usize },

    /// All data and schema were dropped
    Reset,
}

impl StoreEvent {
    /// Get a string representation of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            StoreEvent::Committed { .. } => "committed",
            StoreEvent::Aborted { .. } => "aborted",
            StoreEvent::SchemaApplied { .. } => "schema_applied",
            StoreEvent::Reset => "reset",
        }
    }
}
