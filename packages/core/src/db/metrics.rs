//! Transaction Metrics
//!
//! Lock-free counters maintained by the store for every transaction outcome.
//! The concurrent upsert scenario uses them to compare conflict rates between
//! parallel and sequential writers.
//!
//! # Usage
//!
//! ```rust
//! use edgestore_core::db::metrics::StoreMetrics;
//!
//! let metrics = StoreMetrics::new();
//! metrics.record_begin();
//! metrics.record_conflict();
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.conflicts, 1);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for transaction outcomes
#[derive(Debug, Default)]
pub struct StoreMetrics {
    begun: AtomicU64,
    committed: AtomicU64,
    conflicts: AtomicU64,
    discarded: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`StoreMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub begun: u64,
    pub committed: u64,
    pub conflicts: u64,
    pub discarded: u64,
    /// Commits rejected for a reason other than a conflict
    pub failed: u64,
}

impl MetricsSnapshot {
    /// Transactions that have not finished yet
    pub fn open(&self) -> u64 {
        self.begun
            .saturating_sub(self.committed + self.conflicts + self.discarded + self.failed)
    }

    /// Fraction of finished commit attempts that aborted on conflict
    pub fn conflict_rate(&self) -> f64 {
        let attempts = self.committed + self.conflicts;
        if attempts == 0 {
            0.0
        } else {
            self.conflicts as f64 / attempts as f64
        }
    }
}

impl StoreMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_begin(&self) {
        self.begun.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_commit(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discard(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            begun: self.begun.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter
    pub fn reset(&self) {
        self.begun.store(0, Ordering::Relaxed);
        self.committed.store(0, Ordering::Relaxed);
        self.conflicts.store(0, Ordering::Relaxed);
        self.discarded.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
    }
}
