//! Concurrent Upsert Driver
//!
//! Runs N logical writers against one entity identified by a shared
//! predicate. Writer `i` appends the integer `i` to a list field through
//! [`UpsertService::upsert`]. Writers run as independent tokio tasks
//! (`parallel`) or one after another (`sequential`). A writer's terminal
//! failure is recorded in its outcome and never stops its siblings.
//!
//! After every writer finished, a verification pass queries the predicate
//! in a fresh transaction and reports what it observed.

use crate::models::{Entity, FieldDelta, FieldValue, Predicate, Uid};
use crate::operations::RetryPolicy;
use crate::services::error::{ErrorKind, TransactionError};
use crate::services::upsert_service::UpsertService;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// How writer tasks are scheduled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Parallel,
    /// One writer at a time; sees zero conflicts
    Sequential,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Parallel => f.write_str("parallel"),
            ExecutionMode::Sequential => f.write_str("sequential"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "parallel" => Ok(ExecutionMode::Parallel),
            "sequential" => Ok(ExecutionMode::Sequential),
            other => Err(format!(
                "unknown execution mode '{}', expected parallel or sequential",
                other
            )),
        }
    }
}

/// Parameters of one scenario run
#[derive(Debug, Clone)]
pub struct ScenarioSpec {
    pub writer_count: usize,
    pub mode: ExecutionMode,
    /// Identity predicate every writer upserts by
    pub predicate: Predicate,
    /// List field each writer appends its value to
    pub field: String,
    pub retry: RetryPolicy,
}

impl ScenarioSpec {
    pub fn new(predicate: Predicate, field: impl Into<String>) -> Self {
        Self {
            writer_count: 10,
            mode: ExecutionMode::default(),
            predicate,
            field: field.into(),
            retry: RetryPolicy::unbounded(),
        }
    }

    pub fn with_writers(mut self, writer_count: usize) -> Self {
        self.writer_count = writer_count;
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Terminal status of a single writer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WriterStatus {
    Committed {
        uid: Uid,
        created: bool,
        commit_ts: u64,
    },
    Failed {
        kind: ErrorKind,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriterOutcome {
    pub writer: usize,
    /// Value this writer tried to append
    pub value: FieldValue,
    pub attempts: usize,
    /// Attempts that ended in a conflict abort
    pub conflicts: usize,
    #[serde(flatten)]
    pub status: WriterStatus,
}

impl WriterOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self.status, WriterStatus::Committed { .. })
    }

    fn failed(writer: usize, value: FieldValue, attempts: usize, error: &TransactionError) -> Self {
        // Exhaustion means the last attempt conflicted too
        let conflicts = match error {
            TransactionError::RetryBudgetExhausted { .. } => attempts,
            _ => attempts.saturating_sub(1),
        };
        Self {
            writer,
            value,
            attempts,
            conflicts,
            status: WriterStatus::Failed {
                kind: error.kind(),
                message: error.to_string(),
            },
        }
    }
}

/// Everything a scenario run observed
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub mode: ExecutionMode,
    pub writer_count: usize,
    pub field: String,
    /// Ordered by writer index
    pub per_writer: Vec<WriterOutcome>,
    /// Entities matching the predicate after all writers finished
    pub final_observed_state: Vec<Entity>,
    pub total_conflicts: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ScenarioReport {
    pub fn succeeded(&self) -> usize {
        self.per_writer.iter().filter(|w| w.is_committed()).count()
    }

    pub fn failed(&self) -> usize {
        self.writer_count - self.succeeded()
    }

    /// Every value of the scenario field across the observed entities
    pub fn observed_values(&self) -> Vec<&FieldValue> {
        self.final_observed_state
            .iter()
            .filter_map(|entity| entity.get(&self.field))
            .flat_map(|value| value.scalars())
            .collect()
    }
}

/// Run `spec.writer_count` upserts against `spec.predicate` and verify the result
///
/// Writer failures are reported per writer; only a failure of the
/// verification query itself is returned as an error.
pub async fn run_concurrent_upsert_scenario(
    service: Arc<UpsertService>,
    spec: &ScenarioSpec,
) -> Result<ScenarioReport, TransactionError> {
    let started_at = Utc::now();
    tracing::info!(
        "Running {} {} writer(s) against {}",
        spec.writer_count,
        spec.mode,
        spec.predicate
    );

    let per_writer = match spec.mode {
        ExecutionMode::Parallel => run_parallel(&service, spec).await,
        ExecutionMode::Sequential => {
            let mut outcomes = Vec::with_capacity(spec.writer_count);
            for writer in 0..spec.writer_count {
                outcomes.push(run_writer(&service, spec, writer).await);
            }
            outcomes
        }
    };

    let mut txn = service.client().begin_transaction().await?;
    let final_observed_state = txn.query(&spec.predicate).await?;
    txn.discard();

    let report = ScenarioReport {
        mode: spec.mode,
        writer_count: spec.writer_count,
        field: spec.field.clone(),
        total_conflicts: per_writer.iter().map(|w| w.conflicts).sum(),
        per_writer,
        final_observed_state,
        started_at,
        finished_at: Utc::now(),
    };

    tracing::info!(
        "Scenario finished: {}/{} committed, {} conflict(s), {} matching entit(ies)",
        report.succeeded(),
        report.writer_count,
        report.total_conflicts,
        report.final_observed_state.len()
    );
    Ok(report)
}

async fn run_parallel(service: &Arc<UpsertService>, spec: &ScenarioSpec) -> Vec<WriterOutcome> {
    let handles: Vec<_> = (0..spec.writer_count)
        .map(|writer| {
            let service = Arc::clone(service);
            let spec = spec.clone();
            tokio::spawn(async move { run_writer(&service, &spec, writer).await })
        })
        .collect();

    join_all(handles)
        .await
        .into_iter()
        .enumerate()
        .map(|(writer, joined)| {
            joined.unwrap_or_else(|e| {
                tracing::warn!("Writer {} task failed: {}", writer, e);
                WriterOutcome {
                    writer,
                    value: writer_value(writer),
                    attempts: 0,
                    conflicts: 0,
                    status: WriterStatus::Failed {
                        kind: ErrorKind::Internal,
                        message: e.to_string(),
                    },
                }
            })
        })
        .collect()
}

async fn run_writer(service: &UpsertService, spec: &ScenarioSpec, writer: usize) -> WriterOutcome {
    let value = writer_value(writer);
    let delta = FieldDelta::new().append(spec.field.clone(), value.clone());

    let (result, attempts) = service
        .upsert_counted(&spec.predicate, &delta, &spec.retry)
        .await;

    match result {
        Ok(outcome) => WriterOutcome {
            writer,
            value,
            attempts,
            conflicts: attempts.saturating_sub(1),
            status: WriterStatus::Committed {
                uid: outcome.uid,
                created: outcome.created,
                commit_ts: outcome.commit_ts,
            },
        },
        // The value is visible even though the entity could not be read back
        Err(TransactionError::ReadBackFailed {
            uid,
            created,
            commit_ts,
            ..
        }) => WriterOutcome {
            writer,
            value,
            attempts,
            conflicts: attempts.saturating_sub(1),
            status: WriterStatus::Committed {
                uid,
                created,
                commit_ts,
            },
        },
        Err(e) => {
            tracing::warn!("Writer {} failed after {} attempt(s): {}", writer, attempts, e);
            WriterOutcome::failed(writer, value, attempts, &e)
        }
    }
}

fn writer_value(writer: usize) -> FieldValue {
    FieldValue::Int(writer as i64)
}
