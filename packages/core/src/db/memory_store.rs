//! MemoryStore - StoreClient Implementation with Snapshot Isolation
//!
//! In-process reference backend for the transaction layer. Every field keeps a
//! list of committed versions, so a transaction reads the state as of its
//! start timestamp and never observes uncommitted or later writes.
//!
//! # Conflict Detection
//!
//! Each transaction records the keys it read:
//!
//! - `Index(field, token)` for every equality lookup
//! - `Field(uid, field)` for every field it matched on
//! - `Entity(uid)` for every entity it loaded
//!
//! At commit, the write keys are derived from the mutations (including index
//! tokens for both the old and new values of indexed fields). If any read or
//! write key was written by a commit newer than the snapshot, the commit
//! aborts with [`StoreError::Conflict`] and nothing is applied
//! (first-committer-wins).
//!
//! # Version Retention
//!
//! The store tracks the start timestamp of every open transaction. When a
//! commit writes a field it drops the versions of that field no open snapshot
//! can read, keeping the newest version at or below the oldest open snapshot.
//!
//! # Examples
//!
//! ```rust,no_run
//! use edgestore_core::db::{MemoryStore, StoreClient};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Simulate 5ms of network latency on every read and commit
//!     let store = MemoryStore::with_latency(Duration::from_millis(5));
//!     store.apply_schema("name: string @index(exact) .".parse()?).await?;
//!
//!     let mut events = store.subscribe_to_events();
//!     let _ = events.try_recv();
//!     Ok(())
//! }
//! ```

use crate::db::events::StoreEvent;
use crate::db::metrics::{MetricsSnapshot, StoreMetrics};
use crate::db::store_client::{CommitReceipt, StoreClient, TxnHandle};
use crate::db::StoreError;
use crate::models::{
    Entity, FieldChange, MutationDescriptor, MutationTarget, Predicate, PredicateSchema,
    SchemaError, StoredValue, Uid,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Key used for read/write conflict detection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConflictKey {
    Entity(Uid),
    Field { uid: Uid, field: String },
    Index { field: String, token: String },
}

impl fmt::Display for ConflictKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKey::Entity(uid) => write!(f, "entity {}", uid),
            ConflictKey::Field { uid, field } => write!(f, "{}@{}", field, uid),
            ConflictKey::Index { field, token } => write!(f, "index {}={}", field, token),
        }
    }
}

#[derive(Debug, Clone)]
struct Version {
    commit_ts: u64,
    /// `None` marks a cleared field
    value: Option<StoredValue>,
}

#[derive(Debug, Clone)]
struct EntityVersions {
    created_ts: u64,
    fields: HashMap<String, Vec<Version>>,
}

impl EntityVersions {
    fn exists_at(&self, ts: u64) -> bool {
        self.created_ts <= ts
    }

    fn value_at(&self, field: &str, ts: u64) -> Option<&StoredValue> {
        self.fields
            .get(field)?
            .iter()
            .rev()
            .find(|v| v.commit_ts <= ts)?
            .value
            .as_ref()
    }

    fn latest(&self, field: &str) -> Option<&StoredValue> {
        self.fields.get(field)?.last()?.value.as_ref()
    }

    /// Drop versions of `field` that no snapshot at or after `watermark` can read
    fn compact(&mut self, field: &str, watermark: u64) {
        if let Some(chain) = self.fields.get_mut(field) {
            if let Some(keep) = chain.iter().rposition(|v| v.commit_ts <= watermark) {
                chain.drain(..keep);
            }
        }
    }

    fn snapshot(&self, uid: Uid, ts: u64) -> Entity {
        let mut entity = Entity::new(uid);
        for field in self.fields.keys() {
            if let Some(value) = self.value_at(field, ts) {
                entity.fields.insert(field.clone(), value.clone());
            }
        }
        entity
    }
}

#[derive(Debug, Default)]
struct StoreState {
    schema: Arc<PredicateSchema>,
    max_commit_ts: u64,
    entities: BTreeMap<Uid, EntityVersions>,
    last_write: HashMap<ConflictKey, u64>,
    /// Start timestamps of open transactions, with a count per timestamp
    open_snapshots: BTreeMap<u64, usize>,
}

impl StoreState {
    fn register_snapshot(&mut self) -> u64 {
        let start_ts = self.max_commit_ts;
        *self.open_snapshots.entry(start_ts).or_insert(0) += 1;
        start_ts
    }

    fn release_snapshot(&mut self, start_ts: u64) {
        if let Some(count) = self.open_snapshots.get_mut(&start_ts) {
            *count -= 1;
            if *count == 0 {
                self.open_snapshots.remove(&start_ts);
            }
        }
    }

    fn oldest_snapshot(&self) -> Option<u64> {
        self.open_snapshots.keys().next().copied()
    }

    fn is_stale(&self, key: &ConflictKey, start_ts: u64) -> bool {
        self.last_write
            .get(key)
            .is_some_and(|&commit_ts| commit_ts > start_ts)
    }
}

struct Shared {
    state: RwLock<StoreState>,
    events: broadcast::Sender<StoreEvent>,
    metrics: StoreMetrics,
    latency: Option<Duration>,
}

impl Shared {
    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, StoreState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::internal("Failed to acquire store read lock"))
    }

    fn write_state(&self) -> Result<std::sync::RwLockWriteGuard<'_, StoreState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::internal("Failed to acquire store write lock"))
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }
}

/// In-memory transactional store with snapshot isolation
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// Create an empty store with no schema
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a store that sleeps for `latency` before every read and commit,
    /// widening the window in which concurrent transactions overlap
    pub fn with_latency(latency: Duration) -> Self {
        Self::build(Some(latency))
    }

    fn build(latency: Option<Duration>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(StoreState::default()),
                events,
                metrics: StoreMetrics::new(),
                latency,
            }),
        }
    }

    /// Subscribe to events emitted after each state change
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<StoreEvent> {
        self.shared.events.subscribe()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Number of entities in the latest committed state
    pub fn entity_count(&self) -> Result<usize, StoreError> {
        Ok(self.shared.read_state()?.entities.len())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn apply_schema(&self, schema: PredicateSchema) -> Result<(), SchemaError> {
        let fields = schema.len();
        {
            let mut state = self
                .shared
                .write_state()
                .map_err(|e| SchemaError::Rejected(e.to_string()))?;
            state.schema = Arc::new(schema);
        }
        tracing::debug!("Applied schema with {} field(s)", fields);
        self.shared.emit(StoreEvent::SchemaApplied { fields });
        Ok(())
    }

    async fn schema(&self) -> Result<Arc<PredicateSchema>, StoreError> {
        Ok(self.shared.read_state()?.schema.clone())
    }

    async fn begin(&self) -> Result<Box<dyn TxnHandle>, StoreError> {
        let start_ts = self.shared.write_state()?.register_snapshot();
        self.shared.metrics.record_begin();
        Ok(Box::new(MemoryTxn {
            shared: self.shared.clone(),
            start_ts,
            reads: HashSet::new(),
            closed: false,
            registered: true,
        }))
    }

    async fn reset_all(&self) -> Result<(), StoreError> {
        {
            let mut state = self.shared.write_state()?;
            // Transactions opened before the reset still release their snapshot
            let open_snapshots = std::mem::take(&mut state.open_snapshots);
            *state = StoreState {
                open_snapshots,
                ..StoreState::default()
            };
        }
        self.shared.metrics.reset();
        tracing::debug!("Store reset: all data and schema dropped");
        self.shared.emit(StoreEvent::Reset);
        Ok(())
    }
}

/// Transaction handle issued by [`MemoryStore`]
struct MemoryTxn {
    shared: Arc<Shared>,
    start_ts: u64,
    reads: HashSet<ConflictKey>,
    closed: bool,
    /// Snapshot still counted in `open_snapshots`
    registered: bool,
}

impl MemoryTxn {
    fn release_snapshot(&mut self) {
        if !self.registered {
            return;
        }
        match self.shared.write_state() {
            Ok(mut state) => {
                state.release_snapshot(self.start_ts);
                self.registered = false;
            }
            Err(e) => tracing::warn!("Snapshot {} not released: {}", self.start_ts, e),
        }
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed {
            Err(StoreError::internal(format!(
                "transaction at snapshot {} is already closed",
                self.start_ts
            )))
        } else {
            Ok(())
        }
    }

    fn query_locked(&mut self, predicate: &Predicate) -> Result<Vec<Uid>, StoreError> {
        let state = self.shared.read_state()?;

        match predicate {
            Predicate::Uid { uid } => {
                self.reads.insert(ConflictKey::Entity(*uid));
                let exists = state
                    .entities
                    .get(uid)
                    .is_some_and(|e| e.exists_at(self.start_ts));
                Ok(if exists { vec![*uid] } else { Vec::new() })
            }
            Predicate::Eq { field, value } => {
                let def = state
                    .schema
                    .get(field)
                    .ok_or_else(|| StoreError::UnknownPredicate {
                        field: field.clone(),
                    })?;
                if !def.is_indexed() {
                    return Err(StoreError::UnindexedPredicate {
                        field: field.clone(),
                    });
                }

                self.reads.insert(ConflictKey::Index {
                    field: field.clone(),
                    token: value.index_token(),
                });

                let matches: Vec<Uid> = state
                    .entities
                    .iter()
                    .filter(|(_, e)| e.exists_at(self.start_ts))
                    .filter(|(_, e)| {
                        e.value_at(field, self.start_ts)
                            .is_some_and(|v| v.matches(value))
                    })
                    .map(|(uid, _)| *uid)
                    .collect();

                for uid in &matches {
                    self.reads.insert(ConflictKey::Field {
                        uid: *uid,
                        field: field.clone(),
                    });
                }
                Ok(matches)
            }
        }
    }

    fn read_locked(&mut self, uid: Uid) -> Result<Option<Entity>, StoreError> {
        let state = self.shared.read_state()?;
        self.reads.insert(ConflictKey::Entity(uid));

        let entity = match state.entities.get(&uid) {
            Some(versions) if versions.exists_at(self.start_ts) => {
                versions.snapshot(uid, self.start_ts)
            }
            _ => return Ok(None),
        };
        for field in entity.fields.keys() {
            self.reads.insert(ConflictKey::Field {
                uid,
                field: field.clone(),
            });
        }
        Ok(Some(entity))
    }

    fn commit_locked(
        &mut self,
        mutations: &[MutationDescriptor],
    ) -> Result<CommitReceipt, StoreError> {
        let mut state = self.shared.write_state()?;
        state.release_snapshot(self.start_ts);
        self.registered = false;

        // Resolve targets; blank labels share one fresh uid per label
        let mut blanks: BTreeMap<String, Uid> = BTreeMap::new();
        let mut targets = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            let uid = match &mutation.target {
                MutationTarget::Existing(uid) => {
                    if !state.entities.contains_key(uid) {
                        return Err(StoreError::EntityNotFound { uid: *uid });
                    }
                    *uid
                }
                MutationTarget::Blank(label) => {
                    *blanks.entry(label.clone()).or_insert_with(Uid::allocate)
                }
            };
            targets.push(uid);
        }
        let created: HashSet<Uid> = blanks.values().copied().collect();

        // Stage new values in mutation order
        let mut staged: BTreeMap<(Uid, String), Option<StoredValue>> = BTreeMap::new();
        let mut write_keys: HashSet<ConflictKey> = HashSet::new();
        for (mutation, uid) in mutations.iter().zip(&targets) {
            write_keys.insert(ConflictKey::Entity(*uid));
            for op in &mutation.ops {
                let def = state.schema.get(&op.field).ok_or_else(|| {
                    StoreError::UnknownPredicate {
                        field: op.field.clone(),
                    }
                })?;

                let key = (*uid, op.field.clone());
                let committed = state.entities.get(uid).and_then(|e| e.latest(&op.field));
                let current = match staged.get(&key) {
                    Some(pending) => pending.as_ref(),
                    None => committed,
                };
                let next = apply_change(current, &op.change, def.list);

                write_keys.insert(ConflictKey::Field {
                    uid: *uid,
                    field: op.field.clone(),
                });
                if def.is_indexed() {
                    for value in committed.into_iter().chain(next.as_ref()) {
                        for scalar in value.scalars() {
                            write_keys.insert(ConflictKey::Index {
                                field: op.field.clone(),
                                token: scalar.index_token(),
                            });
                        }
                    }
                }
                staged.insert(key, next);
            }
        }

        // First-committer-wins validation
        let stale = self
            .reads
            .iter()
            .chain(write_keys.iter())
            .find(|key| state.is_stale(key, self.start_ts));
        if let Some(key) = stale {
            return Err(StoreError::conflict(self.start_ts, key.to_string()));
        }

        let commit_ts = state.max_commit_ts + 1;
        let watermark = state.oldest_snapshot().unwrap_or(commit_ts);
        for uid in &created {
            state.entities.insert(
                *uid,
                EntityVersions {
                    created_ts: commit_ts,
                    fields: HashMap::new(),
                },
            );
        }
        for ((uid, field), value) in staged {
            let versions = state
                .entities
                .get_mut(&uid)
                .ok_or_else(|| StoreError::internal(format!("staged write for missing {}", uid)))?;
            versions
                .fields
                .entry(field.clone())
                .or_default()
                .push(Version { commit_ts, value });
            versions.compact(&field, watermark);
        }
        for key in write_keys {
            state.last_write.insert(key, commit_ts);
        }
        state.max_commit_ts = commit_ts;

        let mut touched: Vec<Uid> = targets;
        touched.sort();
        touched.dedup();

        Ok(CommitReceipt {
            start_ts: self.start_ts,
            commit_ts,
            committed_at: Utc::now(),
            uids: blanks,
            touched,
        })
    }

    fn read_only_receipt(&self) -> CommitReceipt {
        CommitReceipt {
            start_ts: self.start_ts,
            commit_ts: self.start_ts,
            committed_at: Utc::now(),
            uids: BTreeMap::new(),
            touched: Vec::new(),
        }
    }
}

#[async_trait]
impl TxnHandle for MemoryTxn {
    fn start_ts(&self) -> u64 {
        self.start_ts
    }

    async fn query(&mut self, predicate: &Predicate) -> Result<Vec<Uid>, StoreError> {
        self.ensure_open()?;
        self.shared.simulate_latency().await;
        self.query_locked(predicate)
    }

    async fn read(&mut self, uid: Uid) -> Result<Option<Entity>, StoreError> {
        self.ensure_open()?;
        self.shared.simulate_latency().await;
        self.read_locked(uid)
    }

    async fn commit(
        &mut self,
        mutations: Vec<MutationDescriptor>,
    ) -> Result<CommitReceipt, StoreError> {
        self.ensure_open()?;
        self.shared.simulate_latency().await;
        self.closed = true;

        // Snapshot reads are serializable on their own
        if mutations.is_empty() {
            self.release_snapshot();
            self.shared.metrics.record_commit();
            return Ok(self.read_only_receipt());
        }

        match self.commit_locked(&mutations) {
            Ok(receipt) => {
                self.shared.metrics.record_commit();
                tracing::debug!(
                    "Committed snapshot {} at ts {} ({} entit(ies))",
                    receipt.start_ts,
                    receipt.commit_ts,
                    receipt.touched.len()
                );
                self.shared.emit(StoreEvent::Committed {
                    start_ts: receipt.start_ts,
                    commit_ts: receipt.commit_ts,
                    touched: receipt.touched.clone(),
                });
                Ok(receipt)
            }
            Err(StoreError::Conflict { start_ts, key }) => {
                self.shared.metrics.record_conflict();
                self.shared.emit(StoreEvent::Aborted {
                    start_ts,
                    key: key.clone(),
                });
                Err(StoreError::Conflict { start_ts, key })
            }
            Err(e) => {
                self.release_snapshot();
                self.shared.metrics.record_failure();
                Err(e)
            }
        }
    }

    fn discard(&mut self) {
        if !self.closed {
            self.closed = true;
            self.reads.clear();
            self.release_snapshot();
            self.shared.metrics.record_discard();
        }
    }
}

impl Drop for MemoryTxn {
    fn drop(&mut self) {
        self.release_snapshot();
    }
}

fn apply_change(
    current: Option<&StoredValue>,
    change: &FieldChange,
    list: bool,
) -> Option<StoredValue> {
    let append = |items: &[crate::models::FieldValue]| {
        let mut existing = match current {
            Some(StoredValue::List(values)) => values.clone(),
            Some(StoredValue::Scalar(value)) => vec![value.clone()],
            None => Vec::new(),
        };
        existing.extend(items.iter().cloned());
        Some(StoredValue::List(existing))
    };

    match change {
        FieldChange::Set(value) if list => append(std::slice::from_ref(value)),
        FieldChange::Set(value) => Some(StoredValue::Scalar(value.clone())),
        FieldChange::Append(values) => append(values.as_slice()),
        FieldChange::Replace(values) => Some(StoredValue::List(values.clone())),
        FieldChange::Clear => None,
    }
}
