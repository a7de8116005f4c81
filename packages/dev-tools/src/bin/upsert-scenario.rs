//! Concurrent Upsert Scenario Binary
//!
//! Runs the Alice scenario against an in-memory store: apply the schema,
//! seed one entity with `name="Alice"`, then let N writers append their
//! index to `count` by upserting on `name="Alice"`. Prints the scenario
//! report and store metrics as JSON.
//!
//! # Usage
//!
//! ```bash
//! # 10 parallel writers, unbounded retries
//! cargo run --bin upsert-scenario
//!
//! # Sequential run with a bounded budget
//! EDGESTORE_MODE=sequential EDGESTORE_MAX_ATTEMPTS=3 cargo run --bin upsert-scenario
//! ```
//!
//! # Environment Variables
//!
//! - `EDGESTORE_CONFIG`: JSON config file; replaces the `EDGESTORE_*` overrides below
//! - `EDGESTORE_WRITERS`, `EDGESTORE_MODE`, `EDGESTORE_MAX_ATTEMPTS`,
//!   `EDGESTORE_BACKOFF_MS`, `EDGESTORE_MAX_BACKOFF_MS`: see `UpsertConfig::from_env`
//! - `EDGESTORE_LATENCY_MS`: simulated store latency per read and commit (default: 0)
//! - `RUST_LOG`: Logging level (e.g., "info", "debug", "trace")

use std::env;
use std::sync::Arc;
use std::time::Duration;

use edgestore_core::db::{MemoryStore, StoreClient};
use edgestore_core::models::{MutationBuilder, MutationTarget, Predicate, PredicateSchema};
use edgestore_core::services::{run_concurrent_upsert_scenario, ScenarioSpec, UpsertService};
use edgestore_core::UpsertConfig;
use edgestore_node_status::{NetworkState, NodeSnapshot, StaticNode, SystemModule};

const SCHEMA: &str = "
    name: string @index(exact) .
    email: string @index(exact) .
    count: [int] .
";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match env::var("EDGESTORE_CONFIG") {
        Ok(path) => {
            tracing::info!("Config: {}", path);
            UpsertConfig::from_json_file(path)?
        }
        Err(_) => UpsertConfig::from_env()?,
    };
    tracing::info!(
        "Writers: {} ({}), max attempts: {}",
        config.writer_count,
        config.mode,
        config
            .retry
            .max_attempts
            .map_or_else(|| "unbounded".to_string(), |n| n.to_string())
    );

    let latency = env::var("EDGESTORE_LATENCY_MS")
        .ok()
        .and_then(|ms| ms.parse::<u64>().ok())
        .filter(|ms| *ms > 0);
    let store = match latency {
        Some(ms) => {
            tracing::info!("Simulated store latency: {}ms", ms);
            MemoryStore::with_latency(Duration::from_millis(ms))
        }
        None => MemoryStore::new(),
    };

    let node = Arc::new(StaticNode::new(NodeSnapshot {
        network_state: NetworkState {
            peer_id: "local".to_string(),
        },
        ..NodeSnapshot::default()
    }));
    let system = SystemModule::new(node.clone(), node);
    let info = system.runtime_info().await?;
    let health = system.health().await?;
    tracing::info!(
        "Node {} {} on chain {} ({} peer(s), syncing: {})",
        info.name,
        info.version,
        info.chain,
        health.peers,
        health.is_syncing
    );

    let schema: PredicateSchema = SCHEMA.parse()?;
    store.apply_schema(schema).await?;
    seed_alice(&store).await?;

    let service = Arc::new(UpsertService::new(Arc::new(store.clone())));
    let spec = ScenarioSpec::new(Predicate::eq("name", "Alice"), "count")
        .with_writers(config.writer_count)
        .with_mode(config.mode)
        .with_retry(config.retry_policy());

    let report = run_concurrent_upsert_scenario(service, &spec).await?;
    if report.failed() > 0 {
        tracing::warn!("{} writer(s) did not commit", report.failed());
    }

    let output = serde_json::json!({
        "report": report,
        "metrics": store.metrics(),
        "conflictRate": store.metrics().conflict_rate(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn seed_alice(store: &MemoryStore) -> anyhow::Result<()> {
    let mut txn = store.begin_transaction().await?;
    let descriptor = MutationBuilder::new(MutationTarget::blank("alice"))
        .set("name", "Alice")
        .set("email", "alice@example.com")
        .build(txn.schema())?;
    txn.attach(descriptor)?;
    let receipt = txn.commit().await?;
    tracing::info!("Seeded Alice at commit {}", receipt.commit_ts);
    Ok(())
}
