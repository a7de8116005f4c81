//! Configuration for the upsert scenario and its retry policy
use crate::operations::RetryPolicy;
use crate::services::ExecutionMode;
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Upper bound on writers for one scenario run
const MAX_WRITERS: usize = 10_000;

/// Retry budget and backoff between conflicting attempts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per upsert; `None` retries conflicts without bound
    pub max_attempts: Option<usize>,

    /// Delay after the first conflict, doubled after each further one
    pub base_backoff_ms: u64,

    /// Cap on the delay between attempts
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            base_backoff_ms: 10,
            max_backoff_ms: 200,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == Some(0) {
            return Err("max_attempts must be greater than 0".to_string());
        }

        if self.max_backoff_ms < self.base_backoff_ms {
            return Err(format!(
                "max_backoff_ms ({}) cannot be less than base_backoff_ms ({})",
                self.max_backoff_ms, self.base_backoff_ms
            ));
        }

        Ok(())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        let policy = match config.max_attempts {
            Some(max) => RetryPolicy::bounded(max),
            None => RetryPolicy::unbounded(),
        };
        policy.with_backoff(
            Duration::from_millis(config.base_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        )
    }
}

/// Configuration for a concurrent upsert run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpsertConfig {
    /// Number of writer tasks
    pub writer_count: usize,

    /// Run writers concurrently or one at a time
    pub mode: ExecutionMode,

    pub retry: RetryConfig,
}

impl Default for UpsertConfig {
    fn default() -> Self {
        Self {
            writer_count: 10,
            mode: ExecutionMode::Parallel,
            retry: RetryConfig::default(),
        }
    }
}

impl UpsertConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.writer_count == 0 {
            return Err("writer_count must be greater than 0".to_string());
        }

        if self.writer_count > MAX_WRITERS {
            return Err(format!("writer_count cannot exceed {}", MAX_WRITERS));
        }

        self.retry.validate()
    }

    /// Defaults overridden by `EDGESTORE_*` environment variables
    ///
    /// - `EDGESTORE_WRITERS`: writer count
    /// - `EDGESTORE_MODE`: `parallel` or `sequential`
    /// - `EDGESTORE_MAX_ATTEMPTS`: attempt budget, `0` or `unbounded` for no limit
    /// - `EDGESTORE_BACKOFF_MS` / `EDGESTORE_MAX_BACKOFF_MS`: backoff bounds
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from a JSON file; missing keys keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        config.validate().map_err(|e| anyhow!(e))?;
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(writers) = lookup("EDGESTORE_WRITERS") {
            config.writer_count = writers
                .trim()
                .parse()
                .with_context(|| format!("EDGESTORE_WRITERS is not a number: {}", writers))?;
        }

        if let Some(mode) = lookup("EDGESTORE_MODE") {
            config.mode = mode.parse().map_err(|e: String| anyhow!(e))?;
        }

        if let Some(attempts) = lookup("EDGESTORE_MAX_ATTEMPTS") {
            config.retry.max_attempts = match attempts.trim() {
                "0" | "unbounded" => None,
                n => Some(n.parse().with_context(|| {
                    format!("EDGESTORE_MAX_ATTEMPTS is not a number: {}", attempts)
                })?),
            };
        }

        if let Some(ms) = lookup("EDGESTORE_BACKOFF_MS") {
            config.retry.base_backoff_ms = ms
                .trim()
                .parse()
                .with_context(|| format!("EDGESTORE_BACKOFF_MS is not a number: {}", ms))?;
        }

        if let Some(ms) = lookup("EDGESTORE_MAX_BACKOFF_MS") {
            config.retry.max_backoff_ms = ms
                .trim()
                .parse()
                .with_context(|| format!("EDGESTORE_MAX_BACKOFF_MS is not a number: {}", ms))?;
        }

        config.validate().map_err(|e| anyhow!(e))?;
        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }
}
