//! Bounded retry of a transactional unit on write-write conflicts
//!
//! The retry boundary is the whole `{resolve, build, attach, commit}` unit,
//! not the commit call: after a conflict the earlier resolution and the
//! snapshot it depended on are stale, so every attempt opens a fresh
//! transaction and resolves again.
//!
//! # Example
//!
//! ```rust,no_run
//! use edgestore_core::operations::RetryPolicy;
//! use edgestore_core::services::TransactionError;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), TransactionError> {
//! // Up to 5 attempts with exponential backoff (10ms, 20ms, 40ms, 80ms)
//! let policy = RetryPolicy::bounded(5).with_backoff(
//!     Duration::from_millis(10),
//!     Duration::from_millis(200),
//! );
//!
//! let retried = policy
//!     .run(|attempt| async move {
//!         // open transaction, resolve, attach, commit ...
//!         Ok::<_, TransactionError>(attempt)
//!     })
//!     .await?;
//! assert_eq!(retried.attempts, 1);
//! # Ok(())
//! # }
//! ```

use crate::services::TransactionError;
use std::future::Future;
use tokio::time::Duration;

const DEFAULT_BASE_BACKOFF: Duration = Duration::from_millis(10);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_millis(200);

/// Governs re-execution of a retryable unit after conflicts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed, `None` for unbounded
    max_attempts: Option<usize>,
    base_backoff: Duration,
    max_backoff: Duration,
}

/// Value produced by a unit together with the number of attempts it took
#[derive(Debug, Clone, PartialEq)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: usize,
}

impl<T> Retried<T> {
    /// Conflicts absorbed before the successful attempt
    pub fn conflicts(&self) -> usize {
        self.attempts.saturating_sub(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::bounded(5)
    }
}

impl RetryPolicy {
    /// Allow at most `max_attempts` attempts in total (minimum one)
    pub fn bounded(max_attempts: usize) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
            base_backoff: DEFAULT_BASE_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }

    /// Retry conflicts until the unit succeeds or fails fatally
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            ..Self::bounded(1)
        }
    }

    /// Single attempt; a conflict is surfaced as budget exhaustion
    pub fn no_retry() -> Self {
        Self::bounded(1)
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = max.max(base);
        self
    }

    pub fn max_attempts(&self) -> Option<usize> {
        self.max_attempts
    }

    /// Delay after the given failed attempt (1-based): `base * 2^(attempt-1)`, capped
    pub fn backoff_for(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as u32;
        self.base_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }

    fn exhausted(&self, attempt: usize) -> bool {
        self.max_attempts.is_some_and(|max| attempt >= max)
    }

    /// Run `unit` until it succeeds, fails fatally, or the budget runs out
    ///
    /// `unit` receives the 1-based attempt number and must redo all of its
    /// work on every call.
    ///
    /// # Retry Behavior
    ///
    /// - **Retry on**: `TransactionError::ConflictAborted` only
    /// - **Backoff**: exponential from the base delay, capped at the max delay
    /// - **Other errors**: returned immediately, unchanged
    /// - **Exhaustion**: `TransactionError::RetryBudgetExhausted`
    pub async fn run<T, F, Fut>(&self, mut unit: F) -> Result<Retried<T>, TransactionError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, TransactionError>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match unit(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!("Unit succeeded after {} retry(ies)", attempt - 1);
                    }
                    return Ok(Retried {
                        value,
                        attempts: attempt,
                    });
                }

                Err(e) if e.is_retryable() => {
                    if self.exhausted(attempt) {
                        tracing::warn!("Retry budget exhausted after {} attempt(s): {}", attempt, e);
                        return Err(TransactionError::retry_budget_exhausted(
                            attempt,
                            e.to_string(),
                        ));
                    }

                    let backoff = self.backoff_for(attempt);
                    tracing::debug!(
                        "Conflict on attempt {}: {}. Retrying in {:?}",
                        attempt,
                        e,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                }

                Err(e) => return Err(e),
            }
        }
    }
}
