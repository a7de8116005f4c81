//! Transactional Operations
//!
//! Combinators that wrap a transaction unit:
//!
//! - `RetryPolicy` - bounded re-execution of a unit on write-write conflicts
//! - `CommitOutcome` - classification of a commit attempt

pub mod conflict;
pub mod retry;

pub use conflict::CommitOutcome;
pub use retry::{RetryPolicy, Retried};
