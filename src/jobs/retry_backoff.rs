//! Retry policy with capped exponential backoff for job processing.
//!
//! # Example
//! ```rust
//! use blockchain_queue_worker::jobs::BackoffRetryPolicy;
//! use std::time::Duration;
//!
//! let policy = BackoffRetryPolicy::new(3, 5_000);
//! assert_eq!(policy.backoff_duration(1), Duration::from_millis(10_000));
//! assert_eq!(policy.backoff_duration(3), Duration::from_millis(30_000));
//! ```

use std::time::Duration;

use crate::constants::{DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY_MS, MAX_RETRY_DELAY_MS};

/// Computes `min(base_delay_ms * 2^attempt, max_delay_ms)` in milliseconds.
///
/// `attempt` starts at 1 for the first retry; the first execution is never
/// delayed. Saturates instead of overflowing for large attempt counts.
pub fn exponential_backoff(attempt: u32, base_delay_ms: u64, max_delay_ms: u64) -> u64 {
    let multiplier = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    base_delay_ms.saturating_mul(multiplier).min(max_delay_ms)
}

/// Retry budget and delay schedule applied by the job processor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffRetryPolicy {
    /// Attempts allowed when a job carries no `maxAttempts` of its own.
    pub default_max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for BackoffRetryPolicy {
    fn default() -> Self {
        Self {
            default_max_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            base_delay_ms: DEFAULT_RETRY_DELAY_MS,
            max_delay_ms: MAX_RETRY_DELAY_MS,
        }
    }
}

impl BackoffRetryPolicy {
    pub fn new(default_max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            default_max_attempts,
            base_delay_ms,
            ..Self::default()
        }
    }

    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        Duration::from_millis(exponential_backoff(
            attempt,
            self.base_delay_ms,
            self.max_delay_ms,
        ))
    }
}
