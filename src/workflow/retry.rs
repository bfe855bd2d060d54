//! Retry/backoff policy (C1).
//!
//! Grounded on the teacher's `resilience/retry.rs` `RetryConfig`/`RetryPolicy`
//! pair, reshaped to match the pure-function contract in spec §4.1: a policy
//! has no clock of its own and only ever returns a `retry_after` duration, so
//! the workflow engine (C6) stays in control of when the delay is actually
//! slept out — a requirement for deterministic replay.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::error::WorkflowError;

/// A retry policy: (initial_interval, max_interval, backoff_coefficient,
/// max_attempts, non_retryable_errors).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub backoff_coefficient: f64,
    pub max_attempts: u32,
    pub non_retryable_errors: BTreeSet<&'static str>,
}

impl RetryPolicy {
    /// A short policy for read-mostly collaborator calls (OCR extraction,
    /// invoice lookups).
    pub fn read_path() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(60),
            backoff_coefficient: 2.0,
            max_attempts: 3,
            non_retryable_errors: default_non_retryable(),
        }
    }

    /// A longer, more patient policy for ERP writes (posting cash
    /// applications, updating credit limits).
    pub fn write_path() -> Self {
        Self {
            initial_interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(180),
            backoff_coefficient: 2.0,
            max_attempts: 5,
            non_retryable_errors: default_non_retryable(),
        }
    }

    /// A tight policy for in-process, non-collaborator steps such as the
    /// matcher call (spec §4.7 step 3).
    pub fn in_process() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(10),
            backoff_coefficient: 2.0,
            max_attempts: 2,
            non_retryable_errors: default_non_retryable(),
        }
    }

    /// Whether an attempt should be retried: the error's kind is not in the
    /// non-retryable set and the attempt budget has not been exhausted.
    pub fn should_retry(&self, error: &WorkflowError, attempts_so_far: u32) -> bool {
        if attempts_so_far >= self.max_attempts {
            return false;
        }
        if self.non_retryable_errors.contains(error.kind_tag()) {
            return false;
        }
        error.is_retryable()
    }

    /// The delay before retrying a failed attempt numbered `n` (1-indexed):
    /// `min(initial_interval * coefficient^(n-1), max_interval)`.
    pub fn delay_for_attempt(&self, n: u32) -> Duration {
        debug_assert!(n >= 1, "attempt numbers are 1-indexed");
        let scaled = self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(n as i32 - 1);
        let capped = scaled.min(self.max_interval.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }
}

fn default_non_retryable() -> BTreeSet<&'static str> {
    ["invalid_input", "cancelled", "data_quality"].into_iter().collect()
}
