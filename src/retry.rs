//! Retry Logic and Error Resilience
//!
//! Retries transient upstream failures with capped exponential backoff.
//!
//! # Features
//!
//! - **Exponential Backoff**: delay starts at `initial_delay` and multiplies by
//!   `backoff_factor` after every retry, capped at `max_delay`
//! - **Typed Classification**: only retryable statuses, timeouts and connect
//!   failures are retried; everything else fails on the first attempt
//! - **Cancellable**: backoff sleeps race the caller's [`CancelToken`]
//!
//! # Example
//!
//! ```ignore
//! use shop_gateway::retry::{RetryExecutor, RetryPolicy};
//!
//! let executor = RetryExecutor::new(
//!     RetryPolicy::default()
//!         .max_retries(3)
//!         .initial_delay(Duration::from_millis(100)),
//! );
//!
//! let response = executor.execute(|| api.request(&req), &cancel).await?;
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::metrics;
use crate::upstream::CallError;

/// Statuses retried by default: rate limited plus transient server errors
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Retry policy
///
/// Immutable once handed to a [`RetryExecutor`]; the builder methods consume
/// `self`.
///
/// # Fields
///
/// * `max_retries` - Retries after the first attempt (default: 3)
/// * `initial_delay` - Delay before the first retry (default: 100ms)
/// * `max_delay` - Ceiling for any single delay (default: 5s)
/// * `backoff_factor` - Delay multiplier per retry (default: 2.0)
/// * `retryable_statuses` - HTTP statuses treated as transient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    #[serde(with = "duration_ms")]
    pub initial_delay: Duration,
    #[serde(with = "duration_ms")]
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self::default().max_retries(0)
    }

    /// Set the number of retries after the first attempt
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the delay before the first retry
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay between retries
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier; values below 1.0 are raised to 1.0
    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = if factor.is_finite() { factor.max(1.0) } else { 1.0 };
        self
    }

    /// Replace the retryable status set
    pub fn retryable_statuses(mut self, statuses: impl Into<Vec<u16>>) -> Self {
        self.retryable_statuses = statuses.into();
        self
    }

    /// Total attempts including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay slept before retry number `retry_index` (0-based)
    ///
    /// `initial_delay * backoff_factor^retry_index`, capped at `max_delay`.
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        let factor = self.backoff_factor.max(1.0).powi(retry_index.min(i32::MAX as u32) as i32);
        let secs = self.initial_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    /// Whether a failed attempt should be retried
    pub fn is_retryable(&self, error: &CallError) -> bool {
        match error {
            CallError::Status { status, .. } => self.retryable_statuses.contains(status),
            CallError::Timeout(_) | CallError::Connect(_) => true,
            CallError::Cancelled | CallError::Decode(_) | CallError::Other(_) => false,
        }
    }
}

/// Terminal outcome of a retried call
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RetryError {
    /// Non-retryable failure; returned after the attempt that produced it
    #[error(transparent)]
    Failed(CallError),

    /// Every attempt failed with a retryable error
    #[error("max retries exceeded after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: CallError },

    /// Caller cancelled during an attempt or a backoff sleep
    #[error("call cancelled")]
    Cancelled,
}

/// Runs fallible upstream calls under a [`RetryPolicy`]
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Create a new executor
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Policy in effect
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails permanently, exhausts the
    /// policy or `cancel` fires.
    pub async fn execute<F, Fut, T>(&self, mut operation: F, cancel: &CancelToken) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, CallError>>,
    {
        let attempts = self.policy.max_attempts();
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }
            attempt += 1;

            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(
                            "Operation succeeded on attempt {} after {} retries",
                            attempt,
                            attempt - 1
                        );
                    }
                    return Ok(value);
                }
                Err(CallError::Cancelled) => return Err(RetryError::Cancelled),
                Err(e) => e,
            };

            if !self.policy.is_retryable(&error) {
                debug!("Attempt {} failed permanently: {}", attempt, error);
                return Err(RetryError::Failed(error));
            }

            if attempt >= attempts {
                warn!("All {} attempts exhausted: {}", attempts, error);
                metrics::RETRY_EXHAUSTED_TOTAL.inc();
                return Err(RetryError::Exhausted {
                    attempts,
                    last: error,
                });
            }

            let delay = self.policy.delay_for(attempt - 1);
            warn!(
                "Attempt {} failed: {}, retrying after {:?}",
                attempt, error, delay
            );
            metrics::RETRY_ATTEMPTS_TOTAL.inc();

            if !cancel.sleep(delay).await {
                return Err(RetryError::Cancelled);
            }
        }
    }
}

/// Serialize durations as integer milliseconds
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
