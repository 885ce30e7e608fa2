//! Rate Limit Configuration
//!
//! Bucket sizing and wait bounds for the per-shop limiter.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default requests per window; stays below the provider's 40 per minute
pub const DEFAULT_MAX_REQUESTS: u32 = 35;
/// Default window length in seconds
pub const DEFAULT_WINDOW_SECS: u64 = 60;
/// Shortest sleep between token checks
pub const DEFAULT_MIN_WAIT_MS: u64 = 100;

/// Rate limit configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,

    /// Bucket capacity (requests per window)
    pub max_requests: u32,

    /// Refill window in seconds
    pub window_secs: u64,

    /// Floor applied to every wait sleep, in milliseconds
    pub min_wait_ms: u64,

    /// Longest a single `wait` may block before giving up, in milliseconds
    pub max_wait_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: DEFAULT_MAX_REQUESTS,
            window_secs: DEFAULT_WINDOW_SECS,
            min_wait_ms: DEFAULT_MIN_WAIT_MS,
            max_wait_ms: DEFAULT_WINDOW_SECS * 1000,
        }
    }
}

impl RateLimitConfig {
    /// Create a new rate limit configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration with a custom capacity and window
    pub fn with_limits(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window_secs: window.as_secs().max(1),
            max_wait_ms: window.as_millis() as u64,
            ..Self::default()
        }
    }

    /// Override the wait ceiling
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait_ms = max_wait.as_millis() as u64;
        self
    }

    /// Override the sleep floor
    pub fn min_wait(mut self, min_wait: Duration) -> Self {
        self.min_wait_ms = min_wait.as_millis() as u64;
        self
    }

    /// Apply `SHOP_GATEWAY_RATE_LIMIT_*` overrides in place
    pub fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("SHOP_GATEWAY_RATE_LIMIT_ENABLED") {
            self.enabled = val.parse().unwrap_or(true);
        }

        if let Ok(val) = std::env::var("SHOP_GATEWAY_RATE_LIMIT_MAX_REQUESTS") {
            if let Ok(limit) = val.parse() {
                self.max_requests = limit;
            }
        }

        if let Ok(val) = std::env::var("SHOP_GATEWAY_RATE_LIMIT_WINDOW_SECS") {
            if let Ok(secs) = val.parse() {
                self.window_secs = secs;
            }
        }

        if let Ok(val) = std::env::var("SHOP_GATEWAY_RATE_LIMIT_MAX_WAIT_MS") {
            if let Ok(ms) = val.parse() {
                self.max_wait_ms = ms;
            }
        }
    }

    /// Refill window
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Sleep floor
    pub fn min_wait_duration(&self) -> Duration {
        Duration::from_millis(self.min_wait_ms)
    }

    /// Wait ceiling
    pub fn max_wait_duration(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    /// Disable rate limiting (for testing)
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}
