//! Token Bucket
//!
//! Continuous-refill bucket for one upstream account. Refill is lazy: every
//! access credits `elapsed * max_tokens / window` tokens, capped at capacity.

use std::time::{Duration, Instant};

/// Token bucket state for one account key
#[derive(Debug, Clone)]
pub struct RateBucket {
    tokens: f64,
    max_tokens: f64,
    window: Duration,
    last_refill: Instant,
}

impl RateBucket {
    /// Create a full bucket
    pub fn new(max_tokens: u32, window: Duration) -> Self {
        Self::new_at(max_tokens, window, Instant::now())
    }

    /// Create a full bucket whose refill clock starts at `now`
    pub fn new_at(max_tokens: u32, window: Duration, now: Instant) -> Self {
        Self {
            tokens: max_tokens as f64,
            max_tokens: max_tokens as f64,
            window: window.max(Duration::from_millis(1)),
            last_refill: now,
        }
    }

    /// Tokens credited per second
    pub fn refill_rate(&self) -> f64 {
        self.max_tokens / self.window.as_secs_f64()
    }

    /// Credit tokens for the time elapsed since the last refill
    pub fn refill_at(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed.is_zero() {
            return;
        }
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.refill_rate()).min(self.max_tokens);
        self.last_refill = now;
    }

    /// Refill then take one token if available
    pub fn try_take_at(&mut self, now: Instant) -> bool {
        self.refill_at(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until one whole token will be available, from the last refill
    pub fn time_until_token(&self) -> Duration {
        if self.tokens >= 1.0 {
            return Duration::ZERO;
        }
        let rate = self.refill_rate();
        if rate <= 0.0 {
            return self.window;
        }
        Duration::from_secs_f64((1.0 - self.tokens) / rate)
    }

    /// Overwrite state from an observed `used/limit` pair
    pub fn reconcile_at(&mut self, used: u32, limit: u32, now: Instant) {
        if limit == 0 {
            return;
        }
        self.max_tokens = limit as f64;
        self.tokens = limit.saturating_sub(used) as f64;
        self.last_refill = now;
    }

    /// Current (fractional) token count without refilling
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    /// Bucket capacity
    pub fn max_tokens(&self) -> f64 {
        self.max_tokens
    }
}
