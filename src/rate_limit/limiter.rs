//! Rate Limiter
//!
//! Per-account token buckets shared by every tenant client. The bucket map is
//! only locked to find or create a bucket; each bucket has its own lock, and no
//! lock is held while a caller sleeps.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::bucket::RateBucket;
use super::config::RateLimitConfig;
use crate::cancel::CancelToken;
use crate::metrics;
use crate::upstream::CallError;

/// Reasons a wait ends without a token
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// Caller cancelled while waiting
    #[error("rate limit wait cancelled")]
    Cancelled,

    /// No token became available within the wait ceiling
    #[error("rate limit wait for {account} exceeded {waited:?}")]
    WaitExceeded { account: String, waited: Duration },
}

impl From<RateLimitError> for CallError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::Cancelled => CallError::Cancelled,
            other => CallError::Other(other.to_string()),
        }
    }
}

/// Normalize an upstream account (shop domain) into a bucket key
pub fn account_key(shop: &str) -> String {
    shop.trim().to_ascii_lowercase()
}

/// Parse a `used/limit` call-limit header value
pub fn parse_call_limit(value: &str) -> Option<(u32, u32)> {
    let (used, limit) = value.split_once('/')?;
    let used = used.trim().parse().ok()?;
    let limit = limit.trim().parse().ok()?;
    Some((used, limit))
}

/// Token-bucket limiter keyed by upstream account
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: RwLock<HashMap<String, Arc<Mutex<RateBucket>>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// Limiter configuration
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Get or lazily create the bucket for an account
    fn bucket(&self, account: &str) -> Arc<Mutex<RateBucket>> {
        if let Some(bucket) = self.buckets.read().get(account) {
            return Arc::clone(bucket);
        }

        let mut buckets = self.buckets.write();
        let bucket = buckets.entry(account.to_string()).or_insert_with(|| {
            debug!("Creating rate bucket for {}", account);
            Arc::new(Mutex::new(RateBucket::new(
                self.config.max_requests,
                self.config.window(),
            )))
        });
        Arc::clone(bucket)
    }

    /// Take one token without waiting
    pub fn try_acquire(&self, account: &str) -> bool {
        if !self.config.enabled {
            return true;
        }
        let bucket = self.bucket(account);
        let acquired = bucket.lock().try_take_at(Instant::now());
        acquired
    }

    /// Take one token, sleeping until one accrues.
    ///
    /// Each insufficient-token observation sleeps once for the time until the
    /// next token (at least `min_wait`) and re-checks. Fails with
    /// [`RateLimitError::Cancelled`] as soon as `cancel` fires, or
    /// [`RateLimitError::WaitExceeded`] once `max_wait` has elapsed.
    pub async fn wait(&self, account: &str, cancel: &CancelToken) -> Result<(), RateLimitError> {
        if !self.config.enabled {
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(RateLimitError::Cancelled);
        }

        let bucket = self.bucket(account);
        let start = Instant::now();
        let deadline = start + self.config.max_wait_duration();
        let mut waited = false;

        loop {
            let now = Instant::now();
            let sleep_for = {
                let mut guard = bucket.lock();
                if guard.try_take_at(now) {
                    None
                } else {
                    Some(guard.time_until_token().max(self.config.min_wait_duration()))
                }
            };

            let Some(sleep_for) = sleep_for else {
                if waited {
                    metrics::RATE_LIMIT_WAIT_SECONDS.observe(start.elapsed().as_secs_f64());
                }
                return Ok(());
            };

            if now >= deadline {
                metrics::RATE_LIMIT_ABORTS_TOTAL
                    .with_label_values(&["wait_exceeded"])
                    .inc();
                return Err(RateLimitError::WaitExceeded {
                    account: account.to_string(),
                    waited: now - start,
                });
            }

            if !waited {
                waited = true;
                metrics::RATE_LIMIT_WAITS_TOTAL.inc();
            }

            let sleep_for = sleep_for.min(deadline - now);
            trace!("Rate limited on {}, sleeping {:?}", account, sleep_for);
            if !cancel.sleep(sleep_for).await {
                metrics::RATE_LIMIT_ABORTS_TOTAL
                    .with_label_values(&["cancelled"])
                    .inc();
                return Err(RateLimitError::Cancelled);
            }
        }
    }

    /// Overwrite the bucket from an observed `used/limit` pair
    pub fn update_from_response(&self, account: &str, used: u32, limit: u32) {
        if limit == 0 {
            return;
        }
        let bucket = self.bucket(account);
        bucket.lock().reconcile_at(used, limit, Instant::now());
        debug!("Reconciled rate bucket for {}: {}/{}", account, used, limit);
    }

    /// Reconcile from a raw call-limit header; malformed values are ignored
    pub fn update_from_header(&self, account: &str, header_value: &str) {
        match parse_call_limit(header_value) {
            Some((used, limit)) => self.update_from_response(account, used, limit),
            None => debug!(
                "Ignoring malformed call limit header for {}: {:?}",
                account, header_value
            ),
        }
    }

    /// Whole tokens currently available for an account
    pub fn remaining(&self, account: &str) -> u32 {
        let bucket = self.bucket(account);
        let mut guard = bucket.lock();
        guard.refill_at(Instant::now());
        guard.tokens().floor() as u32
    }

    /// Number of accounts with a bucket
    pub fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u32, window: Duration) -> RateLimiter {
        RateLimiter::new(RateLimitConfig::with_limits(max, window))
    }

    #[test]
    fn test_parse_call_limit() {
        assert_eq!(parse_call_limit("12/40"), Some((12, 40)));
        assert_eq!(parse_call_limit(" 1 / 80 "), Some((1, 80)));
        assert_eq!(parse_call_limit("12"), None);
        assert_eq!(parse_call_limit("a/b"), None);
        assert_eq!(parse_call_limit(""), None);
    }

    #[test]
    fn test_account_key_normalized() {
        assert_eq!(account_key(" Demo.MyShopify.com "), "demo.myshopify.com");
    }

    #[test]
    fn test_try_acquire_drains_bucket() {
        let limiter = limiter(3, Duration::from_secs(60));
        assert!(limiter.try_acquire("a"));
        assert!(limiter.try_acquire("a"));
        assert!(limiter.try_acquire("a"));
        assert!(!limiter.try_acquire("a"));
        // Distinct accounts never share a bucket
        assert!(limiter.try_acquire("b"));
        assert_eq!(limiter.bucket_count(), 2);
    }

    #[test]
    fn test_update_from_header() {
        let limiter = RateLimiter::default();
        limiter.update_from_header("shop", "12/40");
        assert_eq!(limiter.remaining("shop"), 28);

        limiter.update_from_header("shop", "garbage");
        assert_eq!(limiter.remaining("shop"), 28);

        limiter.update_from_response("shop", 5, 0);
        assert_eq!(limiter.remaining("shop"), 28);
    }

    #[tokio::test]
    async fn test_wait_immediate_when_tokens_available() {
        let limiter = RateLimiter::default();
        let cancel = CancelToken::new();
        let start = Instant::now();
        for _ in 0..35 {
            limiter.wait("shop", &cancel).await.unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(100));
        assert!(!limiter.try_acquire("shop"));
    }

    #[tokio::test]
    async fn test_wait_blocks_until_refill() {
        // 10 tokens per second => one token every 100ms
        let limiter = limiter(10, Duration::from_secs(1));
        let cancel = CancelToken::new();
        limiter.update_from_response("shop", 10, 10);

        let start = Instant::now();
        limiter.wait("shop", &cancel).await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(90), "waited {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(1), "waited {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_wait_cancelled_promptly() {
        let limiter = RateLimiter::default();
        let cancel = CancelToken::new();
        limiter.update_from_response("shop", 40, 40);

        cancel.cancel_after(Duration::from_millis(50));
        let start = Instant::now();
        let result = limiter.wait("shop", &cancel).await;
        assert_eq!(result, Err(RateLimitError::Cancelled));
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_wait_exceeded() {
        let config = RateLimitConfig::default().max_wait(Duration::from_millis(150));
        let limiter = RateLimiter::new(config);
        limiter.update_from_response("shop", 40, 40);

        let result = limiter.wait("shop", &CancelToken::new()).await;
        assert!(matches!(result, Err(RateLimitError::WaitExceeded { .. })));
    }

    #[tokio::test]
    async fn test_disabled_limiter_admits_everything() {
        let limiter = RateLimiter::new(RateLimitConfig::disabled());
        let cancel = CancelToken::new();
        for _ in 0..1000 {
            limiter.wait("shop", &cancel).await.unwrap();
        }
        assert!(limiter.try_acquire("shop"));
    }
}
