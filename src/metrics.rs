// Prometheus metrics for the gateway
//
// Exposed on the /metrics endpoint of the HTTP server:
// - Client pool activity (counters, gauge)
// - Rate limiter waits (counter, histogram)
// - Retry attempts and exhaustion (counters)
// - Webhook intake and handler failures (counters)

use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder,
};
use std::sync::Arc;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    // Client pool metrics
    pub static ref CLIENT_CONSTRUCTIONS_TOTAL: IntCounter = IntCounter::new(
        "client_pool_constructions_total",
        "Total number of tenant clients constructed"
    ).expect("Failed to create client constructions metric");

    pub static ref CLIENT_CONSTRUCTION_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "client_pool_construction_failures_total",
        "Total number of failed tenant client constructions"
    ).expect("Failed to create client construction failures metric");

    pub static ref CLIENT_CACHE_HITS_TOTAL: IntCounter = IntCounter::new(
        "client_pool_cache_hits_total",
        "Total number of client requests served from the cache"
    ).expect("Failed to create client cache hits metric");

    pub static ref CLIENT_INVALIDATIONS_TOTAL: IntCounter = IntCounter::new(
        "client_pool_invalidations_total",
        "Total number of explicit client invalidations"
    ).expect("Failed to create client invalidations metric");

    pub static ref CACHED_CLIENTS: IntGauge = IntGauge::new(
        "client_pool_cached_clients",
        "Number of tenant clients currently cached"
    ).expect("Failed to create cached clients metric");

    // Rate limiter metrics
    pub static ref RATE_LIMIT_WAITS_TOTAL: IntCounter = IntCounter::new(
        "rate_limit_waits_total",
        "Total number of calls that had to wait for a token"
    ).expect("Failed to create rate limit waits metric");

    pub static ref RATE_LIMIT_WAIT_SECONDS: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new("rate_limit_wait_seconds", "Time spent waiting for a rate limit token"),
    ).expect("Failed to create rate limit wait time metric");

    pub static ref RATE_LIMIT_ABORTS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("rate_limit_aborts_total", "Waits that ended without a token"),
        &["reason"]
    ).expect("Failed to create rate limit aborts metric");

    // Retry metrics
    pub static ref RETRY_ATTEMPTS_TOTAL: IntCounter = IntCounter::new(
        "retry_attempts_total",
        "Total number of retries after a transient failure"
    ).expect("Failed to create retry attempts metric");

    pub static ref RETRY_EXHAUSTED_TOTAL: IntCounter = IntCounter::new(
        "retry_exhausted_total",
        "Total number of calls that exhausted their retry budget"
    ).expect("Failed to create retry exhausted metric");

    // Webhook metrics
    pub static ref WEBHOOKS_RECEIVED_TOTAL: CounterVec = CounterVec::new(
        prometheus::Opts::new("webhooks_received_total", "Verified webhooks received"),
        &["topic"]
    ).expect("Failed to create webhooks received metric");

    pub static ref WEBHOOKS_REJECTED_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("webhooks_rejected_total", "Webhooks rejected before dispatch"),
        &["reason"]
    ).expect("Failed to create webhooks rejected metric");

    pub static ref WEBHOOK_HANDLER_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("webhook_handler_failures_total", "Webhook handler invocations that failed"),
        &["handler"]
    ).expect("Failed to create webhook handler failures metric");
}

fn register(collector: Box<dyn prometheus::core::Collector>) -> prometheus::Result<()> {
    match REGISTRY.register(collector) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Initialize metrics registry; calling it again is a no-op
pub fn init() -> prometheus::Result<()> {
    register(Box::new(CLIENT_CONSTRUCTIONS_TOTAL.clone()))?;
    register(Box::new(CLIENT_CONSTRUCTION_FAILURES_TOTAL.clone()))?;
    register(Box::new(CLIENT_CACHE_HITS_TOTAL.clone()))?;
    register(Box::new(CLIENT_INVALIDATIONS_TOTAL.clone()))?;
    register(Box::new(CACHED_CLIENTS.clone()))?;
    register(Box::new(RATE_LIMIT_WAITS_TOTAL.clone()))?;
    register(Box::new(RATE_LIMIT_WAIT_SECONDS.clone()))?;
    register(Box::new(RATE_LIMIT_ABORTS_TOTAL.clone()))?;
    register(Box::new(RETRY_ATTEMPTS_TOTAL.clone()))?;
    register(Box::new(RETRY_EXHAUSTED_TOTAL.clone()))?;
    register(Box::new(WEBHOOKS_RECEIVED_TOTAL.clone()))?;
    register(Box::new(WEBHOOKS_REJECTED_TOTAL.clone()))?;
    register(Box::new(WEBHOOK_HANDLER_FAILURES_TOTAL.clone()))?;
    Ok(())
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        assert!(init().is_ok());
        assert!(init().is_ok());
    }

    #[test]
    fn test_gather_contains_pool_metrics() {
        init().unwrap();
        CLIENT_CONSTRUCTIONS_TOTAL.inc();
        let text = gather_metrics().unwrap();
        assert!(text.contains("client_pool_constructions_total"));
    }

    #[test]
    fn test_labelled_webhook_metrics() {
        init().unwrap();
        WEBHOOKS_REJECTED_TOTAL.with_label_values(&["invalid_signature"]).inc();
        let text = gather_metrics().unwrap();
        assert!(text.contains("webhooks_rejected_total"));
    }
}
