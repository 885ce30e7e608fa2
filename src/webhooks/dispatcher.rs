// Webhook dispatcher - routes verified events to topic handlers
//
// Handlers:
// - are registered at any time, concurrently with dispatch
// - run sequentially in registration order for each event
// - fail independently; one failure never stops later handlers

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::event::WebhookEvent;
use crate::metrics;

/// A consumer of webhook events
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    /// Name used in logs and metrics
    fn name(&self) -> &str;

    /// Whether this handler wants events with `topic`
    fn can_handle(&self, topic: &str) -> bool;

    /// Process one event
    async fn handle(&self, event: &WebhookEvent) -> anyhow::Result<()>;
}

/// Outcome of one dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub matched: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Webhook dispatcher
#[derive(Default)]
pub struct WebhookDispatcher {
    handlers: RwLock<Vec<Arc<dyn WebhookHandler>>>,
}

impl WebhookDispatcher {
    /// Create a new dispatcher with no handlers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler
    pub async fn register_handler(&self, handler: Arc<dyn WebhookHandler>) {
        info!("Registering webhook handler: {}", handler.name());
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Number of registered handlers
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }

    /// Deliver an event to every matching handler
    pub async fn dispatch(&self, event: &WebhookEvent) -> DispatchReport {
        let snapshot: Vec<Arc<dyn WebhookHandler>> = {
            let handlers = self.handlers.read().await;
            handlers
                .iter()
                .filter(|h| h.can_handle(&event.topic))
                .cloned()
                .collect()
        };

        let mut report = DispatchReport {
            matched: snapshot.len(),
            ..Default::default()
        };

        if snapshot.is_empty() {
            warn!(topic = %event.topic, shop = %event.shop(), "No handler found for webhook topic");
            return report;
        }

        for handler in snapshot {
            match handler.handle(event).await {
                Ok(()) => {
                    report.succeeded += 1;
                    debug!(topic = %event.topic, handler = handler.name(), "Webhook event handled");
                }
                Err(e) => {
                    report.failed += 1;
                    metrics::WEBHOOK_HANDLER_FAILURES_TOTAL
                        .with_label_values(&[handler.name()])
                        .inc();
                    error!(
                        topic = %event.topic,
                        handler = handler.name(),
                        error = %format!("{:#}", e),
                        "Webhook handler failed"
                    );
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        name: &'static str,
        prefix: &'static str,
        fail: bool,
        calls: AtomicUsize,
    }

    impl Recorder {
        fn new(name: &'static str, prefix: &'static str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                prefix,
                fail,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl WebhookHandler for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn can_handle(&self, topic: &str) -> bool {
            topic.starts_with(self.prefix)
        }

        async fn handle(&self, _event: &WebhookEvent) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("{} exploded", self.name);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_routes_by_topic() {
        let dispatcher = WebhookDispatcher::new();
        let orders = Recorder::new("orders", "orders/", false);
        let products = Recorder::new("products", "products/", false);
        dispatcher.register_handler(orders.clone()).await;
        dispatcher.register_handler(products.clone()).await;

        let report = dispatcher.dispatch(&WebhookEvent::new("orders/create", "{}")).await;

        assert_eq!(report, DispatchReport { matched: 1, succeeded: 1, failed: 0 });
        assert_eq!(orders.calls.load(Ordering::SeqCst), 1);
        assert_eq!(products.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_match_is_not_an_error() {
        let dispatcher = WebhookDispatcher::new();
        dispatcher.register_handler(Recorder::new("orders", "orders/", false)).await;

        let report = dispatcher.dispatch(&WebhookEvent::new("themes/publish", "{}")).await;
        assert_eq!(report, DispatchReport::default());
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_later_handlers() {
        let dispatcher = WebhookDispatcher::new();
        let broken = Recorder::new("broken", "orders/", true);
        let healthy = Recorder::new("healthy", "orders/", false);
        dispatcher.register_handler(broken.clone()).await;
        dispatcher.register_handler(healthy.clone()).await;

        let report = dispatcher.dispatch(&WebhookEvent::new("orders/paid", "{}")).await;

        assert_eq!(report, DispatchReport { matched: 2, succeeded: 1, failed: 1 });
        assert_eq!(broken.calls.load(Ordering::SeqCst), 1);
        assert_eq!(healthy.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_register_during_dispatch() {
        let dispatcher = Arc::new(WebhookDispatcher::new());
        let mut tasks = Vec::new();
        for i in 0..20 {
            let dispatcher = Arc::clone(&dispatcher);
            tasks.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    dispatcher
                        .register_handler(Recorder::new("orders", "orders/", false))
                        .await;
                } else {
                    dispatcher.dispatch(&WebhookEvent::new("orders/create", "{}")).await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(dispatcher.handler_count().await, 10);
    }
}
