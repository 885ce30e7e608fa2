//! Built-in topic handlers
//!
//! Each handler accepts a fixed set of topics, requires a JSON object payload
//! and records the event as a structured log line. The uninstall handler also
//! evicts the tenant's cached client, since the shop's token is revoked.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::dispatcher::WebhookHandler;
use super::event::WebhookEvent;
use crate::gateway::Invalidator;

const ORDER_TOPICS: &[&str] = &[
    "orders/create",
    "orders/updated",
    "orders/cancelled",
    "orders/paid",
    "orders/fulfilled",
    "orders/partially_fulfilled",
];

const PRODUCT_TOPICS: &[&str] = &["products/create", "products/update", "products/delete"];

const CUSTOMER_TOPICS: &[&str] = &[
    "customers/create",
    "customers/update",
    "customers/delete",
    "customers/enable",
    "customers/disable",
];

const APP_UNINSTALLED_TOPIC: &str = "app/uninstalled";

/// Parse the payload and log one resource event
fn record_resource(event: &WebhookEvent, resource: &str) -> anyhow::Result<()> {
    let payload = event
        .json_object()
        .map_err(|e| anyhow::anyhow!("failed to parse {} webhook payload: {}", resource, e))?;
    let id = payload.get("id").map(|v| v.to_string()).unwrap_or_default();

    info!(
        event_id = %event.id,
        topic = %event.topic,
        shop = %event.shop(),
        resource,
        resource_id = %id,
        "Processing {} webhook event",
        resource
    );
    Ok(())
}

/// Order lifecycle events
#[derive(Debug, Default)]
pub struct OrderHandler;

#[async_trait]
impl WebhookHandler for OrderHandler {
    fn name(&self) -> &str {
        "order"
    }

    fn can_handle(&self, topic: &str) -> bool {
        ORDER_TOPICS.contains(&topic)
    }

    async fn handle(&self, event: &WebhookEvent) -> anyhow::Result<()> {
        record_resource(event, "order")
    }
}

/// Product catalog events
#[derive(Debug, Default)]
pub struct ProductHandler;

#[async_trait]
impl WebhookHandler for ProductHandler {
    fn name(&self) -> &str {
        "product"
    }

    fn can_handle(&self, topic: &str) -> bool {
        PRODUCT_TOPICS.contains(&topic)
    }

    async fn handle(&self, event: &WebhookEvent) -> anyhow::Result<()> {
        record_resource(event, "product")
    }
}

/// Customer account events
#[derive(Debug, Default)]
pub struct CustomerHandler;

#[async_trait]
impl WebhookHandler for CustomerHandler {
    fn name(&self) -> &str {
        "customer"
    }

    fn can_handle(&self, topic: &str) -> bool {
        CUSTOMER_TOPICS.contains(&topic)
    }

    async fn handle(&self, event: &WebhookEvent) -> anyhow::Result<()> {
        record_resource(event, "customer")
    }
}

/// App uninstall: the shop's token is gone, so drop the tenant's client
#[derive(Default)]
pub struct AppUninstalledHandler {
    invalidate: Option<Invalidator>,
}

impl AppUninstalledHandler {
    pub fn new(invalidate: Invalidator) -> Self {
        Self {
            invalidate: Some(invalidate),
        }
    }
}

#[async_trait]
impl WebhookHandler for AppUninstalledHandler {
    fn name(&self) -> &str {
        "app_uninstalled"
    }

    fn can_handle(&self, topic: &str) -> bool {
        topic == APP_UNINSTALLED_TOPIC
    }

    async fn handle(&self, event: &WebhookEvent) -> anyhow::Result<()> {
        record_resource(event, "shop")?;

        match (&event.tenant, &self.invalidate) {
            (Some(tenant), Some(invalidate)) => {
                info!(tenant = %tenant, shop = %event.shop(), "App uninstalled, evicting tenant client");
                invalidate(tenant);
            }
            (None, _) => warn!(shop = %event.shop(), "App uninstalled event without tenant"),
            (Some(_), None) => {}
        }
        Ok(())
    }
}

/// The four built-in handlers; `invalidate` is wired into the uninstall handler
pub fn default_handlers(invalidate: Option<Invalidator>) -> Vec<Arc<dyn WebhookHandler>> {
    let uninstall = match invalidate {
        Some(invalidate) => AppUninstalledHandler::new(invalidate),
        None => AppUninstalledHandler::default(),
    };
    vec![
        Arc::new(OrderHandler),
        Arc::new(ProductHandler),
        Arc::new(CustomerHandler),
        Arc::new(uninstall),
    ]
}
