// Inbound webhook events and well-known topics

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::tenant::TenantKey;

/// Header naming the event topic
pub const TOPIC_HEADER: &str = "X-Shopify-Topic";
/// Header naming the originating shop
pub const SHOP_DOMAIN_HEADER: &str = "X-Shopify-Shop-Domain";

/// A received webhook
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub topic: String,
    /// Originating upstream account
    pub shop_domain: Option<String>,
    /// Tenant the callback was addressed to
    pub tenant: Option<TenantKey>,
    /// Raw body exactly as received
    pub payload: Bytes,
    pub verified: bool,
    pub received_at: DateTime<Utc>,
}

impl WebhookEvent {
    /// Create an unverified event
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            shop_domain: None,
            tenant: None,
            payload: payload.into(),
            verified: false,
            received_at: Utc::now(),
        }
    }

    pub fn with_shop(mut self, shop_domain: impl Into<String>) -> Self {
        self.shop_domain = Some(shop_domain.into());
        self
    }

    pub fn with_tenant(mut self, tenant: TenantKey) -> Self {
        self.tenant = Some(tenant);
        self
    }

    pub fn verified(mut self) -> Self {
        self.verified = true;
        self
    }

    /// Parse the payload as a JSON object
    pub fn json_object(&self) -> anyhow::Result<serde_json::Map<String, serde_json::Value>> {
        let value: serde_json::Value = serde_json::from_slice(&self.payload)?;
        match value {
            serde_json::Value::Object(map) => Ok(map),
            other => anyhow::bail!("expected a JSON object payload, got {}", json_kind(&other)),
        }
    }

    /// Shop domain for logging
    pub fn shop(&self) -> &str {
        self.shop_domain.as_deref().unwrap_or("unknown")
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Topics subscribed to by default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebhookTopic {
    #[serde(rename = "orders/create")]
    OrdersCreate,
    #[serde(rename = "orders/updated")]
    OrdersUpdated,
    #[serde(rename = "orders/cancelled")]
    OrdersCancelled,
    #[serde(rename = "products/create")]
    ProductsCreate,
    #[serde(rename = "products/update")]
    ProductsUpdate,
    #[serde(rename = "products/delete")]
    ProductsDelete,
    #[serde(rename = "customers/create")]
    CustomersCreate,
    #[serde(rename = "customers/update")]
    CustomersUpdate,
    #[serde(rename = "customers/delete")]
    CustomersDelete,
    #[serde(rename = "app/uninstalled")]
    AppUninstalled,
}

impl WebhookTopic {
    pub const ALL: [WebhookTopic; 10] = [
        WebhookTopic::OrdersCreate,
        WebhookTopic::OrdersUpdated,
        WebhookTopic::OrdersCancelled,
        WebhookTopic::ProductsCreate,
        WebhookTopic::ProductsUpdate,
        WebhookTopic::ProductsDelete,
        WebhookTopic::CustomersCreate,
        WebhookTopic::CustomersUpdate,
        WebhookTopic::CustomersDelete,
        WebhookTopic::AppUninstalled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookTopic::OrdersCreate => "orders/create",
            WebhookTopic::OrdersUpdated => "orders/updated",
            WebhookTopic::OrdersCancelled => "orders/cancelled",
            WebhookTopic::ProductsCreate => "products/create",
            WebhookTopic::ProductsUpdate => "products/update",
            WebhookTopic::ProductsDelete => "products/delete",
            WebhookTopic::CustomersCreate => "customers/create",
            WebhookTopic::CustomersUpdate => "customers/update",
            WebhookTopic::CustomersDelete => "customers/delete",
            WebhookTopic::AppUninstalled => "app/uninstalled",
        }
    }

    /// Topics a newly installed shop is subscribed to
    pub fn defaults() -> Vec<WebhookTopic> {
        vec![
            WebhookTopic::OrdersCreate,
            WebhookTopic::OrdersUpdated,
            WebhookTopic::ProductsCreate,
            WebhookTopic::ProductsUpdate,
            WebhookTopic::AppUninstalled,
        ]
    }
}

impl fmt::Display for WebhookTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookTopic {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WebhookTopic::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown webhook topic: {}", s))
    }
}
