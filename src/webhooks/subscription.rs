// Webhook subscriptions
//
// Registers topics for a shop through the Admin API so callbacks arrive at
// `{webhook_url}/{project}/{environment}`, the route served by `server`.

use serde_json::json;
use tracing::{error, info};

use super::event::WebhookTopic;
use crate::cancel::CancelToken;
use crate::retry::RetryError;
use crate::tenant::{validate_shop_domain, KeyError, TenantClient, TenantKey};
use crate::upstream::{ApiMethod, ApiRequest, CommerceApi};

/// One created subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic: WebhookTopic,
    /// Upstream webhook id, when the response carried one
    pub id: Option<u64>,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SubscriptionError {
    #[error(transparent)]
    InvalidShop(#[from] KeyError),

    #[error("failed to subscribe {shop} to {topic}: {source}")]
    Create {
        shop: String,
        topic: WebhookTopic,
        #[source]
        source: RetryError,
    },
}

/// Callback address for a tenant under the public webhook base URL
pub fn callback_address(webhook_url: &str, key: &TenantKey) -> String {
    format!(
        "{}/{}/{}",
        webhook_url.trim_end_matches('/'),
        key.project_id(),
        key.environment()
    )
}

/// Subscribe `shop` to `topics`, stopping at the first failure.
///
/// Each topic is one `POST webhooks` through the tenant client, so it is rate
/// limited and retried like any other Admin API call.
pub async fn subscribe_webhooks<U: CommerceApi + 'static>(
    client: &TenantClient<U>,
    shop: &str,
    access_token: &str,
    topics: &[WebhookTopic],
    webhook_url: &str,
    cancel: &CancelToken,
) -> Result<Vec<Subscription>, SubscriptionError> {
    validate_shop_domain(shop)?;
    let address = callback_address(webhook_url, client.key());
    let mut created = Vec::with_capacity(topics.len());

    for &topic in topics {
        let body = json!({
            "webhook": {
                "topic": topic.as_str(),
                "address": address,
                "format": "json",
            }
        });
        let request = ApiRequest::get(shop, "webhooks", access_token).with_body(ApiMethod::Post, body);

        let response = client.request(request, cancel).await.map_err(|source| {
            error!(shop, topic = %topic, error = %source, "Failed to create webhook");
            SubscriptionError::Create {
                shop: shop.to_string(),
                topic,
                source,
            }
        })?;

        let id = response.body["webhook"]["id"].as_u64();
        info!(shop, topic = %topic, address = %address, webhook_id = ?id, "Webhook subscription created");
        created.push(Subscription {
            topic,
            id,
            address: address.clone(),
        });
    }

    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_address() {
        let key = TenantKey::new("acme-shop", "staging");
        assert_eq!(
            callback_address("https://hooks.example.com/webhooks/", &key),
            "https://hooks.example.com/webhooks/acme-shop/staging"
        );
        assert_eq!(
            callback_address("https://hooks.example.com/webhooks", &TenantKey::new("acme", "")),
            "https://hooks.example.com/webhooks/acme/production"
        );
    }
}
