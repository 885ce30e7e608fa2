// Admin API adapter over reqwest
//
// Builds versioned Admin API URLs, attaches the shop access token and surfaces
// the call-limit header so the rate limiter can reconcile its bucket.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{
    AccessToken, ApiMethod, ApiRequest, CallError, CommerceApi, UpstreamResponse,
    ACCESS_TOKEN_HEADER, CALL_LIMIT_HEADER,
};
use crate::tenant::{ClientFactory, Credentials, TenantKey};

/// Admin API version pinned by default
pub const DEFAULT_API_VERSION: &str = "2024-01";

/// Upstream HTTP settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Admin API version segment
    pub api_version: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Base URL replacing `https://{shop}`; used to point at a local mock
    pub base_url: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout_secs: 30,
            base_url: None,
        }
    }
}

impl UpstreamConfig {
    /// Point every request at `base_url` instead of the shop host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn origin(&self, shop: &str) -> String {
        match &self.base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("https://{}", shop),
        }
    }
}

/// Authenticated Admin API client for one app (API key + secret)
#[derive(Clone)]
pub struct HttpCommerceApi {
    client: reqwest::Client,
    credentials: Credentials,
    config: UpstreamConfig,
}

impl std::fmt::Debug for HttpCommerceApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCommerceApi")
            .field("credentials", &self.credentials)
            .field("config", &self.config)
            .finish()
    }
}

impl HttpCommerceApi {
    /// Create a new client
    pub fn new(credentials: Credentials, config: UpstreamConfig) -> Result<Self, CallError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CallError::Other(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            credentials,
            config,
        })
    }

    /// Full URL of an Admin API resource
    pub fn resource_url(&self, shop: &str, path: &str) -> String {
        format!(
            "{}/admin/api/{}/{}.json",
            self.config.origin(shop),
            self.config.api_version,
            path.trim_matches('/')
        )
    }
}

#[async_trait]
impl CommerceApi for HttpCommerceApi {
    fn authorize_url(
        &self,
        shop: &str,
        scopes: &[String],
        redirect_uri: &str,
        state: &str,
    ) -> Result<String, CallError> {
        let base = format!("{}/admin/oauth/authorize", self.config.origin(shop));
        let scope = scopes.join(",");
        let url = reqwest::Url::parse_with_params(
            &base,
            &[
                ("client_id", self.credentials.api_key.as_str()),
                ("scope", scope.as_str()),
                ("redirect_uri", redirect_uri),
                ("state", state),
            ],
        )
        .map_err(|e| CallError::Other(format!("invalid authorize URL: {}", e)))?;
        Ok(url.to_string())
    }

    async fn exchange_token(&self, shop: &str, code: &str) -> Result<AccessToken, CallError> {
        let url = format!("{}/admin/oauth/access_token", self.config.origin(shop));
        let body = serde_json::json!({
            "client_id": self.credentials.api_key,
            "client_secret": self.credentials.api_secret,
            "code": code,
        });

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallError::Status {
                status,
                body,
                call_limit: None,
            });
        }

        response
            .json::<AccessToken>()
            .await
            .map_err(|e| CallError::Decode(e.to_string()))
    }

    async fn request(&self, request: &ApiRequest) -> Result<UpstreamResponse, CallError> {
        let url = self.resource_url(&request.shop, &request.path);
        let builder = match request.method {
            ApiMethod::Get => self.client.get(&url),
            ApiMethod::Post => self.client.post(&url),
            ApiMethod::Put => self.client.put(&url),
            ApiMethod::Delete => self.client.delete(&url),
        };
        let mut builder = builder.header(ACCESS_TOKEN_HEADER, &request.access_token);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let call_limit = response
            .headers()
            .get(CALL_LIMIT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        debug!(
            "{:?} {} -> {} (call limit {:?})",
            request.method, url, status, call_limit
        );

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallError::Status {
                status,
                body,
                call_limit,
            });
        }

        let bytes = response.bytes().await?;
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).map_err(|e| CallError::Decode(e.to_string()))?
        };

        Ok(UpstreamResponse {
            status,
            call_limit,
            body,
        })
    }
}

/// Client factory producing [`HttpCommerceApi`] handles for the pool
#[derive(Debug, Clone, Default)]
pub struct HttpClientFactory {
    config: UpstreamConfig,
}

impl HttpClientFactory {
    /// Create a new factory
    pub fn new(config: UpstreamConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ClientFactory for HttpClientFactory {
    type Client = HttpCommerceApi;

    async fn build(&self, key: &TenantKey, credentials: &Credentials) -> anyhow::Result<Self::Client> {
        if credentials
            .api_key
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            anyhow::bail!("API key for tenant {} contains whitespace or control characters", key);
        }
        debug!("Building upstream client for tenant {}", key);
        Ok(HttpCommerceApi::new(credentials.clone(), self.config.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(config: UpstreamConfig) -> HttpCommerceApi {
        HttpCommerceApi::new(Credentials::new("key", "secret"), config).unwrap()
    }

    #[test]
    fn test_resource_url() {
        let api = api(UpstreamConfig::default());
        assert_eq!(
            api.resource_url("demo.myshopify.com", "/products/42"),
            "https://demo.myshopify.com/admin/api/2024-01/products/42.json"
        );
    }

    #[test]
    fn test_resource_url_with_base_override() {
        let api = api(UpstreamConfig::default().with_base_url("http://127.0.0.1:9000/"));
        assert_eq!(
            api.resource_url("demo.myshopify.com", "shop"),
            "http://127.0.0.1:9000/admin/api/2024-01/shop.json"
        );
    }

    #[test]
    fn test_authorize_url_encodes_params() {
        let api = api(UpstreamConfig::default());
        let url = api
            .authorize_url(
                "demo.myshopify.com",
                &["read_products".to_string(), "write_orders".to_string()],
                "https://app.example.com/callback?x=1",
                "nonce",
            )
            .unwrap();

        assert!(url.starts_with("https://demo.myshopify.com/admin/oauth/authorize?"));
        assert!(url.contains("client_id=key"));
        assert!(url.contains("scope=read_products%2Cwrite_orders"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fapp.example.com%2Fcallback%3Fx%3D1"));
        assert!(url.contains("state=nonce"));
    }

    #[tokio::test]
    async fn test_factory_rejects_malformed_key() {
        let factory = HttpClientFactory::default();
        let key = TenantKey::new("proj", "production");
        let result = factory.build(&key, &Credentials::new("bad key", "secret")).await;
        assert!(result.is_err());

        let ok = factory.build(&key, &Credentials::new("good", "secret")).await;
        assert!(ok.is_ok());
    }
}
