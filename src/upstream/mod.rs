//! Upstream Commerce API
//!
//! The capability surface cached per tenant by the client pool: OAuth URL
//! generation, token exchange and generic Admin API requests. Resource schemas
//! (products, orders, ...) stay opaque JSON.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::{HttpClientFactory, HttpCommerceApi, UpstreamConfig};

/// Response header carrying `used/limit` for the shop's call bucket
pub const CALL_LIMIT_HEADER: &str = "X-Shopify-Shop-Api-Call-Limit";

/// Request header carrying the shop access token
pub const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

/// Failure of a single upstream call attempt
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallError {
    /// Upstream answered with a non-success status
    #[error("upstream returned HTTP {status}: {body}")]
    Status {
        status: u16,
        body: String,
        /// Raw `used/limit` header value, when present
        call_limit: Option<String>,
    },

    /// Request timed out
    #[error("upstream request timed out: {0}")]
    Timeout(String),

    /// Connection could not be established
    #[error("upstream connection failed: {0}")]
    Connect(String),

    /// Caller cancelled the call
    #[error("call cancelled")]
    Cancelled,

    /// Response body could not be decoded
    #[error("failed to decode upstream response: {0}")]
    Decode(String),

    /// Anything else (request building, rate-limit wait ceiling, ...)
    #[error("{0}")]
    Other(String),
}

impl CallError {
    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            CallError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Call-limit header carried by an error response
    pub fn call_limit(&self) -> Option<&str> {
        match self {
            CallError::Status { call_limit, .. } => call_limit.as_deref(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for CallError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CallError::Timeout(err.to_string())
        } else if err.is_connect() {
            CallError::Connect(err.to_string())
        } else if err.is_decode() {
            CallError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            CallError::Status {
                status: status.as_u16(),
                body: err.to_string(),
                call_limit: None,
            }
        } else {
            CallError::Other(err.to_string())
        }
    }
}

/// HTTP method subset used against the Admin API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApiMethod {
    Get,
    Post,
    Put,
    Delete,
}

/// One Admin API request
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: ApiMethod,
    /// Shop domain, e.g. `example.myshopify.com`
    pub shop: String,
    /// Resource path without version prefix or `.json`, e.g. `products/42`
    pub path: String,
    pub access_token: String,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(shop: &str, path: &str, access_token: &str) -> Self {
        Self {
            method: ApiMethod::Get,
            shop: shop.to_string(),
            path: path.to_string(),
            access_token: access_token.to_string(),
            body: None,
        }
    }

    pub fn with_body(mut self, method: ApiMethod, body: serde_json::Value) -> Self {
        self.method = method;
        self.body = Some(body);
        self
    }
}

/// Successful upstream response
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    /// Raw `used/limit` header value, when present
    pub call_limit: Option<String>,
    pub body: serde_json::Value,
}

/// Result of exchanging an OAuth code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub scope: String,
}

/// Capability interface of an authenticated upstream client
#[async_trait]
pub trait CommerceApi: Send + Sync {
    /// Build the OAuth authorization URL for a shop
    fn authorize_url(
        &self,
        shop: &str,
        scopes: &[String],
        redirect_uri: &str,
        state: &str,
    ) -> Result<String, CallError>;

    /// Exchange an OAuth authorization code for a shop access token
    async fn exchange_token(&self, shop: &str, code: &str) -> Result<AccessToken, CallError>;

    /// Perform an Admin API request
    async fn request(&self, request: &ApiRequest) -> Result<UpstreamResponse, CallError>;
}
