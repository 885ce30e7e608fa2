// HTTP surface: webhook intake, health and Prometheus metrics
//
// POST /webhooks/{project}/{environment}  verify + dispatch
// GET  /health                            liveness
// GET  /metrics                           Prometheus text (when enabled)

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::crypto::CredentialCipher;
use crate::directory::StaticDirectory;
use crate::gateway::{Gateway, GatewayError};
use crate::metrics;
use crate::rate_limit::RateLimiter;
use crate::retry::RetryExecutor;
use crate::tenant::{validate_shop_domain, ClientFactory, ClientPool, TenantKey};
use crate::upstream::HttpClientFactory;
use crate::webhooks::{
    default_handlers, verify, WebhookDispatcher, WebhookEvent, HMAC_HEADER, SHOP_DOMAIN_HEADER,
    TOPIC_HEADER,
};

/// Source of per-tenant webhook secrets
#[async_trait]
pub trait WebhookSecrets: Send + Sync {
    async fn webhook_secret(&self, key: &TenantKey) -> Result<String, GatewayError>;
}

#[async_trait]
impl<F: ClientFactory> WebhookSecrets for Gateway<F> {
    async fn webhook_secret(&self, key: &TenantKey) -> Result<String, GatewayError> {
        Gateway::webhook_secret(self, key).await
    }
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub secrets: Arc<dyn WebhookSecrets>,
    pub dispatcher: Arc<WebhookDispatcher>,
    pub metrics_enabled: bool,
}

impl AppState {
    pub fn new(secrets: Arc<dyn WebhookSecrets>, dispatcher: Arc<WebhookDispatcher>) -> Self {
        Self {
            secrets,
            dispatcher,
            metrics_enabled: true,
        }
    }
}

/// Gateway wired from configuration: static directory, HTTP upstream, shared limiter
pub fn build_gateway(config: &Config, cipher: CredentialCipher) -> Arc<Gateway<HttpClientFactory>> {
    let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
    let retry = Arc::new(RetryExecutor::new(config.retry.clone()));
    let pool = ClientPool::new(HttpClientFactory::new(config.upstream.clone()), limiter, retry);
    let directory = StaticDirectory::new(config.tenants.clone());
    info!("Tenant directory loaded with {} tenant(s)", directory.len());
    Arc::new(Gateway::new(Arc::new(directory), cipher, Arc::new(pool)))
}

/// Build the handler state for `serve`
pub async fn build_state(config: &Config, cipher: CredentialCipher) -> AppState {
    let gateway = build_gateway(config, cipher);
    let dispatcher = Arc::new(WebhookDispatcher::new());
    for handler in default_handlers(Some(gateway.invalidator())) {
        dispatcher.register_handler(handler).await;
    }

    AppState {
        secrets: gateway,
        dispatcher,
        metrics_enabled: config.metrics.enabled,
    }
}

/// Router over `state`
pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/webhooks/{project}/{environment}", post(webhook_handler))
        .route("/health", get(health_handler));
    if state.metrics_enabled {
        app = app.route("/metrics", get(metrics_handler));
    }
    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Run the HTTP server until Ctrl-C
pub async fn serve(config: &Config, cipher: CredentialCipher) -> Result<()> {
    metrics::init().context("Failed to initialize metrics")?;

    let state = build_state(config, cipher).await;
    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

fn reject(status: StatusCode, reason: &str, message: String) -> Response {
    metrics::WEBHOOKS_REJECTED_TOTAL.with_label_values(&[reason]).inc();
    (status, Json(json!({ "error": message }))).into_response()
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

async fn webhook_handler(
    State(state): State<AppState>,
    Path((project, environment)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let key = match TenantKey::parse(&project, &environment) {
        Ok(key) => key,
        Err(e) => return reject(StatusCode::BAD_REQUEST, "invalid_tenant", e.to_string()),
    };
    let shop = header(&headers, SHOP_DOMAIN_HEADER);
    if let Some(Err(e)) = shop.map(validate_shop_domain) {
        return reject(StatusCode::BAD_REQUEST, "invalid_shop_domain", e.to_string());
    }
    let Some(signature) = header(&headers, HMAC_HEADER) else {
        return reject(StatusCode::BAD_REQUEST, "missing_header", format!("missing {} header", HMAC_HEADER));
    };
    let Some(topic) = header(&headers, TOPIC_HEADER) else {
        return reject(StatusCode::BAD_REQUEST, "missing_header", format!("missing {} header", TOPIC_HEADER));
    };

    let secret = match state.secrets.webhook_secret(&key).await {
        Ok(secret) => secret,
        Err(GatewayError::TenantNotConfigured(_)) => {
            return reject(StatusCode::NOT_FOUND, "unknown_tenant", format!("tenant {} is not configured", key));
        }
        Err(e) => {
            error!(tenant = %key, error = %e, "Webhook secret lookup failed");
            return reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                "secret_unavailable",
                "webhook secret unavailable".to_string(),
            );
        }
    };

    if let Err(e) = verify(&body, signature, &secret) {
        warn!(tenant = %key, topic, error = %e, "Rejected webhook");
        return reject(StatusCode::UNAUTHORIZED, "invalid_signature", e.to_string());
    }

    let mut event = WebhookEvent::new(topic, body).with_tenant(key.clone()).verified();
    if let Some(shop) = shop {
        event = event.with_shop(shop);
    }
    metrics::WEBHOOKS_RECEIVED_TOTAL.with_label_values(&[topic]).inc();
    debug!(tenant = %key, topic, event_id = %event.id, "Webhook verified");

    let report = state.dispatcher.dispatch(&event).await;
    (
        StatusCode::OK,
        Json(json!({ "received": true, "handled": report.succeeded })),
    )
        .into_response()
}

/// Metrics endpoint handler
async fn metrics_handler() -> Response {
    match metrics::gather_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error gathering metrics: {}", e),
            )
                .into_response()
        }
    }
}

/// Health check endpoint
async fn health_handler() -> impl IntoResponse {
    StatusCode::OK
}
