// Configuration File Support
//
// TOML configuration for the gateway with SHOP_GATEWAY_* environment variable
// overrides. The credential encryption key is never read from the file; it
// comes from SHOP_GATEWAY_ENCRYPTION_KEY.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::directory::TenantRecord;
use crate::rate_limit::RateLimitConfig;
use crate::retry::RetryPolicy;
use crate::tenant::{validate_shop_domain, TenantKey};
use crate::upstream::UpstreamConfig;

/// Environment variable holding the base64 credential encryption key
pub const ENCRYPTION_KEY_ENV: &str = "SHOP_GATEWAY_ENCRYPTION_KEY";

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "shop-gateway.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Webhook HTTP server
    pub server: ServerConfig,

    /// Outbound rate limiting
    pub rate_limit: RateLimitConfig,

    /// Outbound retry policy
    pub retry: RetryPolicy,

    /// Upstream Admin API
    pub upstream: UpstreamConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,

    /// Tenant directory; secrets are encrypted blobs
    pub tenants: Vec<TenantRecord>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Webhook server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// `host:port` bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to expose /metrics
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or if
    /// the resulting configuration is invalid. If the config file does not
    /// exist, defaults (plus environment overrides) are used.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - SHOP_GATEWAY_LOG_LEVEL
    /// - SHOP_GATEWAY_LOG_FORMAT
    /// - SHOP_GATEWAY_HOST / SHOP_GATEWAY_PORT
    /// - SHOP_GATEWAY_METRICS_ENABLED
    /// - SHOP_GATEWAY_API_VERSION / SHOP_GATEWAY_UPSTREAM_BASE_URL
    /// - SHOP_GATEWAY_MAX_RETRIES
    /// - SHOP_GATEWAY_RATE_LIMIT_*
    fn apply_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("SHOP_GATEWAY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("SHOP_GATEWAY_LOG_FORMAT") {
            self.logging.format = format;
        }

        if let Ok(host) = std::env::var("SHOP_GATEWAY_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("SHOP_GATEWAY_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                if port > 0 {
                    self.server.port = port;
                }
            }
        }

        if let Ok(enabled) = std::env::var("SHOP_GATEWAY_METRICS_ENABLED") {
            self.metrics.enabled = enabled.parse().unwrap_or(self.metrics.enabled);
        }

        if let Ok(version) = std::env::var("SHOP_GATEWAY_API_VERSION") {
            self.upstream.api_version = version;
        }
        if let Ok(base_url) = std::env::var("SHOP_GATEWAY_UPSTREAM_BASE_URL") {
            self.upstream.base_url = Some(base_url);
        }

        if let Ok(retries) = std::env::var("SHOP_GATEWAY_MAX_RETRIES") {
            if let Ok(retries) = retries.parse::<u32>() {
                if retries <= 10 {
                    self.retry.max_retries = retries;
                }
            }
        }

        self.rate_limit.apply_env();
        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}. Must be one of: trace, debug, info, warn, error", self.logging.level),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!("Invalid log format: {}. Must be one of: json, pretty, compact", self.logging.format),
        }

        if self.server.port == 0 {
            anyhow::bail!("Server port must be > 0");
        }

        if self.rate_limit.enabled {
            if self.rate_limit.max_requests == 0 {
                anyhow::bail!("Rate limit max_requests must be > 0");
            }
            if self.rate_limit.window_secs == 0 {
                anyhow::bail!("Rate limit window_secs must be > 0");
            }
            if self.rate_limit.min_wait_ms == 0 {
                anyhow::bail!("Rate limit min_wait_ms must be > 0");
            }
        }

        if self.retry.backoff_factor < 1.0 || !self.retry.backoff_factor.is_finite() {
            anyhow::bail!("Retry backoff_factor must be >= 1.0");
        }
        if self.retry.max_delay < self.retry.initial_delay {
            anyhow::bail!("Retry max_delay must be >= initial_delay");
        }

        if self.upstream.api_version.trim().is_empty() {
            anyhow::bail!("Upstream api_version must not be empty");
        }
        if self.upstream.timeout_secs == 0 {
            anyhow::bail!("Upstream timeout_secs must be > 0");
        }

        let mut seen = HashSet::new();
        for tenant in &self.tenants {
            let key = TenantKey::parse(&tenant.project_id, &tenant.environment)
                .context("Invalid tenant identifier")?;
            if let Some(shop) = &tenant.shop_domain {
                validate_shop_domain(shop)
                    .with_context(|| format!("Tenant '{}' has an invalid shop_domain", key))?;
            }
            if tenant.api_key.trim().is_empty() || tenant.api_secret.trim().is_empty() {
                anyhow::bail!("Tenant '{}' must have both api_key and api_secret", key);
            }
            if !seen.insert(key.clone()) {
                anyhow::bail!("Tenant '{}' is configured more than once", key);
            }
        }

        Ok(())
    }

    /// Base64 encryption key from the environment
    pub fn encryption_key() -> Result<String> {
        std::env::var(ENCRYPTION_KEY_ENV)
            .with_context(|| format!("{} is not set", ENCRYPTION_KEY_ENV))
    }
}
