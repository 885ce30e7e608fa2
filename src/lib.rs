//! Shop Gateway Library
//!
//! Multi-tenant access layer for the Shopify Admin API: a singleflight pool of
//! per-tenant clients, per-shop rate limiting, retries with backoff, encrypted
//! credentials and verified webhook dispatch.

pub mod cancel;
pub mod config;
pub mod crypto;
pub mod directory;
pub mod gateway;
pub mod logging;
pub mod metrics;
pub mod rate_limit;
pub mod retry;
pub mod server;
pub mod tenant;
pub mod upstream;
pub mod webhooks;

pub use cancel::CancelToken;
pub use gateway::{Gateway, GatewayError};
