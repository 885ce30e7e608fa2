//! Tenant Client Lifecycle
//!
//! One authenticated upstream client per tenant (project + environment),
//! built at most once per key and cached until explicitly invalidated.
//!
//! # Features
//!
//! - Singleflight construction: concurrent callers for one key share a single
//!   factory call and receive the same client or the same error
//! - Failed constructions are not cached
//! - Explicit invalidation for credential rotation and app uninstalls
//! - Every client shares the process-wide rate limiter and retry executor

pub mod client;
pub mod error;
pub mod key;
pub mod pool;

pub use client::TenantClient;
pub use error::PoolError;
pub use key::{
    validate_environment, validate_project_id, validate_shop_domain, Credentials, KeyError,
    TenantKey, DEFAULT_ENVIRONMENT,
};
pub use pool::{ClientFactory, ClientPool};
