//! Rate Limiting Module
//!
//! Client-side throttling of outbound Admin API calls, one token bucket per
//! upstream account (shop domain).
//!
//! # Features
//!
//! - Token bucket algorithm with lazy, continuous refill
//! - Cancellable waits that never spin and never hold a lock while sleeping
//! - Reconciliation from the provider's `used/limit` call-limit header
//! - Wait ceiling so a starved caller fails instead of blocking forever
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 RateLimiter                   │
//! │   RwLock<HashMap<account, Arc<Mutex<..>>>>    │
//! ├──────────────────────────────────────────────┤
//! │  ┌────────────┐  ┌────────────┐              │
//! │  │ RateBucket │  │ RateBucket │   ...        │
//! │  │ shop-a     │  │ shop-b     │              │
//! │  └────────────┘  └────────────┘              │
//! └──────────────────────────────────────────────┘
//! ```

pub mod bucket;
pub mod config;
pub mod limiter;

pub use bucket::RateBucket;
pub use config::RateLimitConfig;
pub use limiter::{account_key, parse_call_limit, RateLimitError, RateLimiter};
