//! Client pool error types

use thiserror::Error;

use super::TenantKey;

/// Errors returned by [`super::ClientPool::get_client`]
///
/// `Clone` so one construction failure can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// API key or secret missing; no construction was attempted
    #[error("invalid credentials for tenant {tenant}: {reason}")]
    InvalidCredentials { tenant: TenantKey, reason: String },

    /// The client factory failed
    #[error("failed to construct client for tenant {tenant}: {reason}")]
    ClientConstructionFailed { tenant: TenantKey, reason: String },

    /// The caller cancelled while waiting for a construction
    #[error("client construction for tenant {0} cancelled")]
    Cancelled(TenantKey),
}

impl PoolError {
    /// Tenant the error refers to
    pub fn tenant(&self) -> &TenantKey {
        match self {
            PoolError::InvalidCredentials { tenant, .. }
            | PoolError::ClientConstructionFailed { tenant, .. }
            | PoolError::Cancelled(tenant) => tenant,
        }
    }
}
