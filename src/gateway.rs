//! Gateway facade
//!
//! Resolves a tenant from the directory, decrypts its secrets and hands out
//! the pooled client. This is the entry point the rest of the platform uses.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::crypto::{CipherError, CredentialCipher};
use crate::directory::{TenantDirectory, TenantRecord};
use crate::tenant::{ClientFactory, ClientPool, Credentials, PoolError, TenantClient, TenantKey};

/// Errors surfaced by the gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No credentials stored for the tenant
    #[error("tenant {0} is not configured")]
    TenantNotConfigured(TenantKey),

    /// The directory lookup failed
    #[error("tenant directory lookup failed for {tenant}: {reason}")]
    Directory { tenant: TenantKey, reason: String },

    /// A stored secret could not be decrypted
    #[error("failed to decrypt secret for tenant {tenant}: {source}")]
    Decrypt {
        tenant: TenantKey,
        #[source]
        source: CipherError,
    },

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Callback that drops the cached client for a tenant
pub type Invalidator = Arc<dyn Fn(&TenantKey) + Send + Sync>;

/// Tenant-aware entry point over directory, cipher and pool
pub struct Gateway<F: ClientFactory> {
    directory: Arc<dyn TenantDirectory>,
    cipher: CredentialCipher,
    pool: Arc<ClientPool<F>>,
}

impl<F: ClientFactory> Gateway<F> {
    /// Create a new gateway
    pub fn new(directory: Arc<dyn TenantDirectory>, cipher: CredentialCipher, pool: Arc<ClientPool<F>>) -> Self {
        Self {
            directory,
            cipher,
            pool,
        }
    }

    pub fn pool(&self) -> &Arc<ClientPool<F>> {
        &self.pool
    }

    pub fn cipher(&self) -> &CredentialCipher {
        &self.cipher
    }

    async fn record(&self, key: &TenantKey) -> Result<TenantRecord, GatewayError> {
        self.directory
            .credentials(key)
            .await
            .map_err(|e| GatewayError::Directory {
                tenant: key.clone(),
                reason: format!("{:#}", e),
            })?
            .ok_or_else(|| GatewayError::TenantNotConfigured(key.clone()))
    }

    fn decrypt(&self, key: &TenantKey, blob: &str) -> Result<String, GatewayError> {
        self.cipher.decrypt(blob).map_err(|source| GatewayError::Decrypt {
            tenant: key.clone(),
            source,
        })
    }

    /// Client for a project/environment pair (empty environment = production)
    pub async fn client_for(
        &self,
        project_id: &str,
        environment: &str,
        cancel: Option<&CancelToken>,
    ) -> Result<Arc<TenantClient<F::Client>>, GatewayError> {
        let key = TenantKey::new(project_id, environment);
        let record = self.record(&key).await?;
        let credentials = Credentials::new(record.api_key.clone(), self.decrypt(&key, &record.api_secret)?);
        debug!(tenant = %key, "Resolved tenant credentials");
        self.get(&key, &credentials, cancel).await
    }

    async fn get(
        &self,
        key: &TenantKey,
        credentials: &Credentials,
        cancel: Option<&CancelToken>,
    ) -> Result<Arc<TenantClient<F::Client>>, GatewayError> {
        let client = match cancel {
            Some(cancel) => self.pool.get_client_with(key, credentials, cancel).await?,
            None => self.pool.get_client(key, credentials).await?,
        };
        Ok(client)
    }

    /// Plaintext secret used to verify webhooks for a tenant
    pub async fn webhook_secret(&self, key: &TenantKey) -> Result<String, GatewayError> {
        let record = self.record(key).await?;
        let blob = record.webhook_secret.as_deref().unwrap_or(&record.api_secret);
        self.decrypt(key, blob)
    }

    /// Drop the cached client so the next call rebuilds with fresh credentials
    pub fn rotate(&self, key: &TenantKey) {
        info!(tenant = %key, "Rotating tenant client");
        self.pool.invalidate_client(key);
    }

    /// Callback handed to components that must evict clients (app uninstalls)
    pub fn invalidator(&self) -> Invalidator {
        let pool = Arc::clone(&self.pool);
        Arc::new(move |key: &TenantKey| pool.invalidate_client(key))
    }
}
