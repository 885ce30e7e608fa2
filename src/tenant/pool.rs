//! Tenant Client Pool
//!
//! Caches one [`TenantClient`] per [`TenantKey`] and guarantees that, for a
//! given key, at most one construction runs at a time. Concurrent callers for
//! the same key wait on the leader's watch channel and receive the same `Arc`
//! or the same error.
//!
//! Locking: the in-flight map is always taken before the client map. Neither
//! lock is held across an `.await`.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{Credentials, PoolError, TenantClient, TenantKey};
use crate::cancel::CancelToken;
use crate::metrics;
use crate::rate_limit::RateLimiter;
use crate::retry::RetryExecutor;

/// Builds the upstream capability for one tenant
#[async_trait]
pub trait ClientFactory: Send + Sync + 'static {
    /// Upstream handle produced per tenant
    type Client: Send + Sync + 'static;

    /// Construct an authenticated upstream handle
    async fn build(&self, key: &TenantKey, credentials: &Credentials) -> anyhow::Result<Self::Client>;
}

type BuildOutcome<C> = Result<Arc<TenantClient<C>>, PoolError>;

/// One construction in progress
struct InFlight<C> {
    id: u64,
    rx: watch::Receiver<Option<BuildOutcome<C>>>,
}

type InFlightMap<C> = Mutex<HashMap<TenantKey, InFlight<C>>>;

/// Removes the leader's in-flight entry if the leader never finished, so
/// waiters observe a closed channel and retry.
struct LeaderGuard<'a, C> {
    in_flight: &'a InFlightMap<C>,
    key: TenantKey,
    id: u64,
    armed: bool,
}

impl<C> Drop for LeaderGuard<'_, C> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut in_flight = self.in_flight.lock();
        if in_flight.get(&self.key).is_some_and(|f| f.id == self.id) {
            in_flight.remove(&self.key);
            debug!(tenant = %self.key, "Abandoned client construction");
        }
    }
}

enum Role<C> {
    Leader(u64, watch::Sender<Option<BuildOutcome<C>>>),
    Waiter(watch::Receiver<Option<BuildOutcome<C>>>),
}

/// In-memory, per-tenant client cache
pub struct ClientPool<F: ClientFactory> {
    factory: Arc<F>,
    limiter: Arc<RateLimiter>,
    retry: Arc<RetryExecutor>,
    clients: RwLock<HashMap<TenantKey, Arc<TenantClient<F::Client>>>>,
    in_flight: InFlightMap<F::Client>,
    next_id: AtomicU64,
}

impl<F: ClientFactory> std::fmt::Debug for ClientPool<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientPool")
            .field("cached", &self.cached_count())
            .field("in_flight", &self.in_flight_count())
            .finish_non_exhaustive()
    }
}

impl<F: ClientFactory> ClientPool<F> {
    /// Create a new pool; every client shares `limiter` and `retry`
    pub fn new(factory: F, limiter: Arc<RateLimiter>, retry: Arc<RetryExecutor>) -> Self {
        Self {
            factory: Arc::new(factory),
            limiter,
            retry,
            clients: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn factory(&self) -> &Arc<F> {
        &self.factory
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn retry(&self) -> &Arc<RetryExecutor> {
        &self.retry
    }

    /// Get the cached client for `key`, constructing it once if absent.
    ///
    /// A cached client is returned as-is even when `credentials` differ from
    /// the ones it was built with; rotation goes through
    /// [`ClientPool::invalidate_client`].
    pub async fn get_client(
        &self,
        key: &TenantKey,
        credentials: &Credentials,
    ) -> Result<Arc<TenantClient<F::Client>>, PoolError> {
        self.get_client_with(key, credentials, &CancelToken::new()).await
    }

    /// [`ClientPool::get_client`] with a cancellation signal for the wait
    pub async fn get_client_with(
        &self,
        key: &TenantKey,
        credentials: &Credentials,
        cancel: &CancelToken,
    ) -> Result<Arc<TenantClient<F::Client>>, PoolError> {
        if !credentials.is_complete() {
            return Err(PoolError::InvalidCredentials {
                tenant: key.clone(),
                reason: "API key and secret must be non-empty".to_string(),
            });
        }

        loop {
            if let Some(client) = self.cached(key) {
                return Ok(client);
            }

            let role = {
                let mut in_flight = self.in_flight.lock();
                if let Some(client) = self.cached(key) {
                    return Ok(client);
                }
                match in_flight.get(key) {
                    Some(existing) => Role::Waiter(existing.rx.clone()),
                    None => {
                        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                        let (tx, rx) = watch::channel(None);
                        in_flight.insert(key.clone(), InFlight { id, rx });
                        Role::Leader(id, tx)
                    }
                }
            };

            match role {
                Role::Leader(id, tx) => return self.lead(key, credentials, cancel, id, tx).await,
                Role::Waiter(mut rx) => {
                    let outcome = tokio::select! {
                        _ = cancel.cancelled() => return Err(PoolError::Cancelled(key.clone())),
                        res = rx.wait_for(Option::is_some) => res.ok().and_then(|value| value.clone()),
                    };
                    match outcome {
                        Some(outcome) => return outcome,
                        // Leader went away without publishing; contend again
                        None => debug!(tenant = %key, "Construction leader dropped, retrying"),
                    }
                }
            }
        }
    }

    fn cached(&self, key: &TenantKey) -> Option<Arc<TenantClient<F::Client>>> {
        let client = self.clients.read().get(key).map(Arc::clone)?;
        metrics::CLIENT_CACHE_HITS_TOTAL.inc();
        Some(client)
    }

    async fn lead(
        &self,
        key: &TenantKey,
        credentials: &Credentials,
        cancel: &CancelToken,
        id: u64,
        tx: watch::Sender<Option<BuildOutcome<F::Client>>>,
    ) -> BuildOutcome<F::Client> {
        let mut guard = LeaderGuard {
            in_flight: &self.in_flight,
            key: key.clone(),
            id,
            armed: true,
        };

        let built = tokio::select! {
            _ = cancel.cancelled() => return Err(PoolError::Cancelled(key.clone())),
            built = self.factory.build(key, credentials) => built,
        };

        let outcome = match built {
            Ok(upstream) => {
                metrics::CLIENT_CONSTRUCTIONS_TOTAL.inc();
                Ok(Arc::new(TenantClient::new(
                    key.clone(),
                    credentials.clone(),
                    upstream,
                    Arc::clone(&self.limiter),
                    Arc::clone(&self.retry),
                )))
            }
            Err(e) => {
                metrics::CLIENT_CONSTRUCTION_FAILURES_TOTAL.inc();
                warn!(tenant = %key, error = %e, "Client construction failed");
                Err(PoolError::ClientConstructionFailed {
                    tenant: key.clone(),
                    reason: format!("{:#}", e),
                })
            }
        };

        {
            let mut in_flight = self.in_flight.lock();
            let still_current = in_flight.get(key).is_some_and(|f| f.id == id);
            if still_current {
                in_flight.remove(key);
                if let Ok(client) = &outcome {
                    let mut clients = self.clients.write();
                    clients.insert(key.clone(), Arc::clone(client));
                    metrics::CACHED_CLIENTS.set(clients.len() as i64);
                    info!(tenant = %key, "Created new upstream client for tenant");
                }
            } else {
                debug!(tenant = %key, "Key invalidated during construction, not caching");
            }
            guard.armed = false;
        }

        // No receivers left is fine; nobody was waiting.
        let _ = tx.send(Some(outcome.clone()));
        outcome
    }

    /// Drop the cached client and any in-flight construction guard for `key`
    pub fn invalidate_client(&self, key: &TenantKey) {
        let mut in_flight = self.in_flight.lock();
        let aborted = in_flight.remove(key).is_some();
        let mut clients = self.clients.write();
        let removed = clients.remove(key).is_some();
        metrics::CACHED_CLIENTS.set(clients.len() as i64);

        if removed || aborted {
            metrics::CLIENT_INVALIDATIONS_TOTAL.inc();
            info!(tenant = %key, "Invalidated upstream client for tenant");
        }
    }

    /// Number of cached clients
    pub fn cached_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Whether a client is cached for `key`
    pub fn contains(&self, key: &TenantKey) -> bool {
        self.clients.read().contains_key(key)
    }

    /// Number of constructions currently registered
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }
}
