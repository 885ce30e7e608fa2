//! Tenant-scoped client handle
//!
//! Every call made through a [`TenantClient`] waits on the shared rate limiter
//! for its shop, runs under the shared retry executor and reconciles the
//! shop's bucket from the call-limit header of every response, including
//! throttled and failed ones.

use std::future::Future;
use std::sync::Arc;

use super::{Credentials, TenantKey};
use crate::cancel::CancelToken;
use crate::rate_limit::{account_key, RateLimiter};
use crate::retry::{RetryError, RetryExecutor};
use crate::upstream::{ApiRequest, CallError, CommerceApi, UpstreamResponse};

/// Authenticated upstream handle bound to one tenant
pub struct TenantClient<U> {
    key: TenantKey,
    credentials: Credentials,
    upstream: Arc<U>,
    limiter: Arc<RateLimiter>,
    retry: Arc<RetryExecutor>,
}

impl<U> std::fmt::Debug for TenantClient<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantClient")
            .field("key", &self.key)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl<U: Send + Sync + 'static> TenantClient<U> {
    /// Create a new tenant client
    pub fn new(
        key: TenantKey,
        credentials: Credentials,
        upstream: U,
        limiter: Arc<RateLimiter>,
        retry: Arc<RetryExecutor>,
    ) -> Self {
        Self {
            key,
            credentials,
            upstream: Arc::new(upstream),
            limiter,
            retry,
        }
    }

    pub fn key(&self) -> &TenantKey {
        &self.key
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn upstream(&self) -> &Arc<U> {
        &self.upstream
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn retry(&self) -> &Arc<RetryExecutor> {
        &self.retry
    }

    /// Run `op` against the upstream for `shop`, throttled and retried.
    ///
    /// Every attempt (including retries) takes a rate-limit token first.
    pub async fn call<F, Fut>(
        &self,
        shop: &str,
        cancel: &CancelToken,
        mut op: F,
    ) -> Result<UpstreamResponse, RetryError>
    where
        F: FnMut(Arc<U>) -> Fut,
        Fut: Future<Output = Result<UpstreamResponse, CallError>>,
    {
        let account = account_key(shop);
        let limiter = &self.limiter;

        self.retry
            .execute(
                || {
                    let attempt = op(Arc::clone(&self.upstream));
                    let account = account.clone();
                    async move {
                        limiter.wait(&account, cancel).await?;
                        let result = attempt.await;
                        let header = match &result {
                            Ok(response) => response.call_limit.as_deref(),
                            Err(err) => err.call_limit(),
                        };
                        if let Some(header) = header {
                            limiter.update_from_header(&account, header);
                        }
                        result
                    }
                },
                cancel,
            )
            .await
    }
}

impl<U: CommerceApi + 'static> TenantClient<U> {
    /// Perform one Admin API request through the throttled, retried path
    pub async fn request(
        &self,
        request: ApiRequest,
        cancel: &CancelToken,
    ) -> Result<UpstreamResponse, RetryError> {
        let shop = request.shop.clone();
        let request = Arc::new(request);
        self.call(&shop, cancel, move |api| {
            let request = Arc::clone(&request);
            async move { api.request(&request).await }
        })
        .await
    }
}
