use async_trait::async_trait;
use futures::future::join_all;
use shop_gateway::cancel::CancelToken;
use shop_gateway::rate_limit::RateLimiter;
use shop_gateway::retry::RetryExecutor;
use shop_gateway::tenant::{ClientFactory, ClientPool, Credentials, PoolError, TenantKey};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Factory whose builds block until the test releases a permit
struct GatedFactory {
    builds: AtomicUsize,
    gate: Arc<Semaphore>,
    fail: bool,
}

impl GatedFactory {
    fn new(fail: bool) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (
            Self {
                builds: AtomicUsize::new(0),
                gate: Arc::clone(&gate),
                fail,
            },
            gate,
        )
    }
}

#[async_trait]
impl ClientFactory for GatedFactory {
    type Client = usize;

    async fn build(&self, _key: &TenantKey, _credentials: &Credentials) -> anyhow::Result<usize> {
        let n = self.builds.fetch_add(1, Ordering::SeqCst);
        let permit = self.gate.acquire().await?;
        permit.forget();
        if self.fail {
            anyhow::bail!("invalid API key");
        }
        Ok(n)
    }
}

fn pool(factory: GatedFactory) -> Arc<ClientPool<GatedFactory>> {
    Arc::new(ClientPool::new(
        factory,
        Arc::new(RateLimiter::default()),
        Arc::new(RetryExecutor::default()),
    ))
}

fn creds() -> Credentials {
    Credentials::new("api-key", "api-secret")
}

async fn wait_for_builds(pool: &ClientPool<GatedFactory>, n: usize) {
    while pool.factory().builds.load(Ordering::SeqCst) < n {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_use_builds_once() {
    let (factory, gate) = GatedFactory::new(false);
    let pool = pool(factory);
    let key = TenantKey::new("acme", "production");

    let tasks: Vec<_> = (0..64)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let key = key.clone();
            tokio::spawn(async move { pool.get_client(&key, &creds()).await })
        })
        .collect();

    wait_for_builds(&pool, 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    gate.add_permits(1);

    let clients: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    assert_eq!(pool.factory().builds.load(Ordering::SeqCst), 1);
    assert!(clients.iter().all(|c| Arc::ptr_eq(c, &clients[0])));
    assert_eq!(pool.cached_count(), 1);
    assert_eq!(pool.in_flight_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failure_shared_then_retried() {
    let (factory, gate) = GatedFactory::new(true);
    let pool = pool(factory);
    let key = TenantKey::new("acme", "staging");

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let key = key.clone();
            tokio::spawn(async move { pool.get_client(&key, &creds()).await })
        })
        .collect();

    wait_for_builds(&pool, 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    gate.add_permits(1);

    let errors: Vec<PoolError> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap_err())
        .collect();

    assert_eq!(pool.factory().builds.load(Ordering::SeqCst), 1);
    assert!(errors.iter().all(|e| e == &errors[0]));
    assert!(matches!(errors[0], PoolError::ClientConstructionFailed { .. }));
    assert!(!pool.contains(&key));

    // Failures are not cached
    gate.add_permits(1);
    assert!(pool.get_client(&key, &creds()).await.is_err());
    assert_eq!(pool.factory().builds.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_keys_build_independently() {
    let (factory, gate) = GatedFactory::new(false);
    let pool = pool(factory);
    gate.add_permits(3);

    let keys = [
        TenantKey::new("acme", "production"),
        TenantKey::new("acme", "staging"),
        TenantKey::new("globex", ""),
    ];
    for key in &keys {
        pool.get_client(key, &creds()).await.unwrap();
    }

    assert_eq!(pool.cached_count(), 3);
    assert_eq!(pool.factory().builds.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_invalidate_during_construction_is_not_cached() {
    let (factory, gate) = GatedFactory::new(false);
    let pool = pool(factory);
    let key = TenantKey::new("acme", "production");

    let leader = {
        let pool = Arc::clone(&pool);
        let key = key.clone();
        tokio::spawn(async move { pool.get_client(&key, &creds()).await })
    };
    wait_for_builds(&pool, 1).await;

    pool.invalidate_client(&key);
    gate.add_permits(1);

    // The leader's caller still gets its client, but the pool forgets it
    assert!(leader.await.unwrap().is_ok());
    assert!(!pool.contains(&key));

    gate.add_permits(1);
    pool.get_client(&key, &creds()).await.unwrap();
    assert_eq!(pool.factory().builds.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cancelled_leader_releases_key() {
    let (factory, gate) = GatedFactory::new(false);
    let pool = pool(factory);
    let key = TenantKey::new("acme", "production");

    let cancel = CancelToken::new();
    let leader = {
        let pool = Arc::clone(&pool);
        let key = key.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { pool.get_client_with(&key, &creds(), &cancel).await })
    };
    wait_for_builds(&pool, 1).await;

    cancel.cancel();
    let err = leader.await.unwrap().unwrap_err();
    assert_eq!(err, PoolError::Cancelled(key.clone()));
    assert_eq!(pool.in_flight_count(), 0);

    gate.add_permits(1);
    let client = tokio::time::timeout(Duration::from_secs(2), pool.get_client(&key, &creds()))
        .await
        .unwrap();
    assert!(client.is_ok());
}

#[tokio::test]
async fn test_cancelled_waiter_returns_promptly() {
    let (factory, gate) = GatedFactory::new(false);
    let pool = pool(factory);
    let key = TenantKey::new("acme", "production");

    let leader = {
        let pool = Arc::clone(&pool);
        let key = key.clone();
        tokio::spawn(async move { pool.get_client(&key, &creds()).await })
    };
    wait_for_builds(&pool, 1).await;

    let cancel = CancelToken::new();
    let _timer = cancel.cancel_after(Duration::from_millis(10));
    let waited = tokio::time::timeout(
        Duration::from_secs(1),
        pool.get_client_with(&key, &creds(), &cancel),
    )
    .await
    .unwrap();
    assert!(matches!(waited, Err(PoolError::Cancelled(_))));

    gate.add_permits(1);
    assert!(leader.await.unwrap().is_ok());
    assert_eq!(pool.factory().builds.load(Ordering::SeqCst), 1);
}
