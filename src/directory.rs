//! Tenant Directory
//!
//! Read-only lookup of stored tenant credentials. Secrets in a
//! [`TenantRecord`] are encrypted blobs; the gateway decrypts them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::tenant::TenantKey;

/// Stored configuration for one tenant
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    pub project_id: String,

    /// Empty means production
    #[serde(default)]
    pub environment: String,

    pub api_key: String,

    /// API secret, encrypted with the credential cipher
    pub api_secret: String,

    /// Webhook signing secret, encrypted; the API secret is used when absent
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Shop domain this tenant is installed on
    #[serde(default)]
    pub shop_domain: Option<String>,
}

impl TenantRecord {
    /// Cache key derived from project and environment
    pub fn key(&self) -> TenantKey {
        TenantKey::new(&self.project_id, &self.environment)
    }
}

impl std::fmt::Debug for TenantRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantRecord")
            .field("project_id", &self.project_id)
            .field("environment", &self.environment)
            .field("api_key", &self.api_key)
            .field("shop_domain", &self.shop_domain)
            .finish_non_exhaustive()
    }
}

/// Source of stored tenant credentials
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Look up a tenant; `Ok(None)` when it is not configured
    async fn credentials(&self, key: &TenantKey) -> anyhow::Result<Option<TenantRecord>>;
}

/// Directory backed by an in-memory map, usually loaded from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    records: HashMap<TenantKey, TenantRecord>,
}

impl StaticDirectory {
    /// Create a new directory; a later record for the same key replaces an
    /// earlier one
    pub fn new(records: impl IntoIterator<Item = TenantRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|record| (record.key(), record))
            .collect();
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl TenantDirectory for StaticDirectory {
    async fn credentials(&self, key: &TenantKey) -> anyhow::Result<Option<TenantRecord>> {
        Ok(self.records.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(project: &str, env: &str) -> TenantRecord {
        TenantRecord {
            project_id: project.to_string(),
            environment: env.to_string(),
            api_key: "key".to_string(),
            api_secret: "blob".to_string(),
            webhook_secret: None,
            shop_domain: None,
        }
    }

    #[tokio::test]
    async fn test_lookup_by_derived_key() {
        let dir = StaticDirectory::new(vec![record("p1", ""), record("p1", "staging")]);
        assert_eq!(dir.len(), 2);

        let found = dir
            .credentials(&TenantKey::new("p1", "production"))
            .await
            .unwrap();
        assert!(found.is_some());

        let missing = dir.credentials(&TenantKey::new("p2", "")).await.unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let mut rec = record("p1", "");
        rec.api_secret = "encrypted-secret-blob".to_string();
        assert!(!format!("{:?}", rec).contains("encrypted-secret-blob"));
    }
}
