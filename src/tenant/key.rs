// Tenant identity and credentials

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Environment used when a tenant does not name one
pub const DEFAULT_ENVIRONMENT: &str = "production";

lazy_static! {
    static ref PROJECT_ID: Regex = Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap();
    // No '-', so a key splits back at its last dash
    static ref ENVIRONMENT: Regex = Regex::new(r"^[A-Za-z0-9_]{1,32}$").unwrap();
    static ref SHOP_NAME: Regex = Regex::new(r"^[a-z0-9-]{3,40}$").unwrap();
    static ref CUSTOM_DOMAIN: Regex =
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9-]{0,61}[A-Za-z0-9]?\.[A-Za-z]{2,}$").unwrap();
}

const MYSHOPIFY_SUFFIX: &str = ".myshopify.com";

/// Malformed tenant or shop identifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("invalid project id {0:?}: expected 1-64 of [A-Za-z0-9_-]")]
    InvalidProjectId(String),

    #[error("invalid environment {0:?}: expected 1-32 of [A-Za-z0-9_]")]
    InvalidEnvironment(String),

    #[error("invalid shop domain {0:?}")]
    InvalidShopDomain(String),
}

/// Check a project id
pub fn validate_project_id(project_id: &str) -> Result<(), KeyError> {
    if PROJECT_ID.is_match(project_id) {
        Ok(())
    } else {
        Err(KeyError::InvalidProjectId(project_id.to_string()))
    }
}

/// Check an environment name; empty is allowed and means production
pub fn validate_environment(environment: &str) -> Result<(), KeyError> {
    if environment.is_empty() || ENVIRONMENT.is_match(environment) {
        Ok(())
    } else {
        Err(KeyError::InvalidEnvironment(environment.to_string()))
    }
}

/// Check a shop domain: `{name}.myshopify.com` with a 3-40 character
/// lowercase name, or a plain custom domain
pub fn validate_shop_domain(domain: &str) -> Result<(), KeyError> {
    let valid = match domain.strip_suffix(MYSHOPIFY_SUFFIX) {
        Some(name) => SHOP_NAME.is_match(name),
        None => CUSTOM_DOMAIN.is_match(domain),
    };
    if valid {
        Ok(())
    } else {
        Err(KeyError::InvalidShopDomain(domain.to_string()))
    }
}

/// Cache key for one project/environment pair, rendered `{project}-{environment}`
///
/// Environments never contain `-`, so distinct validated pairs always map
/// to distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantKey(String);

impl TenantKey {
    /// Derive the key for a trusted project and environment; an empty
    /// environment means production
    pub fn new(project_id: &str, environment: &str) -> Self {
        let environment = environment.trim();
        let environment = if environment.is_empty() {
            DEFAULT_ENVIRONMENT
        } else {
            environment
        };
        Self(format!("{}-{}", project_id.trim(), environment))
    }

    /// Derive the key for untrusted input, rejecting malformed parts
    pub fn parse(project_id: &str, environment: &str) -> Result<Self, KeyError> {
        let project_id = project_id.trim();
        let environment = environment.trim();
        validate_project_id(project_id)?;
        validate_environment(environment)?;
        Ok(Self::new(project_id, environment))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Project half of the key
    pub fn project_id(&self) -> &str {
        self.split().0
    }

    /// Environment half of the key
    pub fn environment(&self) -> &str {
        self.split().1
    }

    fn split(&self) -> (&str, &str) {
        self.0
            .rsplit_once('-')
            .unwrap_or((self.0.as_str(), DEFAULT_ENVIRONMENT))
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TenantKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Plaintext API key and secret for one tenant
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Both halves are non-empty
    pub fn is_complete(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.api_secret.trim().is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        assert_eq!(TenantKey::new("proj-1", "staging").as_str(), "proj-1-staging");
        assert_eq!(TenantKey::new("proj-1", "").as_str(), "proj-1-production");
        assert_eq!(TenantKey::new("proj-1", "  ").to_string(), "proj-1-production");
    }

    #[test]
    fn test_key_parts() {
        let key = TenantKey::new("proj-1", "staging");
        assert_eq!(key.project_id(), "proj-1");
        assert_eq!(key.environment(), "staging");
        assert_eq!(TenantKey::new("acme", "").environment(), "production");
    }

    #[test]
    fn test_parse_rejects_ambiguous_environment() {
        // "a-b" + "c" and "a" + "b-c" would both render "a-b-c"
        assert!(TenantKey::parse("a-b", "c").is_ok());
        assert_eq!(
            TenantKey::parse("a", "b-c"),
            Err(KeyError::InvalidEnvironment("b-c".to_string()))
        );
    }

    #[test]
    fn test_parse_project_id() {
        assert_eq!(TenantKey::parse(" acme_1 ", "").unwrap().as_str(), "acme_1-production");
        assert!(TenantKey::parse("", "production").is_err());
        assert!(TenantKey::parse("acme!", "production").is_err());
        assert!(TenantKey::parse("../etc", "production").is_err());
        assert!(TenantKey::parse(&"p".repeat(65), "production").is_err());
        assert!(TenantKey::parse(&"p".repeat(64), "production").is_ok());
    }

    #[test]
    fn test_shop_domain_validation() {
        assert!(validate_shop_domain("acme-store.myshopify.com").is_ok());
        assert!(validate_shop_domain("shop.example.com").is_err());
        assert!(validate_shop_domain("example.com").is_ok());
        assert!(validate_shop_domain("ab.myshopify.com").is_err());
        assert!(validate_shop_domain("Acme.myshopify.com").is_err());
        assert!(validate_shop_domain("").is_err());
        assert!(validate_shop_domain("evil.com/path").is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let creds = Credentials::new("key123", "super-secret");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("key123"));
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn test_credentials_completeness() {
        assert!(Credentials::new("k", "s").is_complete());
        assert!(!Credentials::new("", "s").is_complete());
        assert!(!Credentials::new("k", "").is_complete());
    }
}
