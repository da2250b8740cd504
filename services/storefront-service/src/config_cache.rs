use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common_auth::Principal;
use common_http_errors::ApiError;
use common_security::{ensure_capability, Capability, SecurityError};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::CacheBackend;
use crate::metrics::record_cache;
use crate::models::{Tenant, TenantConfig};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);
pub const DEFAULT_CACHE_PREFIX: &str = "tenant_config";
const CACHE_OP_TIMEOUT: Duration = Duration::from_millis(500);
const MAX_TENANT_NAME: usize = 63;

/// First path segments that a tenant name would shadow.
pub const RESERVED_TENANT_NAMES: &[&str] = &["tenant", "orders", "superadmin", "session", "healthz", "metrics"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("tenant '{0}' not found")]
    NotFound(String),
    #[error("tenant '{0}' already exists")]
    TenantExists(String),
    #[error("tenant '{0}' still has orders")]
    TenantHasOrders(String),
    #[error("invalid tenant name")]
    InvalidName,
    #[error(transparent)]
    Forbidden(#[from] SecurityError),
    #[error("tenant store failure: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ConfigError {
    pub fn store<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ConfigError::Store(Box::new(err))
    }

    pub fn into_api_error(self, trace_id: Option<Uuid>) -> ApiError {
        match self {
            ConfigError::NotFound(_) => ApiError::not_found("tenant_not_found", trace_id),
            ConfigError::TenantExists(name) => {
                ApiError::conflict("tenant_exists", format!("tenant '{name}' already exists"), trace_id)
            }
            ConfigError::TenantHasOrders(name) => ApiError::conflict(
                "tenant_has_orders",
                format!("tenant '{name}' has orders and cannot be deleted"),
                trace_id,
            ),
            ConfigError::InvalidName => ApiError::bad_request("invalid_tenant_name", trace_id),
            ConfigError::Forbidden(err) => err.into_api_error(trace_id),
            ConfigError::Store(err) => ApiError::internal(err, trace_id),
        }
    }
}

/// Authoritative tenant configuration store.
#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn get_config(&self, tenant: &str) -> Result<Option<TenantConfig>, ConfigError>;
    /// Fails with `NotFound` when the tenant does not exist.
    async fn update_config(&self, tenant: &str, config: &TenantConfig) -> Result<(), ConfigError>;
    async fn list(&self) -> Result<Vec<Tenant>, ConfigError>;
    async fn create(&self, tenant: &Tenant) -> Result<(), ConfigError>;
    async fn delete(&self, tenant: &str) -> Result<(), ConfigError>;
}

pub fn validate_tenant_name(name: &str) -> Result<(), ConfigError> {
    let well_formed = !name.is_empty()
        && name.len() <= MAX_TENANT_NAME
        && name.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
    if !well_formed || RESERVED_TENANT_NAMES.contains(&name) {
        return Err(ConfigError::InvalidName);
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub prefix: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
            prefix: DEFAULT_CACHE_PREFIX.to_string(),
        }
    }
}

/// Read-through, delete-on-write cache over tenant configuration. The store is
/// always written first; cache faults are logged and never reach the caller.
#[derive(Clone)]
pub struct ConfigCache {
    store: Arc<dyn TenantStore>,
    cache: Arc<dyn CacheBackend>,
    settings: CacheSettings,
}

impl ConfigCache {
    pub fn new(store: Arc<dyn TenantStore>, cache: Arc<dyn CacheBackend>, settings: CacheSettings) -> Self {
        Self { store, cache, settings }
    }

    pub fn cache_key(&self, tenant: &str) -> String {
        format!("{}:{}", self.settings.prefix, tenant)
    }

    async fn bounded<T, F>(fut: F) -> anyhow::Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        tokio::time::timeout(CACHE_OP_TIMEOUT, fut)
            .await
            .map_err(|_| anyhow::anyhow!("cache operation timed out"))?
    }

    pub async fn get(&self, tenant: &str) -> Result<TenantConfig, ConfigError> {
        let key = self.cache_key(tenant);
        match Self::bounded(self.cache.get(&key)).await {
            Ok(Some(raw)) => match serde_json::from_str::<TenantConfig>(&raw) {
                Ok(config) => {
                    record_cache("hit");
                    debug!(tenant, "tenant config cache hit");
                    return Ok(config);
                }
                Err(err) => {
                    record_cache("decode_error");
                    warn!(tenant, error = %err, "discarding undecodable cached tenant config");
                }
            },
            Ok(None) => record_cache("miss"),
            Err(err) => {
                record_cache("backend_error");
                warn!(tenant, error = %err, "tenant config cache read failed; using store");
            }
        }

        let config = self
            .store
            .get_config(tenant)
            .await?
            .ok_or_else(|| ConfigError::NotFound(tenant.to_string()))?;

        match serde_json::to_string(&config) {
            Ok(raw) => {
                if let Err(err) = Self::bounded(self.cache.set_ex(&key, &raw, self.settings.ttl)).await {
                    record_cache("backend_error");
                    warn!(tenant, error = %err, "failed to populate tenant config cache");
                }
            }
            Err(err) => warn!(tenant, error = %err, "failed to serialize tenant config for cache"),
        }
        Ok(config)
    }

    /// Store first, then drop the cache entry. A failed store write leaves the cache untouched.
    pub async fn update(
        &self,
        principal: &Principal,
        tenant: &str,
        config: TenantConfig,
    ) -> Result<TenantConfig, ConfigError> {
        ensure_capability(principal, Capability::TenantAdmin(tenant))?;
        self.store.update_config(tenant, &config).await?;
        self.invalidate(tenant).await;
        info!(tenant, subject_id = principal.subject_id(), "tenant config updated");
        Ok(config)
    }

    pub async fn invalidate(&self, tenant: &str) {
        let key = self.cache_key(tenant);
        match Self::bounded(self.cache.del(&key)).await {
            Ok(()) => record_cache("invalidated"),
            Err(err) => {
                // Entry ages out within the TTL.
                record_cache("backend_error");
                warn!(tenant, error = %err, "failed to invalidate tenant config cache entry");
            }
        }
    }

    pub async fn list_tenants(&self, principal: &Principal) -> Result<Vec<Tenant>, ConfigError> {
        ensure_capability(principal, Capability::SuperAdmin)?;
        self.store.list().await
    }

    pub async fn create_tenant(&self, principal: &Principal, tenant: Tenant) -> Result<Tenant, ConfigError> {
        ensure_capability(principal, Capability::SuperAdmin)?;
        validate_tenant_name(&tenant.name)?;
        self.store.create(&tenant).await?;
        // A stale entry could survive from a previously deleted tenant of the same name.
        self.invalidate(&tenant.name).await;
        info!(tenant = %tenant.name, "tenant created");
        Ok(tenant)
    }

    pub async fn delete_tenant(&self, principal: &Principal, tenant: &str) -> Result<(), ConfigError> {
        ensure_capability(principal, Capability::SuperAdmin)?;
        self.store.delete(tenant).await?;
        self.invalidate(tenant).await;
        info!(tenant, "tenant deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_names_are_slugs() {
        assert!(validate_tenant_name("pizzaco").is_ok());
        assert!(validate_tenant_name("burger-haus-2").is_ok());
        assert!(validate_tenant_name("").is_err());
        assert!(validate_tenant_name("Pizza").is_err());
        assert!(validate_tenant_name("a/b").is_err());
        assert!(validate_tenant_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn reserved_segments_cannot_be_tenants() {
        for name in RESERVED_TENANT_NAMES {
            assert!(validate_tenant_name(name).is_err(), "{name} should be reserved");
        }
    }
}
