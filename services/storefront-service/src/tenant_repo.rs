use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::config_cache::{ConfigError, TenantStore};
use crate::models::{Tenant, TenantConfig};
use crate::order_repo::{is_unique_violation, InMemoryOrderStore};

const FOREIGN_KEY_VIOLATION: &str = "23503";

impl From<sqlx::Error> for ConfigError {
    fn from(value: sqlx::Error) -> Self {
        ConfigError::store(value)
    }
}

#[derive(sqlx::FromRow)]
struct TenantRow {
    name: String,
    config: Json<TenantConfig>,
}

// ---------------- Postgres Implementation ----------------

#[derive(Clone)]
pub struct PgTenantStore {
    db: PgPool,
}

impl PgTenantStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TenantStore for PgTenantStore {
    async fn get_config(&self, tenant: &str) -> Result<Option<TenantConfig>, ConfigError> {
        let config: Option<Json<TenantConfig>> =
            sqlx::query_scalar("SELECT config FROM tenants WHERE name = $1")
                .bind(tenant)
                .fetch_optional(&self.db)
                .await?;
        Ok(config.map(|Json(config)| config))
    }

    async fn update_config(&self, tenant: &str, config: &TenantConfig) -> Result<(), ConfigError> {
        let result = sqlx::query("UPDATE tenants SET config = $2, updated_at = now() WHERE name = $1")
            .bind(tenant)
            .bind(Json(config))
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ConfigError::NotFound(tenant.to_string()));
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Tenant>, ConfigError> {
        let rows = sqlx::query_as::<_, TenantRow>("SELECT name, config FROM tenants ORDER BY name")
            .fetch_all(&self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| Tenant { name: row.name, config: row.config.0 })
            .collect())
    }

    async fn create(&self, tenant: &Tenant) -> Result<(), ConfigError> {
        sqlx::query("INSERT INTO tenants (name, config) VALUES ($1, $2)")
            .bind(&tenant.name)
            .bind(Json(&tenant.config))
            .execute(&self.db)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    ConfigError::TenantExists(tenant.name.clone())
                } else {
                    ConfigError::from(err)
                }
            })?;
        Ok(())
    }

    async fn delete(&self, tenant: &str) -> Result<(), ConfigError> {
        let result = sqlx::query("DELETE FROM tenants WHERE name = $1")
            .bind(tenant)
            .execute(&self.db)
            .await
            .map_err(|err| {
                let has_orders = matches!(
                    &err,
                    sqlx::Error::Database(db) if db.code().as_deref() == Some(FOREIGN_KEY_VIOLATION)
                );
                if has_orders {
                    ConfigError::TenantHasOrders(tenant.to_string())
                } else {
                    ConfigError::from(err)
                }
            })?;
        if result.rows_affected() == 0 {
            return Err(ConfigError::NotFound(tenant.to_string()));
        }
        Ok(())
    }
}

// ---------------- In-Memory Implementation (Tests) ----------------

#[derive(Default)]
struct MemoryTenants {
    tenants: BTreeMap<String, TenantConfig>,
    fail_writes: bool,
    reads: usize,
}

#[derive(Clone, Default)]
pub struct InMemoryTenantStore {
    inner: Arc<Mutex<MemoryTenants>>,
    orders: Option<InMemoryOrderStore>,
}

impl InMemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse deletes for tenants that still own orders in `orders`.
    pub fn with_orders(orders: InMemoryOrderStore) -> Self {
        Self {
            inner: Arc::default(),
            orders: Some(orders),
        }
    }

    pub async fn insert(&self, name: &str, config: TenantConfig) {
        self.inner.lock().await.tenants.insert(name.to_string(), config);
    }

    pub async fn set_fail_writes(&self, fail: bool) {
        self.inner.lock().await.fail_writes = fail;
    }

    /// Number of `get_config` calls served, to observe cache hits.
    pub async fn read_count(&self) -> usize {
        self.inner.lock().await.reads
    }
}

fn simulated_outage() -> ConfigError {
    ConfigError::store(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        "simulated tenant store outage",
    ))
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn get_config(&self, tenant: &str) -> Result<Option<TenantConfig>, ConfigError> {
        let mut guard = self.inner.lock().await;
        guard.reads += 1;
        Ok(guard.tenants.get(tenant).cloned())
    }

    async fn update_config(&self, tenant: &str, config: &TenantConfig) -> Result<(), ConfigError> {
        let mut guard = self.inner.lock().await;
        if guard.fail_writes {
            return Err(simulated_outage());
        }
        match guard.tenants.get_mut(tenant) {
            Some(existing) => {
                *existing = config.clone();
                Ok(())
            }
            None => Err(ConfigError::NotFound(tenant.to_string())),
        }
    }

    async fn list(&self) -> Result<Vec<Tenant>, ConfigError> {
        let guard = self.inner.lock().await;
        Ok(guard
            .tenants
            .iter()
            .map(|(name, config)| Tenant { name: name.clone(), config: config.clone() })
            .collect())
    }

    async fn create(&self, tenant: &Tenant) -> Result<(), ConfigError> {
        let mut guard = self.inner.lock().await;
        if guard.fail_writes {
            return Err(simulated_outage());
        }
        if guard.tenants.contains_key(&tenant.name) {
            return Err(ConfigError::TenantExists(tenant.name.clone()));
        }
        guard.tenants.insert(tenant.name.clone(), tenant.config.clone());
        Ok(())
    }

    async fn delete(&self, tenant: &str) -> Result<(), ConfigError> {
        let mut guard = self.inner.lock().await;
        if guard.fail_writes {
            return Err(simulated_outage());
        }
        if !guard.tenants.contains_key(tenant) {
            return Err(ConfigError::NotFound(tenant.to_string()));
        }
        if let Some(orders) = &self.orders {
            if orders.has_orders_for_tenant(tenant).await {
                return Err(ConfigError::TenantHasOrders(tenant.to_string()));
            }
        }
        guard.tenants.remove(tenant);
        Ok(())
    }
}
