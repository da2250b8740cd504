pub mod admin_handlers;
pub mod app;
pub mod cache;
pub mod config;
pub mod config_cache;
pub mod credentials;
pub mod extract;
pub mod lifecycle;
pub mod metrics;
pub mod models;
pub mod order_handlers;
pub mod order_repo;
pub mod session_handlers;
pub mod tenant_handlers;
pub mod tenant_repo;

pub use app::{build_router, AppState, Backends, RouterOptions};
pub use cache::{CacheBackend, DisabledCache, InMemoryCache, RedisCache};
pub use config::ServiceConfig;
pub use config_cache::{CacheSettings, ConfigCache, ConfigError, TenantStore};
pub use credentials::{
    Authenticator, CredentialStore, InMemoryCredentialStore, LoginError, PgCredentialStore, RegisterError, Registration,
};
pub use lifecycle::{ConflictKind, OrderError, OrderLifecycle, OrderStore};
pub use order_repo::{InMemoryOrderStore, PgOrderStore};
pub use tenant_repo::{InMemoryTenantStore, PgTenantStore};
