use std::sync::Arc;

use anyhow::Context;
use common_auth::{JwtConfig, TokenLifetimes};
use sqlx::postgres::PgPoolOptions;
use storefront_service::{
    build_router, AppState, Backends, CacheBackend, CacheSettings, DisabledCache, PgCredentialStore, PgOrderStore,
    PgTenantStore, RedisCache, RouterOptions, ServiceConfig,
};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServiceConfig::from_env()?;
    info!(?config, "loaded storefront configuration");

    let db = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to Postgres")?;
    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .context("Failed to run database migrations")?;

    let cache: Arc<dyn CacheBackend> = match config.redis_url.as_deref() {
        Some(url) => match RedisCache::new(url).await {
            Ok(redis) => {
                info!("tenant config cache backed by redis");
                Arc::new(redis)
            }
            Err(err) => {
                warn!(error = %err, "redis unavailable; serving tenant config without cache");
                Arc::new(DisabledCache)
            }
        },
        None => {
            warn!("REDIS_URL not set; serving tenant config without cache");
            Arc::new(DisabledCache)
        }
    };

    let jwt = JwtConfig::new(config.jwt_secret.clone())?.with_leeway(config.jwt_leeway_seconds);
    let lifetimes = TokenLifetimes {
        customer: config.customer_token_ttl,
        admin: config.admin_token_ttl,
    };
    let backends = Backends {
        orders: Arc::new(PgOrderStore::new(db.clone())),
        tenants: Arc::new(PgTenantStore::new(db.clone())),
        cache,
        credentials: Arc::new(PgCredentialStore::new(db)),
    };
    let cache_settings = CacheSettings {
        ttl: config.cache_ttl,
        prefix: config.cache_prefix.clone(),
    };
    let state = AppState::new(&jwt, lifetimes, cache_settings, backends);
    let app = build_router(
        state,
        RouterOptions {
            cors_allowed_origins: config.cors_allowed_origins.clone(),
            request_timeout: config.request_timeout,
        },
    );

    info!(addr = %config.bind_addr, "starting storefront-service");
    let listener = TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
