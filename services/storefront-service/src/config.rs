use std::env;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use common_auth::MAX_LEEWAY_SECONDS;

/// One year; also keeps `chrono::Duration::hours` far from its overflow bound.
const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365;

pub(crate) const DEFAULT_CORS_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://localhost:3001",
    "http://localhost:5173",
];

#[derive(Clone)]
pub struct ServiceConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_leeway_seconds: u64,
    pub customer_token_ttl: chrono::Duration,
    pub admin_token_ttl: chrono::Duration,
    pub cache_ttl: Duration,
    pub cache_prefix: String,
    pub request_timeout: Duration,
    pub cors_allowed_origins: Vec<String>,
    pub bind_addr: SocketAddr,
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("db_max_connections", &self.db_max_connections)
            .field("redis_configured", &self.redis_url.is_some())
            .field("jwt_leeway_seconds", &self.jwt_leeway_seconds)
            .field("customer_token_ttl_hours", &self.customer_token_ttl.num_hours())
            .field("admin_token_ttl_hours", &self.admin_token_ttl.num_hours())
            .field("cache_ttl", &self.cache_ttl)
            .field("cache_prefix", &self.cache_prefix)
            .field("request_timeout", &self.request_timeout)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("bind_addr", &self.bind_addr)
            .finish()
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt_secret = env::var("JWT_SECRET_KEY")
            .ok()
            .and_then(|value| normalize_optional(&value))
            .ok_or_else(|| anyhow!("JWT_SECRET_KEY must be set"))?;
        let redis_url = env::var("REDIS_URL").ok().and_then(|value| normalize_optional(&value));

        let jwt_leeway_seconds = leeway("JWT_LEEWAY_SECONDS", parse_env("JWT_LEEWAY_SECONDS", 0u64)?)?;
        let customer_token_ttl = token_ttl("CUSTOMER_TOKEN_TTL_HOURS", parse_env("CUSTOMER_TOKEN_TTL_HOURS", 72i64)?)?;
        let admin_token_ttl = token_ttl("ADMIN_TOKEN_TTL_HOURS", parse_env("ADMIN_TOKEN_TTL_HOURS", 8i64)?)?;
        let cache_ttl_secs = parse_env("TENANT_CONFIG_CACHE_TTL_SECONDS", 600u64)?;
        let cache_prefix = env::var("TENANT_CONFIG_CACHE_PREFIX")
            .ok()
            .and_then(|value| normalize_optional(&value))
            .unwrap_or_else(|| "tenant_config".to_string());
        let request_timeout_secs = parse_env("REQUEST_TIMEOUT_SECONDS", 15u64)?;
        let db_max_connections = parse_env("DB_MAX_CONNECTIONS", 10u32)?;

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|value| parse_list(&value))
            .filter(|origins| !origins.is_empty())
            .unwrap_or_else(|| DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect());

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parse_env("PORT", 8080u16)?;
        let ip: IpAddr = host
            .parse()
            .with_context(|| format!("HOST '{host}' is not an IP address"))?;

        Ok(Self {
            database_url,
            db_max_connections: db_max_connections.max(1),
            redis_url,
            jwt_secret,
            jwt_leeway_seconds,
            customer_token_ttl,
            admin_token_ttl,
            cache_ttl: Duration::from_secs(cache_ttl_secs.max(1)),
            cache_prefix,
            request_timeout: Duration::from_secs(request_timeout_secs.max(1)),
            cors_allowed_origins,
            bind_addr: SocketAddr::from((ip, port)),
        })
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key).ok().and_then(|value| normalize_optional(&value)) {
        Some(value) => value
            .parse::<T>()
            .map_err(|err| anyhow!("Failed to parse {key}='{value}': {err}")),
        None => Ok(default),
    }
}

fn token_ttl(key: &str, hours: i64) -> Result<chrono::Duration> {
    if !(1..=MAX_TOKEN_TTL_HOURS).contains(&hours) {
        return Err(anyhow!("{key}={hours} must be between 1 and {MAX_TOKEN_TTL_HOURS} hours"));
    }
    chrono::Duration::try_hours(hours).with_context(|| format!("{key}={hours} is out of range"))
}

fn leeway(key: &str, seconds: u64) -> Result<u64> {
    if seconds > MAX_LEEWAY_SECONDS {
        return Err(anyhow!("{key}={seconds} exceeds the {MAX_LEEWAY_SECONDS}s maximum"));
    }
    Ok(seconds)
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .filter_map(normalize_optional)
        .collect()
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
