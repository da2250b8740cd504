use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// Minimal key-value contract: GET, SET with TTL, DEL. An absent key is `Ok(None)`.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn del(&self, key: &str) -> Result<()>;
}

// ---------------- Redis Implementation ----------------

#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;
        let manager = ConnectionManager::new(client)
            .await
            .context("Failed to create Redis connection manager")?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }
}

// ---------------- Disabled (no cache configured) ----------------

/// Every read misses and every write is dropped.
#[derive(Clone, Copy, Default)]
pub struct DisabledCache;

#[async_trait]
impl CacheBackend for DisabledCache {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
        Ok(())
    }

    async fn del(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}

// ---------------- In-Memory Implementation (Tests) ----------------

#[derive(Clone)]
pub struct InMemoryCache {
    inner: Arc<Mutex<HashMap<String, (String, Instant)>>>,
    available: Arc<AtomicBool>,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// While unavailable every operation fails like a dropped connection.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Raw stored value, ignoring availability.
    pub async fn raw(&self, key: &str) -> Option<String> {
        let guard = self.inner.lock().await;
        guard
            .get(key)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(value, _)| value.clone())
    }

    pub async fn put_raw(&self, key: &str, value: &str, ttl: Duration) {
        let mut guard = self.inner.lock().await;
        guard.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
    }

    fn check_available(&self) -> Result<()> {
        if !self.available.load(Ordering::SeqCst) {
            bail!("cache unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        Ok(self.raw(key).await)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.check_available()?;
        self.put_raw(key, value, ttl).await;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.check_available()?;
        self.inner.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_entries_expire() {
        let cache = InMemoryCache::new();
        cache.set_ex("k", "v", Duration::from_millis(20)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn unavailable_cache_errors() {
        let cache = InMemoryCache::new();
        cache.set_available(false);
        assert!(cache.get("k").await.is_err());
        assert!(cache.del("k").await.is_err());
    }

    #[tokio::test]
    async fn disabled_cache_always_misses() {
        let cache = DisabledCache;
        cache.set_ex("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }
}
