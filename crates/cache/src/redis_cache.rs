//! Redis-backed cache.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use crate::{Cache, CacheError, Result};

/// Cache stored in Redis with `SET ... EX` expiry.
///
/// Uses a `ConnectionManager`, which reconnects on its own and is cheap to
/// clone.
#[derive(Clone)]
pub struct RedisCache {
    conn_manager: ConnectionManager,
}

impl RedisCache {
    /// Connects to Redis.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the server is unreachable.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| CacheError::Backend(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            CacheError::Backend(format!("Failed to create Redis connection manager: {e}"))
        })?;

        Ok(Self { conn_manager })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn_manager.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        // Redis rejects a zero expiry.
        let seconds = ttl.as_secs().max(1);
        let _: () = conn.set_ex(key, value, seconds).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        let mut conn = self.conn_manager.clone();
        let keys: Vec<String> = conn.keys(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let removed: u64 = conn.del(&keys).await?;
        tracing::debug!(pattern, removed, "Deleted cache keys by pattern");
        Ok(removed)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
