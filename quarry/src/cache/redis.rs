//! Redis-backed response cache

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use super::stats::{CacheStats, CacheStatsSnapshot};
use super::{clamp_ttl, CacheKey, CachedResponse, QueryCache};

/// Redis-backed response cache, entries expire via `SET EX`
pub struct RedisCache {
    client: redis::Client,
    prefix: String,
    stats: CacheStats,
}

impl RedisCache {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        Self::with_prefix(url, "quarry:")
    }

    /// Create with a custom key prefix
    pub fn with_prefix(url: &str, prefix: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            prefix: prefix.to_string(),
            stats: CacheStats::new(),
        })
    }

    fn make_key(&self, key: &CacheKey) -> String {
        format!("{}{}", self.prefix, key.key)
    }

    async fn get_connection(&self) -> anyhow::Result<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    async fn matching_keys(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
    ) -> anyhow::Result<Vec<String>> {
        let pattern = format!("{}api:*", self.prefix);
        let keys: Vec<String> = conn.keys(pattern).await?;
        Ok(keys)
    }
}

#[async_trait]
impl QueryCache for RedisCache {
    async fn get(&self, key: &CacheKey) -> anyhow::Result<Option<CachedResponse>> {
        let mut conn = self.get_connection().await?;
        let payload: Option<String> = conn.get(self.make_key(key)).await?;

        match payload {
            Some(payload) => {
                self.stats.hit();
                Ok(Some(serde_json::from_str(&payload)?))
            }
            None => {
                self.stats.miss();
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &CacheKey, value: &CachedResponse, ttl: Duration) -> anyhow::Result<()> {
        let mut conn = self.get_connection().await?;
        let payload = serde_json::to_string(value)?;
        let seconds = clamp_ttl(ttl).as_secs().max(1);
        conn.set_ex::<_, _, ()>(self.make_key(key), payload, seconds).await?;
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> anyhow::Result<bool> {
        let mut conn = self.get_connection().await?;
        let removed: usize = conn.del(self.make_key(key)).await?;
        Ok(removed > 0)
    }

    async fn clear(&self) -> anyhow::Result<usize> {
        let mut conn = self.get_connection().await?;
        let keys = self.matching_keys(&mut conn).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let removed: usize = conn.del(keys).await?;
        Ok(removed)
    }

    async fn stats(&self) -> anyhow::Result<CacheStatsSnapshot> {
        let mut conn = self.get_connection().await?;
        let entries = self.matching_keys(&mut conn).await?.len();
        Ok(self.stats.snapshot(entries))
    }
}
