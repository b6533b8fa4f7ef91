//! Response cache for remote API sources
//!
//! Cached entries hold the extracted record array of a successful remote
//! call. Keys combine the source id with a hash of the canonical parameter
//! bag. Backends: in-process memory (default), SQLite, and Redis behind the
//! `cache-redis` feature.

mod key;
mod memory;
mod sqlite;
mod stats;

pub use key::CacheKey;
pub use memory::MemoryCache;
pub use sqlite::SqliteCache;
pub use stats::{CacheStats, CacheStatsSnapshot};

#[cfg(feature = "cache-redis")]
mod redis;

#[cfg(feature = "cache-redis")]
pub use self::redis::RedisCache;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Longest TTL a backend stores; larger values are clamped to it
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Clamp a caller-supplied TTL to [`MAX_TTL`]
pub fn clamp_ttl(ttl: Duration) -> Duration {
    ttl.min(MAX_TTL)
}

/// A cached remote response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CachedResponse {
    pub data: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    pub fetched_at: DateTime<Utc>,
}

#[async_trait]
pub trait QueryCache: Send + Sync {
    /// Look up a live entry. Expired entries are misses.
    async fn get(&self, key: &CacheKey) -> anyhow::Result<Option<CachedResponse>>;

    async fn set(&self, key: &CacheKey, value: &CachedResponse, ttl: Duration) -> anyhow::Result<()>;

    async fn remove(&self, key: &CacheKey) -> anyhow::Result<bool>;

    /// Drop every entry, returning how many were removed.
    async fn clear(&self) -> anyhow::Result<usize>;

    async fn stats(&self) -> anyhow::Result<CacheStatsSnapshot>;
}

/// Cache that stores nothing
#[derive(Debug, Default)]
pub struct NoCache;

#[async_trait]
impl QueryCache for NoCache {
    async fn get(&self, _key: &CacheKey) -> anyhow::Result<Option<CachedResponse>> {
        Ok(None)
    }

    async fn set(&self, _key: &CacheKey, _value: &CachedResponse, _ttl: Duration) -> anyhow::Result<()> {
        Ok(())
    }

    async fn remove(&self, _key: &CacheKey) -> anyhow::Result<bool> {
        Ok(false)
    }

    async fn clear(&self) -> anyhow::Result<usize> {
        Ok(0)
    }

    async fn stats(&self) -> anyhow::Result<CacheStatsSnapshot> {
        Ok(CacheStatsSnapshot::default())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    None,
    #[default]
    Memory,
    Sqlite,
    Redis,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,

    /// Path for the SQLite database
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// URL for the Redis connection
    #[serde(default)]
    pub url: Option<String>,

    /// Entry cap for the memory backend (least recently used evicted first)
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_max_entries() -> usize {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            path: None,
            url: None,
            max_entries: default_max_entries(),
        }
    }
}

impl CacheConfig {
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: CacheBackend::Sqlite,
            path: Some(path.into()),
            ..Default::default()
        }
    }

    #[cfg(feature = "cache-redis")]
    pub fn redis(url: &str) -> Self {
        Self {
            backend: CacheBackend::Redis,
            url: Some(url.to_string()),
            ..Default::default()
        }
    }
}

/// Build the configured cache backend.
pub fn build_cache(config: &CacheConfig) -> anyhow::Result<Arc<dyn QueryCache>> {
    let cache: Arc<dyn QueryCache> = match config.backend {
        CacheBackend::None => Arc::new(NoCache),
        CacheBackend::Memory => Arc::new(MemoryCache::new(config.max_entries)),
        CacheBackend::Sqlite => {
            let path = match &config.path {
                Some(path) => path.clone(),
                None => dirs::cache_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("quarry")
                    .join("responses.db"),
            };
            Arc::new(SqliteCache::new(path)?)
        }
        #[cfg(feature = "cache-redis")]
        CacheBackend::Redis => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("cache.url is required for the redis backend"))?;
            Arc::new(RedisCache::new(url)?)
        }
        #[cfg(not(feature = "cache-redis"))]
        CacheBackend::Redis => {
            anyhow::bail!("redis cache backend requires the cache-redis feature")
        }
    };
    tracing::info!("Response cache backend: {:?}", config.backend);
    Ok(cache)
}
