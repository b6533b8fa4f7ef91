//! SQLite-backed response cache

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use super::stats::{CacheStats, CacheStatsSnapshot};
use super::{clamp_ttl, CacheKey, CachedResponse, QueryCache};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS responses (
        cache_key   TEXT PRIMARY KEY,
        source_id   TEXT NOT NULL,
        payload     TEXT NOT NULL,
        created_at  INTEGER NOT NULL,
        expires_at  INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_responses_expires ON responses(expires_at);
"#;

/// SQLite-backed response cache
pub struct SqliteCache {
    conn: Mutex<Connection>,
    stats: CacheStats,
}

impl SqliteCache {
    /// Open (or create) a cache database at the given path
    pub fn new(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            stats: CacheStats::new(),
        })
    }

    /// Create an in-memory cache (for testing)
    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            stats: CacheStats::new(),
        })
    }

    /// Delete expired rows, returning how many were removed.
    pub async fn purge_expired(&self) -> anyhow::Result<usize> {
        let conn = self.conn.lock().await;
        let now = chrono::Utc::now().timestamp_millis();
        let removed = conn.execute("DELETE FROM responses WHERE expires_at <= ?", params![now])?;
        Ok(removed)
    }
}

#[async_trait]
impl QueryCache for SqliteCache {
    async fn get(&self, key: &CacheKey) -> anyhow::Result<Option<CachedResponse>> {
        let conn = self.conn.lock().await;
        let now = chrono::Utc::now().timestamp_millis();

        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM responses WHERE cache_key = ? AND expires_at > ?",
                params![&key.key, now],
                |row| row.get(0),
            )
            .optional()?;

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
        let payload = serde_json::to_string(value)?;
        let conn = self.conn.lock().await;
        let now = chrono::Utc::now().timestamp_millis();
        let ttl_ms = i64::try_from(clamp_ttl(ttl).as_millis()).unwrap_or(i64::MAX);
        let expires_at = now.saturating_add(ttl_ms);

        conn.execute(
            r#"
            INSERT OR REPLACE INTO responses (cache_key, source_id, payload, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![&key.key, &key.source_id, payload, now, expires_at],
        )?;
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> anyhow::Result<bool> {
        let conn = self.conn.lock().await;
        let removed = conn.execute("DELETE FROM responses WHERE cache_key = ?", params![&key.key])?;
        Ok(removed > 0)
    }

    async fn clear(&self) -> anyhow::Result<usize> {
        let conn = self.conn.lock().await;
        let removed = conn.execute("DELETE FROM responses", [])?;
        Ok(removed)
    }

    async fn stats(&self) -> anyhow::Result<CacheStatsSnapshot> {
        let conn = self.conn.lock().await;
        let now = chrono::Utc::now().timestamp_millis();
        let entries: usize = conn.query_row(
            "SELECT COUNT(*) FROM responses WHERE expires_at > ?",
            params![now],
            |row| row.get(0),
        )?;
        Ok(self.stats.snapshot(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn entry() -> CachedResponse {
        CachedResponse {
            data: vec![json!({"id": 1}), json!({"id": 2})],
            total: Some(40),
            fetched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_roundtrip_and_stats() {
        let cache = SqliteCache::in_memory().unwrap();
        let key = CacheKey::new("s1", &json!({"page": 1}));

        assert!(cache.get(&key).await.unwrap().is_none());
        cache.set(&key, &entry(), Duration::from_secs(60)).await.unwrap();

        let hit = cache.get(&key).await.unwrap().unwrap();
        assert_eq!(hit.data.len(), 2);
        assert_eq!(hit.total, Some(40));

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_expired_rows_ignored_and_purged() {
        let cache = SqliteCache::in_memory().unwrap();
        let key = CacheKey::new("s1", &json!({}));
        cache.set(&key, &entry(), Duration::from_millis(0)).await.unwrap();

        assert!(cache.get(&key).await.unwrap().is_none());
        assert_eq!(cache.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.db");
        let key = CacheKey::new("s1", &json!({"a": 1}));
        {
            let cache = SqliteCache::new(&path).unwrap();
            cache.set(&key, &entry(), Duration::from_secs(60)).await.unwrap();
        }
        let cache = SqliteCache::new(&path).unwrap();
        assert!(cache.get(&key).await.unwrap().is_some());
        assert_eq!(cache.clear().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_huge_ttl_does_not_expire_immediately() {
        let cache = SqliteCache::in_memory().unwrap();
        let key = CacheKey::new("s1", &json!({}));
        cache
            .set(&key, &entry(), Duration::from_secs(u64::MAX))
            .await
            .unwrap();

        assert!(cache.get(&key).await.unwrap().is_some());
        assert_eq!(cache.purge_expired().await.unwrap(), 0);
    }
}
