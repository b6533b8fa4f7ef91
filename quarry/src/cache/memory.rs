//! In-process response cache with TTL and LRU eviction

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::stats::{CacheStats, CacheStatsSnapshot};
use super::{clamp_ttl, CacheKey, CachedResponse, QueryCache};

struct MemoryEntry {
    value: CachedResponse,
    expires_at: Instant,
    last_accessed: AtomicU64,
}

/// In-memory response cache
#[derive(Clone)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, MemoryEntry>>>,
    max_entries: usize,
    access_counter: Arc<AtomicU64>,
    stats: Arc<CacheStats>,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            max_entries: max_entries.max(1),
            access_counter: Arc::new(AtomicU64::new(0)),
            stats: Arc::new(CacheStats::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_lru(&self, entries: &mut HashMap<String, MemoryEntry>) {
        let lru_key = entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed.load(Ordering::Relaxed))
            .map(|(k, _)| k.clone());

        if let Some(key) = lru_key {
            entries.remove(&key);
            self.stats.evict();
        }
    }
}

#[async_trait]
impl QueryCache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> anyhow::Result<Option<CachedResponse>> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(&key.key) {
                Some(entry) if entry.expires_at > now => {
                    let access = self.access_counter.fetch_add(1, Ordering::Relaxed);
                    entry.last_accessed.store(access, Ordering::Relaxed);
                    self.stats.hit();
                    return Ok(Some(entry.value.clone()));
                }
                Some(_) => {}
                None => {
                    self.stats.miss();
                    return Ok(None);
                }
            }
        }

        // Expired
        self.entries.write().remove(&key.key);
        self.stats.miss();
        Ok(None)
    }

    async fn set(&self, key: &CacheKey, value: &CachedResponse, ttl: Duration) -> anyhow::Result<()> {
        let mut entries = self.entries.write();
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);

        if !entries.contains_key(&key.key) {
            while entries.len() >= self.max_entries {
                self.evict_lru(&mut entries);
            }
        }

        let access = self.access_counter.fetch_add(1, Ordering::Relaxed);
        entries.insert(
            key.key.clone(),
            MemoryEntry {
                value: value.clone(),
                expires_at: now + clamp_ttl(ttl),
                last_accessed: AtomicU64::new(access),
            },
        );
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> anyhow::Result<bool> {
        Ok(self.entries.write().remove(&key.key).is_some())
    }

    async fn clear(&self) -> anyhow::Result<usize> {
        let mut entries = self.entries.write();
        let count = entries.len();
        entries.clear();
        Ok(count)
    }

    async fn stats(&self) -> anyhow::Result<CacheStatsSnapshot> {
        Ok(self.stats.snapshot(self.len()))
    }
}
