use anyhow::{Context, Result};
use quarry::cache::{QueryCache, SqliteCache};
use std::path::Path;

/// Clear a SQLite response cache, returning how many entries were removed
pub async fn clear_cache(path: &Path, expired_only: bool) -> Result<usize> {
    if !path.exists() {
        anyhow::bail!("Cache database {:?} does not exist", path);
    }
    let cache = SqliteCache::new(path).with_context(|| format!("Failed to open cache {:?}", path))?;
    let before = cache.stats().await?;
    tracing::info!("Cache at {:?} holds {} entries", path, before.entries);

    if expired_only {
        cache.purge_expired().await
    } else {
        cache.clear().await
    }
}

pub async fn run_cache_clear(path: &Path, expired_only: bool) -> Result<()> {
    let removed = clear_cache(path, expired_only).await?;
    let scope = if expired_only { "expired " } else { "" };
    println!("Removed {} {}entries from {}", removed, scope, path.display());
    Ok(())
}
