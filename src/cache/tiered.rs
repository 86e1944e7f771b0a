//! Two-level composite cache (component D): L1 = [`LocalCache`], L2 = a
//! [`Cache`] trait object (normally [`RemoteCache`](super::remote::RemoteCache)).
//!
//! Write-through, read-through-with-backfill, and a throttle map that
//! protects L2 from repeated queries for keys known to be cold during a
//! batch lookup — see §4.D of the design for the rationale.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::error::CacheResult;
use super::memory::LocalCache;
use super::traits::{Cache, CacheStats};
use crate::observability::metrics::record_cache_operation;

#[derive(Debug, Clone)]
pub struct TieredCacheConfig {
    pub local_ttl: Duration,
    pub remote_ttl: Duration,
    /// Minimum interval between successive L2 queries for the same key
    /// during `get_multi`.
    pub throttle_window: Duration,
    pub max_throttle_entries: usize,
}

impl Default for TieredCacheConfig {
    fn default() -> Self {
        Self {
            local_ttl: Duration::from_secs(3600),
            remote_ttl: Duration::from_secs(3600),
            throttle_window: Duration::from_secs(5),
            max_throttle_entries: 50_000,
        }
    }
}

#[derive(Default)]
struct TierCounters {
    local_hits: AtomicU64,
    remote_hits: AtomicU64,
    backfills: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    sets: AtomicU64,
}

impl TierCounters {
    fn total_hits(&self) -> u64 {
        self.local_hits.load(Ordering::Relaxed) + self.remote_hits.load(Ordering::Relaxed)
    }
}

/// `key → last time we asked L2 about it`. Bounded; swept in one pass once
/// it exceeds `max_throttle_entries`, discarding anything older than
/// `2 × throttle_window` — twice the window so a key that legitimately
/// falls silent for a whole window isn't evicted mid-window.
struct ThrottleMap {
    entries: RwLock<HashMap<String, Instant>>,
}

impl ThrottleMap {
    fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }

    async fn recently_queried(&self, key: &str, window: Duration, now: Instant) -> bool {
        let guard = self.entries.read().await;
        matches!(guard.get(key), Some(&last) if now.duration_since(last) < window)
    }

    async fn record_queries(&self, keys: impl Iterator<Item = String>, now: Instant, config: &TieredCacheConfig) {
        let mut guard = self.entries.write().await;
        for key in keys {
            guard.insert(key, now);
        }
        if guard.len() > config.max_throttle_entries {
            let horizon = config.throttle_window * 2;
            guard.retain(|_, &mut last| now.duration_since(last) < horizon);
        }
    }
}

/// Composite L1+L2 cache (component D).
pub struct TieredCache {
    local: Arc<LocalCache>,
    remote: Option<Arc<dyn Cache>>,
    config: TieredCacheConfig,
    throttle: ThrottleMap,
    counters: TierCounters,
}

impl TieredCache {
    pub fn new(local: Arc<LocalCache>, remote: Option<Arc<dyn Cache>>, config: TieredCacheConfig) -> Self {
        Self {
            local,
            remote,
            config,
            throttle: ThrottleMap::new(),
            counters: TierCounters::default(),
        }
    }

    /// Write only to L1, bypassing L2 entirely.
    pub async fn set_local_only(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let ttl = if ttl.is_zero() { self.config.local_ttl } else { ttl };
        self.local.set(key, value, ttl).await?;
        self.counters.sets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Batch read with L2 query throttling (the subtle part of §4.D).
    ///
    /// Returns whatever was found plus the first L2 error encountered, if
    /// any — partial results are still useful to the caller.
    pub async fn get_multi_throttled(
        &self,
        keys: &[String],
    ) -> (HashMap<String, Vec<u8>>, Option<super::error::CacheError>) {
        let mut results = HashMap::with_capacity(keys.len());
        let mut candidates = Vec::new();
        for key in keys {
            if let Ok(Some(value)) = self.local.get(key).await {
                results.insert(key.clone(), value);
            } else {
                candidates.push(key.clone());
            }
        }

        let Some(remote) = &self.remote else {
            self.counters.misses.fetch_add(candidates.len() as u64, Ordering::Relaxed);
            return (results, None);
        };

        let now = Instant::now();
        let mut surviving = Vec::with_capacity(candidates.len());
        for key in candidates {
            if !self.throttle.recently_queried(&key, self.config.throttle_window, now).await {
                surviving.push(key);
            }
        }
        if surviving.is_empty() {
            return (results, None);
        }

        let outcome = remote.get_multi(&surviving).await;
        self.throttle.record_queries(surviving.iter().cloned(), now, &self.config).await;

        match outcome {
            Ok(found) => {
                for key in &surviving {
                    match found.get(key) {
                        Some(value) => {
                            self.counters.backfills.fetch_add(1, Ordering::Relaxed);
                            let _ = self.local.set(key, value.clone(), self.config.local_ttl).await;
                            results.insert(key.clone(), value.clone());
                        }
                        None => {
                            self.counters.misses.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
                (results, None)
            }
            Err(err) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                (results, Some(err))
            }
        }
    }
}

#[async_trait]
impl Cache for TieredCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        if let Some(value) = self.local.get(key).await? {
            self.counters.local_hits.fetch_add(1, Ordering::Relaxed);
            record_cache_operation("tiered", "get", "local_hit");
            return Ok(Some(value));
        }
        let Some(remote) = &self.remote else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            record_cache_operation("tiered", "get", "miss");
            return Ok(None);
        };
        match remote.get(key).await? {
            Some(value) => {
                self.counters.remote_hits.fetch_add(1, Ordering::Relaxed);
                self.counters.backfills.fetch_add(1, Ordering::Relaxed);
                record_cache_operation("tiered", "get", "remote_hit");
                // Best-effort backfill: a failure here never surfaces to the caller.
                let _ = self.local.set(key, value.clone(), self.config.local_ttl).await;
                Ok(Some(value))
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                record_cache_operation("tiered", "get", "miss");
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let local_ttl = self.config.local_ttl;
        self.local.set(key, value.clone(), local_ttl).await?;
        if let Some(remote) = &self.remote {
            let remote_ttl = if ttl.is_zero() { self.config.remote_ttl } else { ttl };
            remote.set(key, value, remote_ttl).await?;
        }
        self.counters.sets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.local.delete(key).await?;
        if let Some(remote) = &self.remote {
            remote.delete(key).await?;
        }
        Ok(())
    }

    async fn get_multi(&self, keys: &[String]) -> CacheResult<HashMap<String, Vec<u8>>> {
        let (results, err) = self.get_multi_throttled(keys).await;
        match err {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }

    async fn set_pipeline(&self, entries: Vec<(String, Vec<u8>, Duration)>) -> CacheResult<()> {
        for (key, value, ttl) in entries {
            self.set(&key, value, ttl).await?;
        }
        Ok(())
    }

    async fn len(&self) -> usize {
        self.local.len().await
    }

    /// Clears only L1, per §4.C: L2 never exposes a whole-keyspace flush.
    async fn flush(&self) -> CacheResult<()> {
        self.local.flush().await
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.total_hits(),
            misses: self.counters.misses.load(Ordering::Relaxed),
            sets: self.counters.sets.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }

    async fn close(&self) -> CacheResult<()> {
        // L1 close errors never propagate; only local's sweeper needs
        // stopping and that can't fail.
        let _ = self.local.close().await;
        if let Some(remote) = &self.remote {
            remote.close().await?;
        }
        Ok(())
    }

    async fn ping(&self) -> CacheResult<()> {
        if let Some(remote) = &self.remote {
            remote.ping().await?;
        }
        Ok(())
    }
}

impl TieredCache {
    pub fn local_hits(&self) -> u64 {
        self.counters.local_hits.load(Ordering::Relaxed)
    }

    pub fn remote_hits(&self) -> u64 {
        self.counters.remote_hits.load(Ordering::Relaxed)
    }

    pub fn backfills(&self) -> u64 {
        self.counters.backfills.load(Ordering::Relaxed)
    }
}
