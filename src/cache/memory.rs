//! In-process bounded cache with min-heap + lazy-deletion TTL eviction.
//!
//! Three structures live behind one lock: the value map, a parallel
//! key→expiration map, and a min-heap of `{key, expiration}` nodes ordered
//! by expiration. Updates never reposition an existing heap node — they
//! push a fresh one and leave the old node as a tombstone, detected by
//! comparing its expiration against the current ttl-map entry for its key.
//! A background sweeper and on-write capacity reclaim both walk the heap
//! root discarding tombstones and expired entries; capacity reclaim additionally
//! discards live-but-earliest-expiring entries once the root is clean. That
//! makes eviction approximate-LRU-by-expiration, not strict LRU.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::error::CacheResult;
use super::traits::{Cache, CacheStats};
use crate::observability::metrics::record_cache_operation;

#[derive(Debug, Clone)]
pub struct LocalCacheConfig {
    /// Maximum number of entries. Enforced after every `set`.
    pub max_size: usize,
    /// Values larger than this are silently dropped by `set`.
    pub max_item_size: usize,
    /// Used when a caller passes `Duration::ZERO` to `set`.
    pub default_ttl: Duration,
    /// How often the background sweeper inspects the heap root.
    pub sweep_interval: Duration,
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self {
            max_size: 100_000,
            max_item_size: 1024 * 1024,
            default_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
struct HeapEntry {
    expiration: Instant,
    key: String,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.expiration == other.expiration
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reversed so `BinaryHeap` (a max-heap) behaves like a min-heap
        // ordered by soonest expiration.
        other.expiration.cmp(&self.expiration)
    }
}

#[derive(Default)]
struct Inner {
    data: HashMap<String, Vec<u8>>,
    ttl: HashMap<String, Instant>,
    heap: BinaryHeap<HeapEntry>,
}

impl Inner {
    /// Discard stale tombstones and expired entries from the heap root,
    /// stopping at the first live, unexpired entry.
    fn sweep_expired(&mut self, now: Instant) {
        loop {
            let Some(top) = self.heap.peek() else {
                break;
            };
            match self.ttl.get(&top.key) {
                Some(&exp) if exp == top.expiration => {
                    if exp <= now {
                        let node = self.heap.pop().expect("peeked above");
                        self.data.remove(&node.key);
                        self.ttl.remove(&node.key);
                    } else {
                        break;
                    }
                }
                _ => {
                    self.heap.pop();
                }
            }
        }
    }

    /// Force `data.len()` down to `max_size`, discarding expired entries
    /// first and then live-but-earliest-expiring ones.
    fn reclaim_capacity(&mut self, max_size: usize) {
        while self.data.len() > max_size {
            let Some(node) = self.heap.pop() else { break };
            match self.ttl.get(&node.key) {
                Some(&exp) if exp == node.expiration => {
                    self.data.remove(&node.key);
                    self.ttl.remove(&node.key);
                }
                _ => {} // stale tombstone; data is unaffected, keep going
            }
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    errors: AtomicU64,
}

/// Bounded in-process cache (component B / L1 of the tiered cache).
pub struct LocalCache {
    inner: Arc<RwLock<Inner>>,
    counters: Arc<Counters>,
    config: LocalCacheConfig,
    shutdown: Arc<Notify>,
    sweeper: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl LocalCache {
    pub fn new(config: LocalCacheConfig) -> Arc<Self> {
        let cache = Arc::new(Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            counters: Arc::new(Counters::default()),
            config,
            shutdown: Arc::new(Notify::new()),
            sweeper: std::sync::Mutex::new(None),
        });
        cache.start_sweeper();
        cache
    }

    fn start_sweeper(self: &Arc<Self>) {
        let inner = self.inner.clone();
        let shutdown = self.shutdown.clone();
        let interval = self.config.sweep_interval;
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        let now = Instant::now();
                        let mut guard = inner.write().await;
                        guard.sweep_expired(now);
                    }
                    _ = shutdown.notified() => break,
                }
            }
        });
        *self.sweeper.lock().expect("sweeper mutex poisoned") = Some(handle);
    }

    fn effective_ttl(&self, ttl: Duration) -> Duration {
        if ttl.is_zero() { self.config.default_ttl } else { ttl }
    }

    async fn get_inner(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        {
            let guard = self.inner.read().await;
            if let Some(&exp) = guard.ttl.get(key) {
                if exp > now {
                    if let Some(value) = guard.data.get(key) {
                        return Some(value.clone());
                    }
                }
            }
        }
        // Miss or expired. If expired, lazily delete under the write lock.
        let mut guard = self.inner.write().await;
        if let Some(&exp) = guard.ttl.get(key) {
            if exp <= now {
                guard.data.remove(key);
                guard.ttl.remove(key);
            }
        }
        None
    }

    async fn set_inner(&self, key: String, value: Vec<u8>, ttl: Duration) {
        if value.len() > self.config.max_item_size {
            tracing::warn!(key = %key, size = value.len(), "dropping oversized value from local cache");
            return;
        }
        let expiration = Instant::now() + self.effective_ttl(ttl);
        let mut guard = self.inner.write().await;
        guard.data.insert(key.clone(), value);
        guard.ttl.insert(key.clone(), expiration);
        guard.heap.push(HeapEntry { expiration, key });
        if guard.data.len() > self.config.max_size {
            guard.reclaim_capacity(self.config.max_size);
        }
        self.counters.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.data.len()
    }
}

#[async_trait]
impl Cache for LocalCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let result = self.get_inner(key).await;
        if result.is_some() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            record_cache_operation("local", "get", "hit");
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            record_cache_operation("local", "get", "miss");
        }
        Ok(result)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        self.set_inner(key.to_string(), value, ttl).await;
        record_cache_operation("local", "set", "ok");
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut guard = self.inner.write().await;
        guard.data.remove(key);
        guard.ttl.remove(key);
        Ok(())
    }

    async fn get_multi(&self, keys: &[String]) -> CacheResult<HashMap<String, Vec<u8>>> {
        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get_inner(key).await {
                out.insert(key.clone(), value);
            }
        }
        Ok(out)
    }

    async fn set_pipeline(&self, entries: Vec<(String, Vec<u8>, Duration)>) -> CacheResult<()> {
        for (key, value, ttl) in entries {
            self.set_inner(key, value, ttl).await;
        }
        Ok(())
    }

    async fn len(&self) -> usize {
        LocalCache::len(self).await
    }

    async fn flush(&self) -> CacheResult<()> {
        let mut guard = self.inner.write().await;
        guard.data.clear();
        guard.ttl.clear();
        guard.heap.clear();
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            sets: self.counters.sets.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }

    async fn close(&self) -> CacheResult<()> {
        self.shutdown.notify_waiters();
        if let Some(handle) = self.sweeper.lock().expect("sweeper mutex poisoned").take() {
            let _ = handle.await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;

    fn config(max_size: usize) -> LocalCacheConfig {
        LocalCacheConfig {
            max_size,
            max_item_size: 1024,
            default_ttl: Duration::from_secs(60),
            sweep_interval: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn capacity_is_enforced_after_set() {
        let cache = LocalCache::new(config(5));
        for i in 0..10 {
            cache.set(&format!("k{i}"), vec![i as u8], Duration::ZERO).await.unwrap();
        }
        assert_eq!(cache.len().await, 5);
    }

    #[tokio::test]
    async fn get_returns_defensive_copy() {
        let cache = LocalCache::new(config(10));
        cache.set("k", vec![1, 2, 3], Duration::ZERO).await.unwrap();
        let mut returned = cache.get("k").await.unwrap().unwrap();
        returned[0] = 99;
        let again = cache.get("k").await.unwrap().unwrap();
        assert_eq!(again, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn expired_entries_are_not_returned() {
        let cache = LocalCache::new(config(10));
        cache.set("k", vec![1], Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn zero_ttl_uses_default() {
        let cache = LocalCache::new(config(10));
        cache.set("k", vec![1], Duration::ZERO).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cache.get("k").await.unwrap(), Some(vec![1]));
    }

    #[tokio::test]
    async fn oversized_values_are_silently_dropped() {
        let cache = LocalCache::new(config(10));
        let big = vec![0u8; 2048];
        cache.set("k", big, Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn background_sweeper_reclaims_expired_entries() {
        let cache = LocalCache::new(config(10));
        cache.set("k", vec![1], Duration::from_millis(5)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        // The sweeper should have removed it without anyone calling get().
        assert_eq!(cache.inner.read().await.data.len(), 0);
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let cache = LocalCache::new(config(10));
        cache.set("k", vec![1], Duration::from_secs(60)).await.unwrap();
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn flush_clears_everything() {
        let cache = LocalCache::new(config(10));
        for i in 0..5 {
            cache.set(&format!("k{i}"), vec![1], Duration::from_secs(60)).await.unwrap();
        }
        cache.flush().await.unwrap();
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn get_multi_returns_only_present_keys() {
        let cache = LocalCache::new(config(10));
        cache.set("a", vec![1], Duration::from_secs(60)).await.unwrap();
        cache.set("b", vec![2], Duration::from_secs(60)).await.unwrap();
        let result = cache
            .get_multi(&["a".to_string(), "b".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.get("a"), Some(&vec![1]));
    }

    #[tokio::test]
    async fn stats_track_hits_and_misses() {
        let cache = LocalCache::new(config(10));
        cache.set("a", vec![1], Duration::from_secs(60)).await.unwrap();
        cache.get("a").await.unwrap();
        cache.get("missing").await.unwrap();
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 1);
    }

    #[tokio::test]
    async fn concurrent_sets_never_exceed_capacity() {
        let cache = LocalCache::new(config(20));
        let tasks: Vec<_> = (0..200)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    cache.set(&format!("k{i}"), vec![1], Duration::from_secs(60)).await.unwrap();
                })
            })
            .collect();
        join_all(tasks).await;
        assert!(cache.len().await <= 20);
    }

    #[tokio::test]
    async fn close_stops_sweeper_idempotently() {
        let cache = LocalCache::new(config(10));
        cache.close().await.unwrap();
        cache.close().await.unwrap();
    }
}
