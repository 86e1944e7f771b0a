use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use super::error::CacheResult;

/// Point-in-time counters for a single cache instance. Updated with atomics
/// outside of whatever lock guards the cache's data, so reading stats never
/// contends with the hot path.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub errors: u64,
}

/// Shared key→bytes contract for both the local and remote tiers.
///
/// `ttl == Duration::ZERO` means "use the cache's default TTL" — the
/// Rust rendering of the spec's "`ttl ≤ 0` uses the default" rule, since
/// `Duration` itself cannot be negative.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Batch read. Keys with no value present are simply absent from the
    /// returned map rather than represented as `None` — there is no
    /// meaningful distinction at this layer between "miss" and "not
    /// requested".
    async fn get_multi(&self, keys: &[String]) -> CacheResult<HashMap<String, Vec<u8>>>;

    /// Batch write, amortizing round trips for backends where that
    /// matters (Redis pipelining). Implementations without a native batch
    /// primitive may fall back to sequential `set` calls.
    async fn set_pipeline(&self, entries: Vec<(String, Vec<u8>, Duration)>) -> CacheResult<()>;

    async fn len(&self) -> usize;

    async fn flush(&self) -> CacheResult<()>;

    fn stats(&self) -> CacheStats;

    async fn close(&self) -> CacheResult<()>;

    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }
}
