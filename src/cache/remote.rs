//! Distributed key→bytes store (component C, L2 of the tiered cache).
//!
//! Same operation contract as [`LocalCache`](super::memory::LocalCache)
//! minus the size cap — oversized values are the remote backend's problem,
//! not ours. Standalone and cluster Redis are both supported behind one
//! connection enum, the same way the gateway's own Redis cache does it for
//! its rate-limit/budget counters.

use std::time::Duration;

use async_trait::async_trait;
use redis::{
    IntoConnectionInfo, aio::MultiplexedConnection, cluster::ClusterClient,
    cluster_async::ClusterConnection,
};
use std::collections::HashMap;

use super::error::{CacheError, CacheResult};
use super::traits::{Cache, CacheStats};
use crate::config::RedisCacheSettings;
use crate::observability::metrics::record_cache_operation;

enum RedisConn {
    Standalone(MultiplexedConnection),
    Cluster(ClusterConnection),
}

/// Dispatches a single Redis command to whichever connection variant is
/// live. Both connection types implement `ConnectionLike`, so the command
/// syntax is identical either way — only the `query_async` target differs.
macro_rules! redis_cmd {
    ($conn:expr, $cmd:expr) => {
        match $conn {
            RedisConn::Standalone(ref mut c) => $cmd.query_async(c).await,
            RedisConn::Cluster(ref mut c) => $cmd.query_async(c).await,
        }
    };
}

enum RedisClient {
    Standalone(redis::Client),
    Cluster(ClusterClient),
}

#[derive(Default)]
struct Counters {
    hits: std::sync::atomic::AtomicU64,
    misses: std::sync::atomic::AtomicU64,
    sets: std::sync::atomic::AtomicU64,
    errors: std::sync::atomic::AtomicU64,
}

/// Distributed cache backed by Redis (standalone or cluster).
pub struct RemoteCache {
    client: RedisClient,
    key_prefix: String,
    default_ttl: Duration,
    counters: Counters,
}

impl RemoteCache {
    pub fn from_settings(settings: &RedisCacheSettings) -> CacheResult<Self> {
        let client = if let Some(cluster) = &settings.cluster {
            let nodes = settings
                .url
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    let url = if s.starts_with("redis://") || s.starts_with("rediss://") {
                        s.to_string()
                    } else {
                        format!("redis://{s}")
                    };
                    url.into_connection_info()
                })
                .collect::<Result<Vec<_>, _>>()?;
            if nodes.is_empty() {
                return Err(CacheError::Internal("no cluster nodes in redis url".into()));
            }
            let mut builder = redis::cluster::ClusterClientBuilder::new(nodes);
            if cluster.read_from_replicas {
                builder = builder.read_from_replicas();
            }
            builder = builder.retries(cluster.retries);
            builder = builder.connection_timeout(Duration::from_secs(cluster.connection_timeout_secs));
            builder = builder.response_timeout(Duration::from_secs(cluster.response_timeout_secs));
            RedisClient::Cluster(builder.build()?)
        } else {
            RedisClient::Standalone(redis::Client::open(settings.url.as_str())?)
        };

        Ok(Self {
            client,
            key_prefix: settings.key_prefix.clone(),
            default_ttl: settings.default_ttl(),
            counters: Counters::default(),
        })
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    async fn connection(&self) -> CacheResult<RedisConn> {
        match &self.client {
            RedisClient::Standalone(client) => {
                Ok(RedisConn::Standalone(client.get_multiplexed_async_connection().await?))
            }
            RedisClient::Cluster(client) => Ok(RedisConn::Cluster(client.get_async_connection().await?)),
        }
    }

    fn effective_ttl(&self, ttl: Duration) -> Duration {
        if ttl.is_zero() { self.default_ttl } else { ttl }
    }
}

#[async_trait]
impl Cache for RemoteCache {
    #[tracing::instrument(skip(self), fields(backend = "redis"))]
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;
        let full_key = self.prefixed(key);
        let result: CacheResult<Option<Vec<u8>>> =
            redis_cmd!(conn, redis::cmd("GET").arg(&full_key)).map_err(CacheError::from);
        match &result {
            Ok(Some(_)) => {
                self.counters.hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                record_cache_operation("remote", "get", "hit");
            }
            Ok(None) => {
                self.counters.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                record_cache_operation("remote", "get", "miss");
            }
            Err(_) => {
                self.counters.errors.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                record_cache_operation("remote", "get", "error");
            }
        }
        result
    }

    #[tracing::instrument(skip(self, value), fields(backend = "redis"))]
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        let full_key = self.prefixed(key);
        let ttl = self.effective_ttl(ttl);
        let result: redis::RedisResult<()> = if ttl.as_secs() > 0 {
            redis_cmd!(conn, redis::cmd("SETEX").arg(&full_key).arg(ttl.as_secs()).arg(&value))
        } else {
            redis_cmd!(conn, redis::cmd("SET").arg(&full_key).arg(&value))
        };
        match result {
            Ok(()) => {
                self.counters.sets.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                record_cache_operation("remote", "set", "ok");
                Ok(())
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                record_cache_operation("remote", "set", "error");
                Err(e.into())
            }
        }
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        let full_key = self.prefixed(key);
        let _: () = redis_cmd!(conn, redis::cmd("DEL").arg(&full_key))?;
        Ok(())
    }

    /// `MGET` for the whole batch in one round trip, amortizing network
    /// latency the way the tiered cache's throttled batch lookup relies on.
    async fn get_multi(&self, keys: &[String]) -> CacheResult<HashMap<String, Vec<u8>>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let mut conn = self.connection().await?;
        let full_keys: Vec<String> = keys.iter().map(|k| self.prefixed(k)).collect();
        let values: Vec<Option<Vec<u8>>> = redis_cmd!(conn, redis::cmd("MGET").arg(&full_keys))?;
        let mut out = HashMap::with_capacity(keys.len());
        for (key, value) in keys.iter().zip(values) {
            if let Some(value) = value {
                out.insert(key.clone(), value);
            }
        }
        Ok(out)
    }

    async fn set_pipeline(&self, entries: Vec<(String, Vec<u8>, Duration)>) -> CacheResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        let mut pipe = redis::pipe();
        for (key, value, ttl) in &entries {
            let full_key = self.prefixed(key);
            let ttl = self.effective_ttl(*ttl);
            if ttl.as_secs() > 0 {
                pipe.cmd("SETEX").arg(&full_key).arg(ttl.as_secs()).arg(value).ignore();
            } else {
                pipe.cmd("SET").arg(&full_key).arg(value).ignore();
            }
        }
        match &mut conn {
            RedisConn::Standalone(c) => pipe.query_async::<()>(c).await?,
            RedisConn::Cluster(c) => pipe.query_async::<()>(c).await?,
        }
        self.counters.sets.fetch_add(entries.len() as u64, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }

    /// Redis has no notion of an in-process element count; this is the
    /// best a distributed tier can report without an expensive `DBSIZE`
    /// scan that would also count unrelated keys sharing the connection.
    async fn len(&self) -> usize {
        0
    }

    /// Intentionally not implemented for the whole key space: per §4.C the
    /// tiered cache's `Flush` only ever clears L1.
    async fn flush(&self) -> CacheResult<()> {
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        use std::sync::atomic::Ordering;
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            sets: self.counters.sets.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }

    async fn close(&self) -> CacheResult<()> {
        Ok(())
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        let _: String = redis_cmd!(conn, redis::cmd("PING"))?;
        Ok(())
    }
}
