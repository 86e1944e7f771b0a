//! Binds a [`Cache`] to request/response envelopes (component E).
//!
//! This is the layer the proxy's request handler actually calls: it derives
//! the fingerprint, applies cache-control semantics (`no-cache`,
//! `no-store`, `ttl`, `s-maxage`, `namespace`), enforces the size cap, and
//! degrades to a miss on any malformed or oversized data rather than ever
//! surfacing a cache-layer error to the HTTP edge.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::keys::KeyGenerator;
use super::traits::{Cache, CacheStats};
use crate::api_types::{CacheControl, ChatCompletionParams};

/// The cached unit of work (§3): upstream response bytes plus enough
/// metadata to apply `s-maxage` and report provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponseEnvelope {
    /// Seconds since epoch, set at write time.
    pub timestamp: u64,
    pub response: Vec<u8>,
    pub model: String,
    pub provider: Option<String>,
}

/// Binds a cache to OpenAI-shaped chat completion requests (component E).
pub struct ExactHandler {
    cache: Arc<dyn Cache>,
    keys: KeyGenerator,
    max_cacheable_size: usize,
    enabled: AtomicBool,
}

impl ExactHandler {
    pub fn new(cache: Arc<dyn Cache>, keys: KeyGenerator, max_cacheable_size: usize) -> Self {
        Self { cache, keys, max_cacheable_size, enabled: AtomicBool::new(true) }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn key_for(&self, request: &ChatCompletionParams, ctrl: &CacheControl) -> String {
        self.keys.generate(request, ctrl.namespace.as_deref())
    }

    /// `GetCachedResponse`. Returns `None` on a true miss, on `no-cache`,
    /// on a stale (`s-maxage`-violating) entry, or on a malformed stored
    /// envelope — all of these are "miss", never an error, per §7.
    pub async fn get_cached_response(
        &self,
        request: &ChatCompletionParams,
        ctrl: &CacheControl,
    ) -> Option<CachedResponseEnvelope> {
        if !self.enabled() || ctrl.no_cache {
            return None;
        }

        let key = self.key_for(request, ctrl);
        let bytes = match self.cache.get(&key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(error) => {
                tracing::warn!(%error, key = %key, "exact cache read failed, degrading to miss");
                return None;
            }
        };

        let envelope: CachedResponseEnvelope = match serde_json::from_slice(&bytes) {
            Ok(envelope) => envelope,
            Err(error) => {
                tracing::warn!(%error, key = %key, "malformed cached envelope, treating as miss");
                return None;
            }
        };

        if let Some(max_age) = ctrl.s_maxage {
            let now = now_secs();
            let age = now.saturating_sub(envelope.timestamp);
            if Duration::from_secs(age) > max_age {
                return None;
            }
        }

        Some(envelope)
    }

    /// `SetCachedResponse`. A no-op (not an error) when disabled,
    /// `no-store`, or the body exceeds `max_cacheable_size`.
    pub async fn set_cached_response(
        &self,
        request: &ChatCompletionParams,
        body: Vec<u8>,
        ctrl: &CacheControl,
    ) {
        if !self.enabled() || ctrl.no_store {
            return;
        }
        if body.len() > self.max_cacheable_size {
            tracing::debug!(size = body.len(), "response too large to cache, skipping");
            return;
        }

        let key = self.key_for(request, ctrl);
        let envelope = CachedResponseEnvelope {
            timestamp: now_secs(),
            response: body,
            model: request.model.clone(),
            provider: None,
        };
        let Ok(serialized) = serde_json::to_vec(&envelope) else {
            tracing::warn!(key = %key, "failed to serialize cache envelope");
            return;
        };

        let ttl = ctrl.ttl.unwrap_or(Duration::ZERO);
        if let Err(error) = self.cache.set(&key, serialized, ttl).await {
            tracing::warn!(%error, key = %key, "exact cache write failed");
        }
    }

    /// `InvalidateCache`.
    pub async fn invalidate_cache(&self, request: &ChatCompletionParams, ctrl: &CacheControl) {
        let key = self.key_for(request, ctrl);
        if let Err(error) = self.cache.delete(&key).await {
            tracing::warn!(%error, key = %key, "exact cache invalidation failed");
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub async fn ping(&self) -> super::error::CacheResult<()> {
        self.cache.ping().await
    }

    pub async fn close(&self) -> super::error::CacheResult<()> {
        self.cache.close().await
    }
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_types::{Message, MessageContent};
    use crate::cache::memory::{LocalCache, LocalCacheConfig};

    fn handler() -> ExactHandler {
        let cache = LocalCache::new(LocalCacheConfig {
            max_size: 100,
            max_item_size: 1 << 20,
            default_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(30),
        });
        ExactHandler::new(cache, KeyGenerator::new(None), 1 << 20)
    }

    fn request() -> ChatCompletionParams {
        ChatCompletionParams {
            model: "gpt-4o".to_string(),
            messages: vec![Message { role: "user".to_string(), content: MessageContent::Text("hi".to_string()) }],
            temperature: None,
            top_p: None,
            max_tokens: None,
            tools: vec![],
            extra: Default::default(),
        }
    }

    #[tokio::test]
    async fn round_trips_a_response() {
        let handler = handler();
        let req = request();
        let ctrl = CacheControl::default();
        assert!(handler.get_cached_response(&req, &ctrl).await.is_none());
        handler.set_cached_response(&req, b"the response".to_vec(), &ctrl).await;
        let hit = handler.get_cached_response(&req, &ctrl).await.unwrap();
        assert_eq!(hit.response, b"the response");
        assert_eq!(hit.model, "gpt-4o");
    }

    #[tokio::test]
    async fn no_cache_bypasses_read_even_when_fresh() {
        let handler = handler();
        let req = request();
        handler.set_cached_response(&req, b"v".to_vec(), &CacheControl::default()).await;
        let mut ctrl = CacheControl::default();
        ctrl.no_cache = true;
        assert!(handler.get_cached_response(&req, &ctrl).await.is_none());
    }

    #[tokio::test]
    async fn no_store_leaves_cache_unchanged() {
        let handler = handler();
        let req = request();
        let mut ctrl = CacheControl::default();
        ctrl.no_store = true;
        handler.set_cached_response(&req, b"v".to_vec(), &ctrl).await;
        assert!(handler.get_cached_response(&req, &CacheControl::default()).await.is_none());
    }

    #[tokio::test]
    async fn namespaces_never_collide() {
        let handler = handler();
        let req = request();
        let mut ctrl_a = CacheControl::default();
        ctrl_a.namespace = Some("tenant-a".to_string());
        let mut ctrl_b = CacheControl::default();
        ctrl_b.namespace = Some("tenant-b".to_string());

        handler.set_cached_response(&req, b"response-a".to_vec(), &ctrl_a).await;
        handler.set_cached_response(&req, b"response-b".to_vec(), &ctrl_b).await;

        assert_eq!(handler.get_cached_response(&req, &ctrl_a).await.unwrap().response, b"response-a");
        assert_eq!(handler.get_cached_response(&req, &ctrl_b).await.unwrap().response, b"response-b");
    }

    #[tokio::test]
    async fn oversized_response_is_silently_not_stored() {
        let cache = LocalCache::new(LocalCacheConfig {
            max_size: 100,
            max_item_size: 1 << 20,
            default_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(30),
        });
        let handler = ExactHandler::new(cache, KeyGenerator::new(None), 8);
        let req = request();
        handler.set_cached_response(&req, vec![0u8; 64], &CacheControl::default()).await;
        assert!(handler.get_cached_response(&req, &CacheControl::default()).await.is_none());
    }

    #[tokio::test]
    async fn s_maxage_expires_entries() {
        let handler = handler();
        let req = request();
        handler.set_cached_response(&req, b"v".to_vec(), &CacheControl::default()).await;
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let mut strict = CacheControl::default();
        strict.s_maxage = Some(Duration::from_millis(1));
        assert!(handler.get_cached_response(&req, &strict).await.is_none());

        let mut lenient = CacheControl::default();
        lenient.s_maxage = Some(Duration::from_secs(3600));
        assert!(handler.get_cached_response(&req, &lenient).await.is_some());
    }

    #[tokio::test]
    async fn disabling_bypasses_reads_and_writes() {
        let handler = handler();
        let req = request();
        handler.set_cached_response(&req, b"v".to_vec(), &CacheControl::default()).await;
        handler.set_enabled(false);
        assert!(handler.get_cached_response(&req, &CacheControl::default()).await.is_none());
    }
}
