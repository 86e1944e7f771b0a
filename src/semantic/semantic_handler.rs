//! Binds a [`SemanticCache`] to request/response envelopes (component H).
//!
//! The one thing this layer owns that `ExactHandler` doesn't: flattening a
//! structured message list down to the single string the embedder and the
//! re-ranker both operate on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::semantic_cache::SemanticCache;
use crate::api_types::{CacheControl, ContentPart, Message, MessageContent};
use crate::cache::CachedResponseEnvelope;

/// Binds the semantic cache to chat completion requests (component H).
pub struct SemanticHandler {
    cache: SemanticCache,
    max_cacheable_size: usize,
    enabled: AtomicBool,
}

impl SemanticHandler {
    pub fn new(cache: SemanticCache, max_cacheable_size: usize) -> Self {
        Self { cache, max_cacheable_size, enabled: AtomicBool::new(true) }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Flattens messages to `"<role>: <content>"` lines, one per message.
    /// Multimodal content keeps only its text parts, space-joined.
    pub fn flatten_messages(messages: &[Message]) -> String {
        messages
            .iter()
            .map(|message| format!("{}: {}", message.role, Self::flatten_content(&message.content)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn flatten_content(content: &MessageContent) -> String {
        match content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    pub async fn get_cached_response(
        &self,
        messages: &[Message],
        ctrl: &CacheControl,
    ) -> Option<CachedResponseEnvelope> {
        if !self.enabled() || ctrl.no_cache {
            return None;
        }
        let prompt = Self::flatten_messages(messages);
        match self.cache.get(&prompt).await {
            Ok(Some(hit)) => Some(CachedResponseEnvelope {
                timestamp: now_secs(),
                response: hit.response.into_bytes(),
                model: hit.model,
                provider: None,
            }),
            Ok(None) => None,
            Err(error) => {
                tracing::warn!(%error, "semantic cache read failed, degrading to miss");
                None
            }
        }
    }

    pub async fn set_cached_response(&self, messages: &[Message], model: &str, body: Vec<u8>, ctrl: &CacheControl) {
        if !self.enabled() || ctrl.no_store {
            return;
        }
        if body.len() > self.max_cacheable_size {
            tracing::debug!(size = body.len(), "response too large for semantic cache, skipping");
            return;
        }
        let prompt = Self::flatten_messages(messages);
        let Ok(response) = String::from_utf8(body) else {
            tracing::warn!("semantic cache response body was not valid utf-8, skipping");
            return;
        };
        let ttl = ctrl.ttl.unwrap_or(Duration::ZERO);
        if let Err(error) = self.cache.set(&prompt, &response, model, ttl).await {
            tracing::warn!(%error, "semantic cache write failed");
        }
    }

    pub async fn invalidate_cache(&self, messages: &[Message], _ctrl: &CacheControl) {
        let prompt = Self::flatten_messages(messages);
        if let Err(error) = self.cache.delete(&prompt).await {
            tracing::warn!(%error, "semantic cache invalidation failed");
        }
    }

    pub fn stats(&self) -> super::semantic_cache::SemanticCacheStats {
        self.cache.stats()
    }

    pub async fn ping(&self) -> super::error::SemanticResult<()> {
        self.cache.ping().await
    }

    pub async fn close(&self) -> super::error::SemanticResult<()> {
        self.cache.close().await
    }
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}
