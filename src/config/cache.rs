//! Declarative configuration for the response-caching subsystem (component I).
//!
//! Mirrors the gateway's own `config::cache` module: a `#[serde(tag =
//! "type")]` enum selecting the cache backend, `#[serde(default = "fn")]`
//! field defaults, and a `validate()` per variant that the factory calls
//! before wiring anything up.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Top-level cache configuration (component I's input).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum CacheConfig {
    /// No caching.
    #[default]
    None,
    /// In-process only (L1, no L2).
    Local(LocalCacheSettings),
    /// Remote-only, e.g. for a fleet of stateless workers sharing one Redis.
    Redis(RedisCacheSettings),
    /// Tiered local + remote, write-through, read-through with backfill.
    Dual(DualCacheSettings),
    /// Embedding-indexed semantic cache.
    Semantic(SemanticCacheSettings),
}

impl CacheConfig {
    pub fn is_none(&self) -> bool {
        matches!(self, CacheConfig::None)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            CacheConfig::None => Ok(()),
            CacheConfig::Local(c) => c.validate(),
            CacheConfig::Redis(c) => c.validate(),
            CacheConfig::Dual(c) => c.validate(),
            CacheConfig::Semantic(c) => c.validate(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalCacheSettings {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_max_item_bytes")]
    pub max_item_bytes: usize,
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for LocalCacheSettings {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_item_bytes: default_max_item_bytes(),
            default_ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl LocalCacheSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entries == 0 {
            return Err(ConfigError::Validation(
                "local cache max_entries must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

fn default_max_entries() -> usize {
    100_000
}

fn default_max_item_bytes() -> usize {
    1024 * 1024
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    30
}

/// Redis connection settings shared by the `redis` and `dual` variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisCacheSettings {
    /// `redis://[user:password@]host:port[/db]`, or comma-separated node
    /// list when `cluster` is set.
    pub url: String,
    #[serde(default = "default_redis_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default)]
    pub cluster: Option<RedisClusterSettings>,
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
}

impl RedisCacheSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::Validation("redis url cannot be empty".into()));
        }
        Ok(())
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisClusterSettings {
    #[serde(default)]
    pub read_from_replicas: bool,
    #[serde(default = "default_cluster_retries")]
    pub retries: u32,
    #[serde(default = "default_cluster_connection_timeout_secs")]
    pub connection_timeout_secs: u64,
    #[serde(default = "default_cluster_response_timeout_secs")]
    pub response_timeout_secs: u64,
}

fn default_redis_timeout_secs() -> u64 {
    5
}

fn default_key_prefix() -> String {
    "llmux:".to_string()
}

fn default_cluster_retries() -> u32 {
    3
}

fn default_cluster_connection_timeout_secs() -> u64 {
    5
}

fn default_cluster_response_timeout_secs() -> u64 {
    1
}

/// Two-level local+remote tier (component D).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DualCacheSettings {
    #[serde(default)]
    pub local: LocalCacheSettings,
    pub remote: RedisCacheSettings,
    #[serde(default = "default_ttl_secs")]
    pub local_ttl_secs: u64,
    #[serde(default = "default_ttl_secs")]
    pub remote_ttl_secs: u64,
    #[serde(default = "default_throttle_window_secs")]
    pub throttle_window_secs: u64,
    #[serde(default = "default_max_throttle_entries")]
    pub max_throttle_entries: usize,
}

impl DualCacheSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        self.local.validate()?;
        self.remote.validate()?;
        Ok(())
    }

    pub fn local_ttl(&self) -> Duration {
        Duration::from_secs(self.local_ttl_secs)
    }

    pub fn remote_ttl(&self) -> Duration {
        Duration::from_secs(self.remote_ttl_secs)
    }

    pub fn throttle_window(&self) -> Duration {
        Duration::from_secs(self.throttle_window_secs)
    }
}

fn default_throttle_window_secs() -> u64 {
    5
}

fn default_max_throttle_entries() -> usize {
    50_000
}

/// Semantic cache wiring (component G/I): which embedder and vector
/// backend to use, plus the similarity/re-ranking policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SemanticCacheSettings {
    pub embedding: EmbeddingSettings,
    pub vector_store: VectorStoreSettings,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default)]
    pub reranking: Option<RerankingSettings>,
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
}

impl SemanticCacheSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0 < self.similarity_threshold && self.similarity_threshold <= 1.0) {
            return Err(ConfigError::Validation(
                "similarity_threshold must be in (0, 1]".into(),
            ));
        }
        if let Some(rerank) = &self.reranking {
            if !(0.0 < rerank.threshold && rerank.threshold <= 1.0) {
                return Err(ConfigError::Validation(
                    "reranking_threshold must be in (0, 1] when re-ranking is enabled".into(),
                ));
            }
        }
        self.embedding.validate()?;
        self.vector_store.validate()?;
        Ok(())
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RerankingSettings {
    #[serde(default = "default_rerank_top_k")]
    pub top_k: usize,
    #[serde(default = "default_rerank_threshold")]
    pub threshold: f64,
}

fn default_rerank_top_k() -> usize {
    5
}

fn default_rerank_threshold() -> f64 {
    0.5
}

fn default_similarity_threshold() -> f64 {
    0.95
}

/// Tags the embedding provider driver to construct. Only `openai` (any
/// OpenAI-compatible `/embeddings` endpoint) is implemented; others are
/// accepted at the config level and rejected at construction so that
/// adding a new provider is a factory change, not a config-schema change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingSettings {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    pub model: String,
    pub dimension: usize,
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl EmbeddingSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.model.is_empty() {
            return Err(ConfigError::Validation("embedding_model must not be empty".into()));
        }
        if self.dimension == 0 {
            return Err(ConfigError::Validation("vector_dimension must be positive".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Tags the vector backend driver. Only `qdrant` is implemented today.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VectorStoreSettings {
    #[serde(default = "default_vector_backend")]
    pub backend: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub collection: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl VectorStoreSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.collection.is_empty() {
            return Err(ConfigError::Validation("vector collection must not be empty".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_vector_backend() -> String {
    "qdrant".to_string()
}
