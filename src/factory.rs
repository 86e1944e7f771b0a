//! Assembles caches from declarative [`CacheConfig`] (component I).
//!
//! This is the only place in the crate that knows how to turn config into
//! live objects: validate, then construct the requested tier, ensuring
//! (for the semantic variant) that the target vector collection exists
//! with the configured dimension and cosine distance before anything reads
//! from it.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::cache::{Cache, LocalCache, LocalCacheConfig, TieredCache, TieredCacheConfig};
use crate::config::CacheConfig;
use crate::config::ConfigError;
use crate::semantic::{OpenAiEmbedder, QdrantVectorStore, RerankingConfig, SemanticCache, SemanticCacheConfig};

#[cfg(feature = "redis")]
use crate::cache::RemoteCache;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid cache configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("cache backend error: {0}")]
    Cache(#[from] crate::cache::CacheError),
    #[error("vector store error: {0}")]
    VectorStore(#[from] crate::semantic::error::VectorStoreError),
    #[error("the redis backend was requested but this build was compiled without the `redis` feature")]
    RedisFeatureDisabled,
}

/// What the factory hands back — the caller picks the handler (exact vs.
/// semantic) that matches the variant.
pub enum BuiltCache {
    Disabled,
    Exact(Arc<dyn Cache>),
    Semantic(Arc<SemanticCache>),
}

pub struct CacheFactory;

impl CacheFactory {
    pub async fn build(config: &CacheConfig) -> Result<BuiltCache, BuildError> {
        config.validate()?;
        match config {
            CacheConfig::None => Ok(BuiltCache::Disabled),
            CacheConfig::Local(settings) => {
                let cache = LocalCache::new(LocalCacheConfig {
                    max_size: settings.max_entries,
                    max_item_size: settings.max_item_bytes,
                    default_ttl: settings.default_ttl(),
                    sweep_interval: settings.sweep_interval(),
                });
                Ok(BuiltCache::Exact(cache as Arc<dyn Cache>))
            }
            CacheConfig::Redis(settings) => {
                #[cfg(feature = "redis")]
                {
                    let cache = RemoteCache::from_settings(settings)?;
                    Ok(BuiltCache::Exact(Arc::new(cache) as Arc<dyn Cache>))
                }
                #[cfg(not(feature = "redis"))]
                {
                    let _ = settings;
                    Err(BuildError::RedisFeatureDisabled)
                }
            }
            CacheConfig::Dual(settings) => {
                #[cfg(feature = "redis")]
                {
                    let local = LocalCache::new(LocalCacheConfig {
                        max_size: settings.local.max_entries,
                        max_item_size: settings.local.max_item_bytes,
                        default_ttl: settings.local.default_ttl(),
                        sweep_interval: settings.local.sweep_interval(),
                    });
                    let remote = RemoteCache::from_settings(&settings.remote)?;
                    let tiered = TieredCache::new(
                        local,
                        Some(Arc::new(remote) as Arc<dyn Cache>),
                        TieredCacheConfig {
                            local_ttl: settings.local_ttl(),
                            remote_ttl: settings.remote_ttl(),
                            throttle_window: settings.throttle_window(),
                            max_throttle_entries: settings.max_throttle_entries,
                        },
                    );
                    Ok(BuiltCache::Exact(Arc::new(tiered) as Arc<dyn Cache>))
                }
                #[cfg(not(feature = "redis"))]
                {
                    let _ = settings;
                    Err(BuildError::RedisFeatureDisabled)
                }
            }
            CacheConfig::Semantic(settings) => {
                let embedder = Arc::new(OpenAiEmbedder::new(&settings.embedding));
                let vector_store = QdrantVectorStore::new(&settings.vector_store);
                vector_store.ensure_collection(settings.embedding.dimension).await?;

                let reranking = settings.reranking.as_ref().map(|r| RerankingConfig { top_k: r.top_k, threshold: r.threshold });
                let cache = SemanticCache::new(
                    embedder,
                    Arc::new(vector_store),
                    SemanticCacheConfig {
                        similarity_threshold: settings.similarity_threshold,
                        reranking,
                        default_ttl: settings.default_ttl(),
                    },
                    Duration::from_secs(settings.vector_store.request_timeout_secs),
                );
                Ok(BuiltCache::Semantic(Arc::new(cache)))
            }
        }
    }
}
