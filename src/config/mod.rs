//! Configuration for the caching subsystem (component I).

mod cache;
mod error;

pub use cache::{
    CacheConfig, DualCacheSettings, EmbeddingSettings, LocalCacheSettings, RedisCacheSettings,
    RedisClusterSettings, RerankingSettings, SemanticCacheSettings, VectorStoreSettings,
};
pub use error::ConfigError;
