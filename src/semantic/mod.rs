//! The semantic caching subsystem: components F (capability interfaces),
//! G (the cache itself), and H (the request-facing handler).

pub mod embedder;
pub mod error;
pub mod semantic_cache;
pub mod semantic_handler;
pub mod vector_store;

pub use embedder::{Embedder, OpenAiEmbedder};
pub use error::{SemanticCacheError, SemanticResult};
pub use semantic_cache::{RerankingConfig, SemanticCache, SemanticCacheConfig, SemanticCacheStats, SemanticHit};
pub use semantic_handler::SemanticHandler;
pub use vector_store::{QdrantVectorStore, SearchOptions, VectorEntry, VectorPayload, VectorStore};
