use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("embedding provider returned malformed response: {0}")]
    MalformedResponse(String),
    #[error("operation deadline exceeded")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("vector backend returned an error: {0}")]
    Backend(String),
    #[error("operation deadline exceeded")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum SemanticCacheError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    VectorStore(#[from] VectorStoreError),
}

pub type EmbeddingResult<T> = Result<T, EmbeddingError>;
pub type VectorStoreResult<T> = Result<T, VectorStoreError>;
pub type SemanticResult<T> = Result<T, SemanticCacheError>;
