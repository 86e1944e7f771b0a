//! The `Embedder` capability (component F): text → vector, consumed by
//! the semantic cache. The only implementation shipped here talks to any
//! OpenAI-compatible `/embeddings` endpoint; other providers are a matter
//! of adding another struct behind the same trait.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::error::{EmbeddingError, EmbeddingResult};
use crate::config::EmbeddingSettings;
use crate::observability::metrics::record_embedding_generation;

/// `Embed(text) → vector`, `EmbedBatch(texts) → vectors` (order preserved),
/// plus the static shape of the model (`Model`, `Dimension`).
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str, deadline: Duration) -> EmbeddingResult<Vec<f32>>;

    /// Batch order MUST be preserved via the response's `index` field, not
    /// call order — providers are free to reorder internally.
    async fn embed_batch(&self, texts: &[String], deadline: Duration) -> EmbeddingResult<Vec<Vec<f32>>>;

    fn model(&self) -> &str;

    fn dimension(&self) -> usize;
}

#[derive(Serialize)]
struct EmbeddingRequestBody<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponseBody {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// Talks to `POST <base_url>/embeddings` per §6's OpenAI-compatible
/// contract.
pub struct OpenAiEmbedder {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
}

impl OpenAiEmbedder {
    pub fn new(settings: &EmbeddingSettings) -> Self {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .expect("building the embedding http client never fails with these options");
        Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            dimension: settings.dimension,
        }
    }

    async fn embed_many(&self, texts: &[String], deadline: Duration) -> EmbeddingResult<Vec<Vec<f32>>> {
        let start = Instant::now();
        let outcome = tokio::time::timeout(deadline, self.call(texts)).await;

        let result = match outcome {
            Ok(inner) => inner,
            Err(_) => Err(EmbeddingError::Timeout),
        };

        let duration = start.elapsed().as_secs_f64();
        match &result {
            Ok(_) => record_embedding_generation("openai", &self.model, "success", duration),
            Err(_) => record_embedding_generation("openai", &self.model, "error", duration),
        }
        result
    }

    #[tracing::instrument(skip(self, texts), fields(provider = "openai", model = %self.model, batch_size = texts.len()))]
    async fn call(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&EmbeddingRequestBody { model: &self.model, input: texts });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?.error_for_status()?;
        let body: EmbeddingResponseBody = response.json().await?;

        if body.data.is_empty() {
            return Err(EmbeddingError::MalformedResponse("empty embeddings response".into()));
        }

        let mut ordered: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        for datum in body.data {
            if let Some(slot) = ordered.get_mut(datum.index) {
                *slot = Some(datum.embedding);
            }
        }
        ordered
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| EmbeddingError::MalformedResponse("embedding response missing indices".into()))
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str, deadline: Duration) -> EmbeddingResult<Vec<f32>> {
        let mut vectors = self.embed_many(&[text.to_string()], deadline).await?;
        Ok(vectors.pop().unwrap_or_default())
    }

    async fn embed_batch(&self, texts: &[String], deadline: Duration) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.embed_many(texts, deadline).await
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
