//! The `VectorStore` capability (component F): insert/search/delete over
//! embedding vectors. The shipped implementation speaks Qdrant's HTTP API
//! (§6); cosine is the only distance metric this crate wires up, per the
//! spec's "Cosine is the canonical metric" contract.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{VectorStoreError, VectorStoreResult};
use crate::config::VectorStoreSettings;
use crate::observability::metrics::record_vector_store_operation;

/// What gets stored alongside a vector (§3's `VectorEntry.payload`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPayload {
    pub prompt: String,
    pub response: String,
    pub model: String,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: VectorPayload,
    pub ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub top_k: usize,
    pub distance_threshold: f64,
}

/// One ranked candidate. `distance = 1 - score` for cosine, per the
/// glossary; both are carried so callers never have to recompute one from
/// the other.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: Uuid,
    pub score: f64,
    pub payload: VectorPayload,
}

impl SearchResult {
    pub fn distance(&self) -> f64 {
        1.0 - self.score
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn insert(&self, entry: VectorEntry, deadline: Duration) -> VectorStoreResult<()>;

    async fn insert_batch(&self, entries: Vec<VectorEntry>, deadline: Duration) -> VectorStoreResult<()>;

    /// Results sorted by similarity, descending.
    async fn search(
        &self,
        vector: &[f32],
        options: SearchOptions,
        deadline: Duration,
    ) -> VectorStoreResult<Vec<SearchResult>>;

    async fn delete(&self, id: Uuid, deadline: Duration) -> VectorStoreResult<()>;

    async fn ping(&self) -> VectorStoreResult<()>;

    async fn close(&self) -> VectorStoreResult<()>;
}

#[derive(Serialize)]
struct CreateCollectionBody {
    vectors: VectorConfigBody,
}

#[derive(Serialize)]
struct VectorConfigBody {
    size: usize,
    distance: &'static str,
}

#[derive(Deserialize)]
struct ExistsResponse {
    result: ExistsResult,
}

#[derive(Deserialize)]
struct ExistsResult {
    exists: bool,
}

#[derive(Serialize)]
struct SearchRequestBody<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
    score_threshold: f64,
}

#[derive(Deserialize)]
struct SearchResponseBody {
    result: Vec<SearchResponsePoint>,
}

#[derive(Deserialize)]
struct SearchResponsePoint {
    id: Uuid,
    score: f64,
    payload: QdrantPayload,
}

#[derive(Serialize)]
struct UpsertBody {
    points: Vec<UpsertPoint>,
}

#[derive(Serialize)]
struct UpsertPoint<'a> {
    id: Uuid,
    vector: &'a [f32],
    payload: QdrantPayload,
}

#[derive(Serialize, Deserialize)]
struct QdrantPayload {
    prompt: String,
    response: String,
    model: String,
    created_at: i64,
}

#[derive(Serialize)]
struct DeleteBody {
    points: Vec<Uuid>,
}

/// Qdrant-backed vector store, speaking the HTTP contract from §6.
pub struct QdrantVectorStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
}

impl QdrantVectorStore {
    pub fn new(settings: &VectorStoreSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .expect("building the vector store http client never fails with these options");
        Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            collection: settings.collection.clone(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }
        request
    }

    /// Ensures the collection exists with the given dimension, creating it
    /// with Cosine distance if missing (component I's factory wiring).
    pub async fn ensure_collection(&self, dimension: usize) -> VectorStoreResult<()> {
        let exists: ExistsResponse = self
            .request(reqwest::Method::GET, &format!("/collections/{}/exists", self.collection))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if exists.result.exists {
            return Ok(());
        }

        self.request(reqwest::Method::PUT, &format!("/collections/{}", self.collection))
            .json(&CreateCollectionBody { vectors: VectorConfigBody { size: dimension, distance: "Cosine" } })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn timed<T>(
        &self,
        operation: &'static str,
        deadline: Duration,
        fut: impl std::future::Future<Output = VectorStoreResult<T>>,
    ) -> VectorStoreResult<T> {
        let start = Instant::now();
        let outcome = tokio::time::timeout(deadline, fut).await;
        let result = match outcome {
            Ok(inner) => inner,
            Err(_) => Err(VectorStoreError::Timeout),
        };
        let status = if result.is_ok() { "success" } else { "error" };
        record_vector_store_operation("qdrant", operation, status, start.elapsed().as_secs_f64());
        result
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn insert(&self, entry: VectorEntry, deadline: Duration) -> VectorStoreResult<()> {
        self.insert_batch(vec![entry], deadline).await
    }

    #[tracing::instrument(skip(self, entries), fields(backend = "qdrant", collection = %self.collection))]
    async fn insert_batch(&self, entries: Vec<VectorEntry>, deadline: Duration) -> VectorStoreResult<()> {
        self.timed("upsert", deadline, async {
            let points = entries
                .iter()
                .map(|entry| UpsertPoint {
                    id: entry.id,
                    vector: &entry.vector,
                    payload: QdrantPayload {
                        prompt: entry.payload.prompt.clone(),
                        response: entry.payload.response.clone(),
                        model: entry.payload.model.clone(),
                        created_at: entry.payload.created_at,
                    },
                })
                .collect();
            self.request(reqwest::Method::PUT, &format!("/collections/{}/points", self.collection))
                .json(&UpsertBody { points })
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        })
        .await
    }

    #[tracing::instrument(skip(self, vector), fields(backend = "qdrant", collection = %self.collection, top_k = options.top_k))]
    async fn search(
        &self,
        vector: &[f32],
        options: SearchOptions,
        deadline: Duration,
    ) -> VectorStoreResult<Vec<SearchResult>> {
        self.timed("search", deadline, async {
            let body: SearchResponseBody = self
                .request(reqwest::Method::POST, &format!("/collections/{}/points/search", self.collection))
                .json(&SearchRequestBody {
                    vector,
                    limit: options.top_k,
                    with_payload: true,
                    score_threshold: 1.0 - options.distance_threshold,
                })
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            Ok(body
                .result
                .into_iter()
                .map(|point| SearchResult {
                    id: point.id,
                    score: point.score,
                    payload: VectorPayload {
                        prompt: point.payload.prompt,
                        response: point.payload.response,
                        model: point.payload.model,
                        created_at: point.payload.created_at,
                    },
                })
                .collect())
        })
        .await
    }

    async fn delete(&self, id: Uuid, deadline: Duration) -> VectorStoreResult<()> {
        self.timed("delete", deadline, async {
            self.request(reqwest::Method::POST, &format!("/collections/{}/points/delete", self.collection))
                .json(&DeleteBody { points: vec![id] })
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        })
        .await
    }

    async fn ping(&self) -> VectorStoreResult<()> {
        self.request(reqwest::Method::GET, "/collections").send().await?.error_for_status()?;
        Ok(())
    }

    async fn close(&self) -> VectorStoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use tokio::sync::RwLock;

    /// In-memory cosine-search fake, used by `semantic_cache`'s own tests
    /// so they never need a live Qdrant.
    #[derive(Default)]
    pub struct InMemoryVectorStore {
        entries: RwLock<Vec<(Uuid, Vec<f32>, VectorPayload)>>,
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        (dot / (norm_a * norm_b)) as f64
    }

    #[async_trait]
    impl VectorStore for InMemoryVectorStore {
        async fn insert(&self, entry: VectorEntry, _deadline: Duration) -> VectorStoreResult<()> {
            self.entries.write().await.push((entry.id, entry.vector, entry.payload));
            Ok(())
        }

        async fn insert_batch(&self, entries: Vec<VectorEntry>, deadline: Duration) -> VectorStoreResult<()> {
            for entry in entries {
                self.insert(entry, deadline).await?;
            }
            Ok(())
        }

        async fn search(
            &self,
            vector: &[f32],
            options: SearchOptions,
            _deadline: Duration,
        ) -> VectorStoreResult<Vec<SearchResult>> {
            let guard = self.entries.read().await;
            let mut scored: Vec<SearchResult> = guard
                .iter()
                .map(|(id, v, payload)| SearchResult { id: *id, score: cosine_similarity(vector, v), payload: payload.clone() })
                .filter(|r| r.distance() <= options.distance_threshold)
                .collect();
            scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(options.top_k);
            Ok(scored)
        }

        async fn delete(&self, id: Uuid, _deadline: Duration) -> VectorStoreResult<()> {
            self.entries.write().await.retain(|(entry_id, _, _)| *entry_id != id);
            Ok(())
        }

        async fn ping(&self) -> VectorStoreResult<()> {
            Ok(())
        }

        async fn close(&self) -> VectorStoreResult<()> {
            Ok(())
        }
    }
}
