//! Embedding-indexed prompt→response cache (component G).
//!
//! Exact-match caching only helps when two requests are byte-identical.
//! This collaborator instead keys by meaning: a prompt is embedded, the
//! nearest stored prompts are retrieved by cosine similarity, and
//! (optionally) a cheap textual re-ranking pass corrects the vector
//! search's top-1 pick when two candidates are close in embedding space
//! but not equally good textual matches.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use super::embedder::Embedder;
use super::error::{SemanticCacheError, SemanticResult};
use super::vector_store::{SearchOptions, VectorEntry, VectorPayload, VectorStore};

/// Delete locates its target with a stricter threshold than Get ever
/// would: adequate for de-duplicating near-identical prompts, but — per
/// the design notes — it will miss paraphrases. Kept as a constant rather
/// than exposed in config, since nothing in this codebase needs it tuned.
const SEMANTIC_DELETE_DISTANCE_THRESHOLD: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct SemanticHit {
    pub response: String,
    pub similarity: f64,
    pub cached_prompt: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct RerankingConfig {
    pub top_k: usize,
    pub threshold: f64,
}

#[derive(Debug, Clone)]
pub struct SemanticCacheConfig {
    pub similarity_threshold: f64,
    pub reranking: Option<RerankingConfig>,
    pub default_ttl: Duration,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    errors: AtomicU64,
    embed_calls: AtomicU64,
}

#[derive(Debug, Clone, Default)]
pub struct SemanticCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub errors: u64,
    pub embed_calls: u64,
}

/// Component G: embeds prompts, searches the vector store, and applies
/// threshold filtering plus optional textual re-ranking.
pub struct SemanticCache {
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<dyn VectorStore>,
    config: SemanticCacheConfig,
    counters: Counters,
    call_deadline: Duration,
}

impl SemanticCache {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vector_store: Arc<dyn VectorStore>,
        config: SemanticCacheConfig,
        call_deadline: Duration,
    ) -> Self {
        Self { embedder, vector_store, config, counters: Counters::default(), call_deadline }
    }

    pub fn similarity_threshold(&self) -> f64 {
        self.config.similarity_threshold
    }

    /// The Get pipeline: embed → search → threshold filter → (optional)
    /// re-rank → return the survivor, or miss.
    pub async fn get(&self, prompt: &str) -> SemanticResult<Option<SemanticHit>> {
        if prompt.is_empty() {
            return Ok(None);
        }

        let vector = match self.embed(prompt).await {
            Ok(vector) => vector,
            Err(error) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                return Err(error);
            }
        };

        let reranking_enabled = self.config.reranking.is_some();
        let top_k = self.config.reranking.as_ref().map(|r| r.top_k).unwrap_or(1);
        let distance_threshold = 1.0 - self.config.similarity_threshold;

        let candidates = self
            .vector_store
            .search(&vector, SearchOptions { top_k, distance_threshold }, self.call_deadline)
            .await
            .map_err(|error| {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                SemanticCacheError::from(error)
            })?;

        if candidates.is_empty() {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        let surviving: Vec<_> =
            candidates.into_iter().filter(|c| c.score >= self.config.similarity_threshold).collect();
        if surviving.is_empty() {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        let chosen = if reranking_enabled {
            let rerank = self.config.reranking.as_ref().expect("checked enabled above");
            let best = surviving
                .iter()
                .map(|c| (jaccard_similarity(prompt, &c.payload.prompt), c))
                .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
            match best {
                Some((textual_score, candidate)) if textual_score >= rerank.threshold => Some(candidate.clone()),
                _ => None,
            }
        } else {
            surviving.into_iter().next()
        };

        match chosen {
            Some(candidate) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(SemanticHit {
                    response: candidate.payload.response,
                    similarity: candidate.score,
                    cached_prompt: candidate.payload.prompt,
                    model: candidate.payload.model,
                }))
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    pub async fn set(&self, prompt: &str, response: &str, model: &str, ttl: Duration) -> SemanticResult<()> {
        if prompt.is_empty() || response.is_empty() {
            return Ok(());
        }

        let vector = self.embed(prompt).await?;
        let ttl = if ttl.is_zero() { self.config.default_ttl } else { ttl };
        let entry = VectorEntry {
            id: Uuid::new_v4(),
            vector,
            payload: VectorPayload {
                prompt: prompt.to_string(),
                response: response.to_string(),
                model: model.to_string(),
                created_at: now_secs(),
            },
            ttl,
        };
        self.vector_store.insert(entry, self.call_deadline).await.map_err(SemanticCacheError::from)?;
        self.counters.sets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// `SetBatch`: a single `EmbedBatch` call amortizes the embedding
    /// round trip across the whole batch.
    pub async fn set_batch(
        &self,
        entries: Vec<(String, String, String, Duration)>,
    ) -> SemanticResult<()> {
        let entries: Vec<_> = entries
            .into_iter()
            .filter(|(prompt, response, _, _)| !prompt.is_empty() && !response.is_empty())
            .collect();
        if entries.is_empty() {
            return Ok(());
        }

        let prompts: Vec<String> = entries.iter().map(|(prompt, ..)| prompt.clone()).collect();
        self.counters.embed_calls.fetch_add(1, Ordering::Relaxed);
        let vectors = self
            .embedder
            .embed_batch(&prompts, self.call_deadline)
            .await
            .map_err(|error| {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                SemanticCacheError::from(error)
            })?;

        let vector_entries = entries
            .into_iter()
            .zip(vectors)
            .map(|((prompt, response, model, ttl), vector)| VectorEntry {
                id: Uuid::new_v4(),
                vector,
                payload: VectorPayload { prompt, response, model, created_at: now_secs() },
                ttl: if ttl.is_zero() { self.config.default_ttl } else { ttl },
            })
            .collect::<Vec<_>>();

        let count = vector_entries.len() as u64;
        self.vector_store.insert_batch(vector_entries, self.call_deadline).await.map_err(SemanticCacheError::from)?;
        self.counters.sets.fetch_add(count, Ordering::Relaxed);
        Ok(())
    }

    /// Embeds the prompt and searches with the fixed, strict
    /// `SEMANTIC_DELETE_DISTANCE_THRESHOLD` to find the single entry to
    /// remove, per the design notes' "kept as-is" decision.
    pub async fn delete(&self, prompt: &str) -> SemanticResult<()> {
        if prompt.is_empty() {
            return Ok(());
        }
        let vector = self.embed(prompt).await?;
        let candidates = self
            .vector_store
            .search(
                &vector,
                SearchOptions { top_k: 1, distance_threshold: SEMANTIC_DELETE_DISTANCE_THRESHOLD },
                self.call_deadline,
            )
            .await
            .map_err(SemanticCacheError::from)?;
        if let Some(candidate) = candidates.into_iter().next() {
            self.vector_store.delete(candidate.id, self.call_deadline).await.map_err(SemanticCacheError::from)?;
        }
        Ok(())
    }

    pub async fn ping(&self) -> SemanticResult<()> {
        self.vector_store.ping().await.map_err(SemanticCacheError::from)
    }

    pub async fn close(&self) -> SemanticResult<()> {
        self.vector_store.close().await.map_err(SemanticCacheError::from)
    }

    pub fn stats(&self) -> SemanticCacheStats {
        SemanticCacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            sets: self.counters.sets.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            embed_calls: self.counters.embed_calls.load(Ordering::Relaxed),
        }
    }

    async fn embed(&self, text: &str) -> SemanticResult<Vec<f32>> {
        self.counters.embed_calls.fetch_add(1, Ordering::Relaxed);
        self.embedder.embed(text, self.call_deadline).await.map_err(SemanticCacheError::from)
    }
}

fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

/// Jaccard similarity over case-folded, whitespace-tokenized word sets:
/// `|A ∩ B| / |A ∪ B|`. `1.0` for equal-after-trim strings, `0.0` if
/// either side is empty — both special-cased so an empty set never
/// divides by zero.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let a_trimmed = a.trim();
    let b_trimmed = b.trim();
    if a_trimmed.eq_ignore_ascii_case(b_trimmed) {
        return 1.0;
    }
    if a_trimmed.is_empty() || b_trimmed.is_empty() {
        return 0.0;
    }

    let tokenize = |s: &str| -> HashSet<String> {
        s.to_lowercase()
            .split_whitespace()
            .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
            .filter(|word| !word.is_empty())
            .collect()
    };
    let set_a = tokenize(a_trimmed);
    let set_b = tokenize(b_trimmed);
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 { 0.0 } else { intersection as f64 / union as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::embedder::test_support::FixedVectorEmbedder;
    use crate::semantic::vector_store::test_support::InMemoryVectorStore;

    fn cache_with(
        similarity_threshold: f64,
        reranking: Option<RerankingConfig>,
    ) -> (SemanticCache, Arc<InMemoryVectorStore>) {
        let embedder = Arc::new(FixedVectorEmbedder { vector: vec![1.0, 0.0, 0.0] });
        let store = Arc::new(InMemoryVectorStore::default());
        let cache = SemanticCache::new(
            embedder,
            store.clone(),
            SemanticCacheConfig { similarity_threshold, reranking, default_ttl: Duration::from_secs(3600) },
            Duration::from_secs(5),
        );
        (cache, store)
    }

    #[tokio::test]
    async fn empty_prompt_is_a_miss() {
        let (cache, _store) = cache_with(0.95, None);
        assert!(cache.get("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn semantic_hit_returns_response_and_similarity() {
        let (cache, store) = cache_with(0.95, None);
        store
            .insert(
                VectorEntry {
                    id: Uuid::new_v4(),
                    vector: vec![0.98, 0.01, 0.01],
                    payload: VectorPayload {
                        prompt: "p".to_string(),
                        response: "r".to_string(),
                        model: "gpt-4o".to_string(),
                        created_at: 0,
                    },
                    ttl: Duration::from_secs(60),
                },
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        let hit = cache.get("some prompt").await.unwrap().unwrap();
        assert_eq!(hit.response, "r");
        assert!(hit.similarity > 0.9);
    }

    #[tokio::test]
    async fn below_threshold_candidates_are_a_miss() {
        let (cache, store) = cache_with(0.95, None);
        store
            .insert(
                VectorEntry {
                    id: Uuid::new_v4(),
                    vector: vec![0.0, 1.0, 0.0],
                    payload: VectorPayload {
                        prompt: "unrelated".to_string(),
                        response: "r".to_string(),
                        model: "gpt-4o".to_string(),
                        created_at: 0,
                    },
                    ttl: Duration::from_secs(60),
                },
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        assert!(cache.get("some prompt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reranking_prefers_the_higher_jaccard_candidate() {
        // Both embeddings are identical (fixed embedder), so vector score
        // alone can't distinguish them. Re-ranking is what picks Paris.
        let (cache, store) = cache_with(0.5, Some(RerankingConfig { top_k: 5, threshold: 0.1 }));
        store
            .insert(
                VectorEntry {
                    id: Uuid::new_v4(),
                    vector: vec![1.0, 0.0, 0.0],
                    payload: VectorPayload {
                        prompt: "capital of Germany".to_string(),
                        response: "Berlin".to_string(),
                        model: "gpt-4o".to_string(),
                        created_at: 0,
                    },
                    ttl: Duration::from_secs(60),
                },
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        store
            .insert(
                VectorEntry {
                    id: Uuid::new_v4(),
                    vector: vec![1.0, 0.0, 0.0],
                    payload: VectorPayload {
                        prompt: "capital city of France".to_string(),
                        response: "Paris".to_string(),
                        model: "gpt-4o".to_string(),
                        created_at: 0,
                    },
                    ttl: Duration::from_secs(60),
                },
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        let hit = cache.get("What is the capital of France?").await.unwrap().unwrap();
        assert_eq!(hit.response, "Paris");
    }

    #[tokio::test]
    async fn rerank_below_threshold_is_a_miss() {
        let (cache, store) = cache_with(0.5, Some(RerankingConfig { top_k: 5, threshold: 0.99 }));
        store
            .insert(
                VectorEntry {
                    id: Uuid::new_v4(),
                    vector: vec![1.0, 0.0, 0.0],
                    payload: VectorPayload {
                        prompt: "totally different words".to_string(),
                        response: "r".to_string(),
                        model: "gpt-4o".to_string(),
                        created_at: 0,
                    },
                    ttl: Duration::from_secs(60),
                },
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        assert!(cache.get("nothing like that prompt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_then_delete_removes_the_entry() {
        let (cache, store) = cache_with(0.95, None);
        cache.set("hello there", "hi!", "gpt-4o", Duration::ZERO).await.unwrap();
        assert!(cache.get("hello there").await.unwrap().is_some());

        cache.delete("hello there").await.unwrap();
        assert!(cache.get("hello there").await.unwrap().is_none());
        let _ = store;
    }

    #[tokio::test]
    async fn set_refuses_empty_prompt_or_response() {
        let (cache, store) = cache_with(0.95, None);
        cache.set("", "response", "gpt-4o", Duration::ZERO).await.unwrap();
        cache.set("prompt", "", "gpt-4o", Duration::ZERO).await.unwrap();
        assert_eq!(store.search(&[1.0, 0.0, 0.0], SearchOptions { top_k: 10, distance_threshold: 1.0 }, Duration::from_secs(1)).await.unwrap().len(), 0);
    }

    #[test]
    fn jaccard_matches_spec_examples() {
        assert_eq!(jaccard_similarity("hello world", "hello world"), 1.0);
        assert_eq!(jaccard_similarity("", "anything"), 0.0);
        assert_eq!(jaccard_similarity("a b", "b c"), 1.0 / 3.0);
    }
}
