//! Similarity service over embedding vectors
//!
//! Scores texts against a query by cosine similarity. Vectors are cached by
//! text so a work shared by many candidates is embedded once per run.

use std::sync::Arc;

use async_trait::async_trait;
use authorlink_core::{LinkError, Result, SimilarityService};
use moka::sync::Cache;
use tracing::debug;

use crate::embedding::EmbeddingClient;

/// Default number of cached vectors
pub const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

/// [`SimilarityService`] backed by an [`EmbeddingClient`]
pub struct EmbeddingSimilarity {
    client: Arc<dyn EmbeddingClient>,
    cache: Cache<String, Arc<Vec<f32>>>,
}

impl EmbeddingSimilarity {
    pub fn new(client: Arc<dyn EmbeddingClient>) -> Self {
        Self::with_capacity(client, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(client: Arc<dyn EmbeddingClient>, capacity: u64) -> Self {
        Self {
            client,
            cache: Cache::builder().max_capacity(capacity).build(),
        }
    }

    /// Embeddings for `texts`, fetching only the uncached ones
    async fn vectors(&self, texts: &[String]) -> Result<Vec<Arc<Vec<f32>>>> {
        let mut missing: Vec<String> = Vec::new();
        for text in texts {
            if !self.cache.contains_key(text) && !missing.contains(text) {
                missing.push(text.clone());
            }
        }

        if !missing.is_empty() {
            debug!(
                model = self.client.model(),
                requested = texts.len(),
                fetched = missing.len(),
                "Embedding texts"
            );
            let fetched = self.client.embed_batch(&missing).await?;
            if fetched.len() != missing.len() {
                return Err(LinkError::Similarity(format!(
                    "Expected {} embeddings, got {}",
                    missing.len(),
                    fetched.len()
                )));
            }
            for (text, vector) in missing.into_iter().zip(fetched) {
                self.cache.insert(text, Arc::new(vector));
            }
        }

        texts
            .iter()
            .map(|text| {
                self.cache
                    .get(text)
                    .ok_or_else(|| LinkError::Similarity("Embedding evicted before use".to_string()))
            })
            .collect()
    }
}

#[async_trait]
impl SimilarityService for EmbeddingSimilarity {
    async fn similarities(&self, query: &str, texts: &[String]) -> Result<Vec<f32>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all = Vec::with_capacity(texts.len() + 1);
        all.push(query.to_string());
        all.extend_from_slice(texts);

        let vectors = self.vectors(&all).await?;
        let (query_vector, text_vectors) = vectors
            .split_first()
            .ok_or_else(|| LinkError::Similarity("Missing query embedding".to_string()))?;

        Ok(text_vectors
            .iter()
            .map(|v| cosine_similarity(query_vector, v))
            .collect())
    }
}

/// Cosine similarity; zero when either vector has zero norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
