//! Similarity search with maximal-marginal-relevance re-ranking.

use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use crate::error::{ProcessingError, ResultExt};
use crate::qdrant::{QdrantService, ScoredPoint};
use std::sync::Arc;

const DEFAULT_FETCH_K: usize = 20;
const DEFAULT_K: usize = 4;
const DEFAULT_LAMBDA: f32 = 0.5;

/// Retrieves context chunks for a question.
pub struct Retriever {
    embedding: Arc<dyn EmbeddingClient>,
    qdrant: Arc<QdrantService>,
    collection: String,
    fetch_k: usize,
    k: usize,
    lambda: f32,
}

impl Retriever {
    /// Retriever over `collection` with `fetch_k = 20`, `k = 4`, `lambda = 0.5`.
    pub fn new(
        embedding: Arc<dyn EmbeddingClient>,
        qdrant: Arc<QdrantService>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            embedding,
            qdrant,
            collection: collection.into(),
            fetch_k: DEFAULT_FETCH_K,
            k: DEFAULT_K,
            lambda: DEFAULT_LAMBDA,
        }
    }

    /// Embed `query`, fetch candidates and pick a diverse subset.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredPoint>, ProcessingError> {
        let query_vector = self
            .embedding
            .generate_embeddings(vec![query.to_string()])
            .await
            .context("failed to embed question")?
            .into_iter()
            .next()
            .ok_or_else(|| {
                ProcessingError::new(
                    "failed to embed question",
                    EmbeddingClientError::InvalidResponse("no embedding returned".into()),
                )
            })?;

        let candidates = self
            .qdrant
            .query_points(&self.collection, &query_vector, self.fetch_k, true)
            .await
            .context("failed to search vector store")?;

        let (with_vectors, vectors): (Vec<&ScoredPoint>, Vec<&[f32]>) = candidates
            .iter()
            .filter_map(|point| point.vector.as_deref().map(|vector| (point, vector)))
            .unzip();

        let selected: Vec<ScoredPoint> = if with_vectors.is_empty() {
            candidates.iter().take(self.k).cloned().collect()
        } else {
            maximal_marginal_relevance(&query_vector, &vectors, self.k, self.lambda)
                .into_iter()
                .map(|index| with_vectors[index].clone())
                .collect()
        };
        tracing::debug!(
            candidates = candidates.len(),
            selected = selected.len(),
            "Retrieved context"
        );
        Ok(selected)
    }
}

/// Cosine similarity; zero when either vector has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Indices of up to `k` candidates balancing query relevance against redundancy.
///
/// `lambda = 1` ranks purely by similarity to the query; `lambda = 0` purely by diversity.
pub fn maximal_marginal_relevance(
    query: &[f32],
    candidates: &[&[f32]],
    k: usize,
    lambda: f32,
) -> Vec<usize> {
    let limit = k.min(candidates.len());
    if limit == 0 {
        return Vec::new();
    }
    let relevance: Vec<f32> = candidates
        .iter()
        .map(|candidate| cosine_similarity(query, candidate))
        .collect();

    let mut selected = Vec::with_capacity(limit);
    while selected.len() < limit {
        let mut best: Option<(usize, f32)> = None;
        for (index, candidate) in candidates.iter().enumerate() {
            if selected.contains(&index) {
                continue;
            }
            let redundancy = selected
                .iter()
                .map(|&chosen: &usize| cosine_similarity(candidate, candidates[chosen]))
                .fold(f32::NEG_INFINITY, f32::max);
            let score = if selected.is_empty() {
                relevance[index]
            } else {
                lambda * relevance[index] - (1.0 - lambda) * redundancy
            };
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((index, score));
            }
        }
        match best {
            Some((index, _)) => selected.push(index),
            None => break,
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_handles_zero_vectors() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn mmr_prefers_diverse_results() {
        let query = [1.0, 0.0];
        let near = [1.0, 0.3];
        let near_duplicate = [1.0, 0.31];
        let different = [1.0, -0.35];
        let candidates: Vec<&[f32]> = vec![&near[..], &near_duplicate[..], &different[..]];

        let picked = maximal_marginal_relevance(&query, &candidates, 2, 0.5);
        assert_eq!(picked, vec![0, 2]);

        let relevance_only = maximal_marginal_relevance(&query, &candidates, 2, 1.0);
        assert_eq!(relevance_only, vec![0, 1]);
    }

    #[test]
    fn mmr_caps_at_candidate_count() {
        let query = [1.0];
        let only = [1.0];
        assert_eq!(maximal_marginal_relevance(&query, &[&only[..]], 4, 0.5), vec![0]);
        assert!(maximal_marginal_relevance(&query, &[], 4, 0.5).is_empty());
    }
}
