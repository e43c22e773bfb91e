//! # Retrieval
//!
//! Semantic (vector) and full-text ranking, abstracted behind a trait so the
//! catalog never hard-codes a similarity metric or a search engine client —
//! spec §1 treats "semantic/vector/full-text search" as a separate
//! replaceable interface from the catalog's storage itself. [`InMemoryRetrieval`]
//! is the reference implementation: cosine similarity over embeddings, token
//! overlap over text, both computed in-process rather than against an
//! external index (grounded in the same out-of-scope-collaborator pattern
//! [`crate::catalog::InMemoryCatalog`] uses for Mongo).

use async_trait::async_trait;
use workflow_engine_core::error::Result;

/// A ranked candidate returned by a [`Retrieval`] query, paired back to the
/// caller's own id space.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedMatch {
    pub id: String,
    pub score: f64,
}

/// Abstracts similarity ranking over a caller-supplied candidate set. Taking
/// candidates as an argument (rather than owning an index) keeps this trait
/// storage-agnostic: the catalog decides what the candidate universe is.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Retrieval: Send + Sync {
    async fn rank_by_embedding(
        &self,
        query: &[f32],
        candidates: &[(String, Vec<f32>)],
        top_k: usize,
    ) -> Result<Vec<RankedMatch>>;

    async fn rank_by_text(&self, query: &str, candidates: &[(String, String)], top_k: usize) -> Result<Vec<RankedMatch>>;
}

#[derive(Default)]
pub struct InMemoryRetrieval;

impl InMemoryRetrieval {
    pub fn new() -> Self {
        Self
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
        if a.is_empty() || b.is_empty() || a.len() != b.len() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        (dot / (norm_a * norm_b)) as f64
    }

    fn token_overlap_score(query: &str, text: &str) -> f64 {
        let query_tokens: std::collections::HashSet<String> =
            query.to_lowercase().split_whitespace().map(str::to_string).collect();
        if query_tokens.is_empty() {
            return 0.0;
        }
        let text_tokens: std::collections::HashSet<String> =
            text.to_lowercase().split_whitespace().map(str::to_string).collect();
        let overlap = query_tokens.intersection(&text_tokens).count();
        overlap as f64 / query_tokens.len() as f64
    }
}

#[async_trait]
impl Retrieval for InMemoryRetrieval {
    async fn rank_by_embedding(
        &self,
        query: &[f32],
        candidates: &[(String, Vec<f32>)],
        top_k: usize,
    ) -> Result<Vec<RankedMatch>> {
        let mut ranked: Vec<RankedMatch> = candidates
            .iter()
            .map(|(id, embedding)| RankedMatch {
                id: id.clone(),
                score: Self::cosine_similarity(query, embedding),
            })
            .collect();
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(top_k);
        Ok(ranked)
    }

    async fn rank_by_text(&self, query: &str, candidates: &[(String, String)], top_k: usize) -> Result<Vec<RankedMatch>> {
        let mut ranked: Vec<RankedMatch> = candidates
            .iter()
            .map(|(id, text)| RankedMatch {
                id: id.clone(),
                score: Self::token_overlap_score(query, text),
            })
            .filter(|m| m.score > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(top_k);
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rank_by_embedding_orders_by_cosine_similarity_descending() {
        let retrieval = InMemoryRetrieval::new();
        let candidates = vec![
            ("orthogonal".to_string(), vec![0.0, 1.0]),
            ("identical".to_string(), vec![1.0, 0.0]),
        ];
        let ranked = retrieval.rank_by_embedding(&[1.0, 0.0], &candidates, 2).await.unwrap();
        assert_eq!(ranked[0].id, "identical");
        assert!(ranked[0].score > ranked[1].score);
    }

    #[tokio::test]
    async fn rank_by_embedding_respects_top_k() {
        let retrieval = InMemoryRetrieval::new();
        let candidates = vec![
            ("a".to_string(), vec![1.0, 0.0]),
            ("b".to_string(), vec![0.9, 0.1]),
            ("c".to_string(), vec![0.0, 1.0]),
        ];
        let ranked = retrieval.rank_by_embedding(&[1.0, 0.0], &candidates, 1).await.unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, "a");
    }

    #[tokio::test]
    async fn rank_by_text_scores_by_token_overlap() {
        let retrieval = InMemoryRetrieval::new();
        let candidates = vec![
            ("match".to_string(), "book a flight to paris".to_string()),
            ("nomatch".to_string(), "completely unrelated text".to_string()),
        ];
        let ranked = retrieval.rank_by_text("book flight paris", &candidates, 5).await.unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, "match");
    }

    #[tokio::test]
    async fn zero_vectors_never_panic_and_score_zero() {
        let retrieval = InMemoryRetrieval::new();
        let candidates = vec![("zero".to_string(), vec![0.0, 0.0])];
        let ranked = retrieval.rank_by_embedding(&[1.0, 0.0], &candidates, 1).await.unwrap();
        assert_eq!(ranked[0].score, 0.0);
    }
}
