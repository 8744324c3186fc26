//! Storage backend interface for the vector index.

use async_trait::async_trait;

use crate::core::errors::RagError;
use crate::ingest::Chunk;

/// A chunk paired with its embedding, as handed to a backend.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// One similarity hit. Higher scores are better.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Vector index backend.
///
/// Backends keep rows in insertion order and search must break score ties
/// by that order, so results stay reproducible run to run.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Atomically drops every stored row and replaces it with `items`,
    /// recording the corpus fingerprint they were built from.
    async fn replace_all(&self, items: Vec<IndexedChunk>, fingerprint: &str)
        -> Result<(), RagError>;

    /// Brute-force scan ranked by cosine similarity, best first. Returns at
    /// most `limit` rows; fewer when the store holds fewer.
    async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredChunk>, RagError>;

    async fn count(&self) -> Result<usize, RagError>;

    /// Fingerprint recorded by the last `replace_all`, if any rows survive.
    async fn fingerprint(&self) -> Result<Option<String>, RagError>;
}

/// Cosine similarity with the degenerate cases pinned to 0.0: mismatched
/// dimensions, empty vectors, and near-zero norms all score zero instead
/// of producing NaN.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

/// Ranks `rows` by score descending, preserving input order for ties, and
/// keeps the best `limit`. Shared by every backend so tie-breaking cannot
/// drift between them.
pub(crate) fn rank_by_similarity(
    rows: Vec<IndexedChunk>,
    query: &[f32],
    limit: usize,
) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = rows
        .into_iter()
        .map(|row| ScoredChunk {
            score: cosine_similarity(query, &row.embedding),
            chunk: row.chunk,
        })
        .collect();

    // Stable sort: equal scores keep insertion order.
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            source_id: "doc.txt".to_string(),
            chunk_index: 0,
        }
    }

    #[test]
    fn identical_vectors_score_one() {
        let v = vec![0.3, -0.5, 0.8];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn opposite_vectors_score_minus_one() {
        let score = cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]);
        assert!((score + 1.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_inputs_score_zero() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn ranking_is_descending_and_truncated() {
        let rows = vec![
            IndexedChunk {
                chunk: chunk("far"),
                embedding: vec![0.0, 1.0],
            },
            IndexedChunk {
                chunk: chunk("near"),
                embedding: vec![1.0, 0.0],
            },
            IndexedChunk {
                chunk: chunk("middle"),
                embedding: vec![1.0, 1.0],
            },
        ];

        let ranked = rank_by_similarity(rows, &[1.0, 0.0], 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].chunk.text, "near");
        assert_eq!(ranked[1].chunk.text, "middle");
        assert!(ranked[0].score >= ranked[1].score);
    }

    #[test]
    fn score_ties_keep_insertion_order() {
        let rows = vec![
            IndexedChunk {
                chunk: chunk("first"),
                embedding: vec![1.0, 0.0],
            },
            IndexedChunk {
                chunk: chunk("second"),
                embedding: vec![1.0, 0.0],
            },
            IndexedChunk {
                chunk: chunk("third"),
                embedding: vec![1.0, 0.0],
            },
        ];

        let ranked = rank_by_similarity(rows, &[1.0, 0.0], 3);
        let texts: Vec<&str> = ranked.iter().map(|s| s.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }
}
