//! Query-time similarity retrieval.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::errors::RagError;
use crate::index::{ScoredChunk, VectorIndex};
use crate::llm::TextEmbedder;

/// A retrieved passage as shown to callers: the chunk text plus the file
/// it came from. Scores stay internal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub content: String,
    pub source: String,
}

impl From<&ScoredChunk> for RetrievalResult {
    fn from(scored: &ScoredChunk) -> Self {
        Self {
            content: scored.chunk.text.clone(),
            source: scored.chunk.source_id.clone(),
        }
    }
}

pub struct Retriever {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn TextEmbedder>,
    top_k: usize,
}

impl Retriever {
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn TextEmbedder>,
        top_k: usize,
    ) -> Result<Self, RagError> {
        if top_k == 0 {
            return Err(RagError::Configuration(
                "retrieval.top_k must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            index,
            embedder,
            top_k,
        })
    }

    /// Embeds the query and returns the best matches, at most `top_k`.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredChunk>, RagError> {
        let embeddings = self.embedder.embed(&[query.to_string()]).await?;
        let query_embedding = embeddings.into_iter().next().ok_or_else(|| {
            RagError::Embedding("embedder returned no vector for the query".to_string())
        })?;

        let hits = self.index.search(&query_embedding, self.top_k).await?;
        tracing::debug!(
            "retrieved {} chunk(s) for query (top score {:.4})",
            hits.len(),
            hits.first().map(|h| h.score).unwrap_or(0.0)
        );
        Ok(hits)
    }
}
