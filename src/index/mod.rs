//! Vector index over chunked documents.
//!
//! A build replaces the whole index in one shot; incremental updates are
//! deliberately not supported. Durable backends record a corpus
//! fingerprint so an unchanged corpus can skip re-embedding on restart.

pub mod memory;
pub mod sqlite;
pub mod store;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::{IndexedChunk, ScoredChunk, VectorStore};

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::core::errors::RagError;
use crate::ingest::Chunk;
use crate::llm::TextEmbedder;

/// Hash of everything that determines the stored vectors: chunking
/// parameters, embedding model, and every chunk in corpus order. Fields
/// are length-prefixed so adjacent values cannot run together.
pub fn corpus_fingerprint(
    embedding_model: &str,
    chunk_size: usize,
    overlap: usize,
    chunks: &[Chunk],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"docqa-index-v1");
    hasher.update((chunk_size as u64).to_le_bytes());
    hasher.update((overlap as u64).to_le_bytes());
    hasher.update((embedding_model.len() as u64).to_le_bytes());
    hasher.update(embedding_model.as_bytes());
    hasher.update((chunks.len() as u64).to_le_bytes());
    for chunk in chunks {
        hasher.update((chunk.source_id.len() as u64).to_le_bytes());
        hasher.update(chunk.source_id.as_bytes());
        hasher.update((chunk.chunk_index as u64).to_le_bytes());
        hasher.update((chunk.text.len() as u64).to_le_bytes());
        hasher.update(chunk.text.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Chunks were embedded and written to the backend.
    Built { chunks: usize },
    /// Stored rows already match this corpus; no embedding ran.
    Reused { chunks: usize },
}

impl BuildOutcome {
    pub fn chunks(&self) -> usize {
        match self {
            BuildOutcome::Built { chunks } | BuildOutcome::Reused { chunks } => *chunks,
        }
    }
}

pub struct VectorIndex {
    store: Arc<dyn VectorStore>,
}

impl VectorIndex {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    /// Embeds `chunks` and replaces the backend contents, unless the
    /// backend already holds rows for exactly this fingerprint.
    pub async fn build(
        &self,
        chunks: Vec<Chunk>,
        embedder: &dyn TextEmbedder,
        fingerprint: &str,
    ) -> Result<BuildOutcome, RagError> {
        let existing = self.store.count().await?;
        if existing > 0 && self.store.fingerprint().await?.as_deref() == Some(fingerprint) {
            tracing::info!(
                "index already matches the corpus, reusing {} stored chunk(s)",
                existing
            );
            return Ok(BuildOutcome::Reused { chunks: existing });
        }

        tracing::info!("embedding {} chunk(s)", chunks.len());
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = embedder.embed(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::Embedding(format!(
                "embedder returned {} vectors for {} inputs",
                embeddings.len(),
                chunks.len()
            )));
        }

        let items: Vec<IndexedChunk> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedChunk { chunk, embedding })
            .collect();
        let total = items.len();
        self.store.replace_all(items, fingerprint).await?;
        Ok(BuildOutcome::Built { chunks: total })
    }

    /// Top-`limit` rows by cosine similarity. Fails with `IndexNotReady`
    /// when no build has populated the backend yet.
    pub async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredChunk>, RagError> {
        if self.store.count().await? == 0 {
            return Err(RagError::IndexNotReady);
        }
        self.store.search(query, limit).await
    }
}
