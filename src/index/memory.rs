//! In-memory index backend. Nothing survives the process; every start
//! rebuilds from scratch.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::errors::RagError;

use super::store::{rank_by_similarity, IndexedChunk, ScoredChunk, VectorStore};

#[derive(Default)]
struct Inner {
    rows: Vec<IndexedChunk>,
    fingerprint: Option<String>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn replace_all(
        &self,
        items: Vec<IndexedChunk>,
        fingerprint: &str,
    ) -> Result<(), RagError> {
        let mut inner = self.inner.write().await;
        inner.rows = items;
        inner.fingerprint = Some(fingerprint.to_string());
        Ok(())
    }

    async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredChunk>, RagError> {
        let inner = self.inner.read().await;
        Ok(rank_by_similarity(inner.rows.clone(), query, limit))
    }

    async fn count(&self) -> Result<usize, RagError> {
        Ok(self.inner.read().await.rows.len())
    }

    async fn fingerprint(&self) -> Result<Option<String>, RagError> {
        let inner = self.inner.read().await;
        if inner.rows.is_empty() {
            return Ok(None);
        }
        Ok(inner.fingerprint.clone())
    }
}
