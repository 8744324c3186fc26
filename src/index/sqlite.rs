//! SQLite-backed index. Embeddings live in a BLOB column as packed
//! little-endian f32; search scans the table in insertion order and scores
//! in process, so the database stays a dumb, durable row store.

use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::core::errors::RagError;
use crate::ingest::Chunk;

use super::store::{rank_by_similarity, IndexedChunk, ScoredChunk, VectorStore};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open(db_path: &Path) -> Result<Self, RagError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), RagError> {
        // seq is AUTOINCREMENT so insertion order survives restarts and is
        // never reused, which keeps tie-breaking stable.
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                content TEXT NOT NULL,
                source TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                embedding BLOB NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn replace_all(
        &self,
        items: Vec<IndexedChunk>,
        fingerprint: &str,
    ) -> Result<(), RagError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM sqlite_sequence WHERE name = 'chunks'")
            .execute(&mut *tx)
            .await?;

        for item in &items {
            let blob = Self::serialize_embedding(&item.embedding);
            sqlx::query(
                "INSERT INTO chunks (content, source, chunk_index, embedding)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(&item.chunk.text)
            .bind(&item.chunk.source_id)
            .bind(item.chunk.chunk_index as i64)
            .bind(&blob)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT OR REPLACE INTO index_meta (key, value, updated_at)
             VALUES ('fingerprint', ?1, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))",
        )
        .bind(fingerprint)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT OR REPLACE INTO index_meta (key, value, updated_at)
             VALUES ('built_at', ?1, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))",
        )
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredChunk>, RagError> {
        let rows = sqlx::query(
            "SELECT content, source, chunk_index, embedding
             FROM chunks
             ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await?;

        let items: Vec<IndexedChunk> = rows
            .iter()
            .map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                let chunk_index: i64 = row.get("chunk_index");
                IndexedChunk {
                    chunk: Chunk {
                        text: row.get("content"),
                        source_id: row.get("source"),
                        chunk_index: chunk_index as usize,
                    },
                    embedding: Self::deserialize_embedding(&embedding_bytes),
                }
            })
            .collect();

        Ok(rank_by_similarity(items, query, limit))
    }

    async fn count(&self) -> Result<usize, RagError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn fingerprint(&self) -> Result<Option<String>, RagError> {
        if self.count().await? == 0 {
            return Ok(None);
        }
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'fingerprint'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }
}
