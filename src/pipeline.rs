//! Pipeline orchestration.
//!
//! One explicit state machine owns the whole lifecycle: documents load,
//! chunks embed, and only a `Ready` pipeline answers queries. Every other
//! state refuses with an error naming the state, so callers never race a
//! half-built index. A failed initialization parks the pipeline in
//! `Failed` with the original error preserved; it can be re-initialized.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::core::config::{AppConfig, IndexBackend};
use crate::core::errors::RagError;
use crate::index::{corpus_fingerprint, MemoryStore, SqliteStore, VectorIndex, VectorStore};
use crate::ingest::{Chunk, Chunker, DocumentLoader};
use crate::llm::{OllamaClient, TextEmbedder, TextGenerator};
use crate::retriever::{RetrievalResult, Retriever};
use crate::synthesizer::{StreamingAnswer, Synthesizer};

/// Everything a query needs, built once per successful initialization.
struct ReadyState {
    retriever: Retriever,
    synthesizer: Synthesizer,
    documents: usize,
    chunks: usize,
}

enum PipelineState {
    Uninitialized,
    Loading,
    Indexing,
    Ready(Arc<ReadyState>),
    Failed { kind: &'static str, message: String },
}

impl PipelineState {
    fn name(&self) -> &'static str {
        match self {
            PipelineState::Uninitialized => "uninitialized",
            PipelineState::Loading => "loading",
            PipelineState::Indexing => "indexing",
            PipelineState::Ready(_) => "ready",
            PipelineState::Failed { .. } => "failed",
        }
    }
}

/// Snapshot of the state machine for status displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineStatus {
    Uninitialized,
    Loading,
    Indexing,
    Ready { documents: usize, chunks: usize },
    Failed { kind: &'static str, error: String },
}

/// A blocking answer plus the context that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub context_docs: Vec<RetrievalResult>,
}

/// Wire-level streaming event. `context` arrives first, then zero or more
/// `answer` fragments; the stream always finishes with exactly one `done`,
/// preceded by an `error` event when generation failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    Context(Vec<RetrievalResult>),
    Answer(String),
    Error(String),
    Done,
}

pub struct RagPipeline {
    config: AppConfig,
    embedder: Arc<dyn TextEmbedder>,
    generator: Arc<dyn TextGenerator>,
    store: Arc<dyn VectorStore>,
    state: RwLock<PipelineState>,
}

impl RagPipeline {
    /// Builds a pipeline with the Ollama client and the configured index
    /// backend.
    pub async fn from_config(config: AppConfig) -> Result<Self, RagError> {
        let client = Arc::new(OllamaClient::new(&config.ollama)?);
        if !client.health_check().await {
            tracing::warn!(
                "ollama is not reachable at {}; initialization and queries will fail until it is",
                config.ollama.base_url
            );
        }
        let store: Arc<dyn VectorStore> = match config.index.backend {
            IndexBackend::Memory => Arc::new(MemoryStore::new()),
            IndexBackend::Sqlite => Arc::new(SqliteStore::open(&config.index.path).await?),
        };
        Self::with_components(config, client.clone(), client, store)
    }

    /// Wires explicit model and storage implementations; the seam tests
    /// use to run the pipeline without a model server.
    pub fn with_components(
        config: AppConfig,
        embedder: Arc<dyn TextEmbedder>,
        generator: Arc<dyn TextGenerator>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self, RagError> {
        config.validate()?;
        Ok(Self {
            config,
            embedder,
            generator,
            store,
            state: RwLock::new(PipelineState::Uninitialized),
        })
    }

    pub async fn status(&self) -> PipelineStatus {
        match &*self.state.read().await {
            PipelineState::Uninitialized => PipelineStatus::Uninitialized,
            PipelineState::Loading => PipelineStatus::Loading,
            PipelineState::Indexing => PipelineStatus::Indexing,
            PipelineState::Ready(ready) => PipelineStatus::Ready {
                documents: ready.documents,
                chunks: ready.chunks,
            },
            PipelineState::Failed { kind, message } => PipelineStatus::Failed {
                kind: *kind,
                error: message.clone(),
            },
        }
    }

    /// Loads, chunks, embeds and indexes the corpus, then moves to `Ready`.
    ///
    /// Allowed from `Uninitialized`, `Failed` and `Ready` (a re-index);
    /// a second call while one is running is refused with `Busy`. On
    /// failure the pipeline lands in `Failed` and the error is returned.
    pub async fn initialize(&self) -> Result<(), RagError> {
        {
            let mut state = self.state.write().await;
            match *state {
                PipelineState::Loading | PipelineState::Indexing => {
                    return Err(RagError::Busy);
                }
                _ => *state = PipelineState::Loading,
            }
        }

        match self.run_initialize().await {
            Ok(ready) => {
                tracing::info!(
                    "pipeline ready: {} document(s), {} chunk(s)",
                    ready.documents,
                    ready.chunks
                );
                *self.state.write().await = PipelineState::Ready(Arc::new(ready));
                Ok(())
            }
            Err(err) => {
                tracing::error!("initialization failed ({}): {}", err.kind(), err);
                *self.state.write().await = PipelineState::Failed {
                    kind: err.kind(),
                    message: err.to_string(),
                };
                Err(err)
            }
        }
    }

    async fn run_initialize(&self) -> Result<ReadyState, RagError> {
        let config = &self.config;

        tracing::info!(
            "loading documents from {}",
            config.documents_dir.display()
        );
        let loader = DocumentLoader::new(&config.fallback_encoding)?;
        let documents = loader.load_dir(&config.documents_dir).await?;

        *self.state.write().await = PipelineState::Indexing;

        let chunker = Chunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|doc| chunker.split(&doc.text, &doc.source_id))
            .collect();
        if chunks.is_empty() {
            // Every document decoded but none held any text.
            return Err(RagError::NoDocuments {
                dir: config.documents_dir.clone(),
            });
        }
        tracing::info!(
            "chunked {} document(s) into {} chunk(s)",
            documents.len(),
            chunks.len()
        );

        let fingerprint = corpus_fingerprint(
            &config.ollama.embedding_model,
            config.chunking.chunk_size,
            config.chunking.chunk_overlap,
            &chunks,
        );
        let index = Arc::new(VectorIndex::new(self.store.clone()));
        let outcome = index
            .build(chunks, self.embedder.as_ref(), &fingerprint)
            .await?;

        let retriever = Retriever::new(index, self.embedder.clone(), config.retrieval.top_k)?;
        let synthesizer = Synthesizer::new(self.generator.clone());

        Ok(ReadyState {
            retriever,
            synthesizer,
            documents: documents.len(),
            chunks: outcome.chunks(),
        })
    }

    async fn ready_state(&self) -> Result<Arc<ReadyState>, RagError> {
        match &*self.state.read().await {
            PipelineState::Ready(ready) => Ok(ready.clone()),
            other => Err(RagError::NotReady {
                state: other.name(),
            }),
        }
    }

    /// Retrieves context and produces a complete answer.
    pub async fn query(&self, question: &str) -> Result<QueryResponse, RagError> {
        let ready = self.ready_state().await?;
        let query_id = Uuid::new_v4();
        tracing::info!("query {} started", query_id);

        let hits = ready.retriever.retrieve(question).await?;
        let context_docs: Vec<RetrievalResult> = hits.iter().map(RetrievalResult::from).collect();
        let answer = ready.synthesizer.answer(question, &hits).await?;

        tracing::info!(
            "query {} answered with {} context chunk(s)",
            query_id,
            context_docs.len()
        );
        Ok(QueryResponse {
            answer,
            context_docs,
        })
    }

    /// Retrieves context eagerly, then streams the answer body. Dropping
    /// the returned fragments receiver cancels generation.
    pub async fn query_stream(&self, question: &str) -> Result<StreamingAnswer, RagError> {
        let ready = self.ready_state().await?;
        let query_id = Uuid::new_v4();
        tracing::info!("streaming query {} started", query_id);

        let hits = ready.retriever.retrieve(question).await?;
        ready.synthesizer.stream_answer(question, hits).await
    }
}

/// Adapts a streaming answer into the wire event sequence: one `context`,
/// the `answer` fragments, then exactly one `done` (an `error` event slots
/// in before `done` when generation fails). Dropping the receiver stops
/// the adapter and, transitively, generation.
pub fn event_stream(answer: StreamingAnswer) -> mpsc::Receiver<StreamEvent> {
    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(async move {
        let StreamingAnswer {
            context,
            mut fragments,
        } = answer;

        if tx.send(StreamEvent::Context(context)).await.is_err() {
            return;
        }

        while let Some(item) = fragments.recv().await {
            match item {
                Ok(fragment) => {
                    if fragment.is_empty() {
                        continue;
                    }
                    if tx.send(StreamEvent::Answer(fragment)).await.is_err() {
                        return;
                    }
                }
                Err(err) => {
                    let _ = tx.send(StreamEvent::Error(err.to_string())).await;
                    let _ = tx.send(StreamEvent::Done).await;
                    return;
                }
            }
        }

        let _ = tx.send(StreamEvent::Done).await;
    });
    rx
}
