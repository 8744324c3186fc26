use std::path::PathBuf;

use thiserror::Error;

/// Failure taxonomy for the RAG pipeline.
///
/// Stage-local recoverable issues (a single file that fails to decode) are
/// absorbed and logged where they happen; everything that reaches a caller
/// goes through this enum. Streaming callers additionally receive a terminal
/// `error` event so a stream never just closes on failure.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("no documents could be loaded from {}", dir.display())]
    NoDocuments { dir: PathBuf },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("vector index has not been built")]
    IndexNotReady,

    #[error("pipeline cannot serve queries in state `{state}`")]
    NotReady { state: &'static str },

    #[error("initialization is already in progress")]
    Busy,

    #[error("text generation failed: {0}")]
    Generation(String),

    #[error("embedding request failed: {0}")]
    Embedding(String),

    #[error("index storage error: {0}")]
    Storage(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub fn generation<E: std::fmt::Display>(err: E) -> Self {
        RagError::Generation(err.to_string())
    }

    pub fn embedding<E: std::fmt::Display>(err: E) -> Self {
        RagError::Embedding(err.to_string())
    }

    /// Stable kind label, used in log fields and in the `Failed` pipeline
    /// state so the originating stage stays identifiable after the fact.
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::NoDocuments { .. } => "no_documents",
            RagError::Configuration(_) => "configuration",
            RagError::IndexNotReady => "index_not_ready",
            RagError::NotReady { .. } => "not_ready",
            RagError::Busy => "busy",
            RagError::Generation(_) => "generation",
            RagError::Embedding(_) => "embedding",
            RagError::Storage(_) => "storage",
            RagError::Io(_) => "io",
        }
    }
}

impl From<sqlx::Error> for RagError {
    fn from(err: sqlx::Error) -> Self {
        RagError::Storage(err.to_string())
    }
}
