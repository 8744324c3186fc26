use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::errors::RagError;

/// Turns text into vectors. Implementations pick their own model; callers
/// only rely on every vector in one batch having the same dimension.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError>;
}

/// Produces completions for a prompt, either whole or as a fragment stream.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Full completion in one call.
    async fn generate(&self, prompt: &str) -> Result<String, RagError>;

    /// Incremental completion. Fragments arrive on the receiver in order;
    /// an `Err` item ends the stream. Dropping the receiver cancels the
    /// underlying request.
    async fn stream_generate(
        &self,
        prompt: &str,
    ) -> Result<mpsc::Receiver<Result<String, RagError>>, RagError>;
}
