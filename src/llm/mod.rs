//! Model access: capability traits plus the Ollama HTTP client.

pub mod ollama;
pub mod provider;

pub use ollama::OllamaClient;
pub use provider::{TextEmbedder, TextGenerator};
