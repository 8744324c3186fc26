//! Question answering over a local folder of plain-text documents.
//!
//! The pipeline loads `.txt` files, splits them into overlapping character
//! windows, embeds them into a vector index, and answers questions by
//! retrieving the most similar chunks and prompting a generation model
//! with them. Answers are available blocking or as a cancellable stream.

pub mod core;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod retriever;
pub mod synthesizer;

pub use crate::core::config::AppConfig;
pub use crate::core::errors::RagError;
pub use crate::pipeline::{event_stream, QueryResponse, RagPipeline, StreamEvent};
pub use crate::retriever::RetrievalResult;
pub use crate::synthesizer::{StreamingAnswer, NO_ANSWER_SENTINEL};
