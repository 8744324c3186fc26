//! Document loading and chunking.

pub mod chunker;
pub mod loader;

pub use chunker::{Chunk, Chunker};
pub use loader::{Document, DocumentLoader, SourceEncoding};
