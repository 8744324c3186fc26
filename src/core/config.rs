//! Typed configuration for the pipeline.
//!
//! Settings come from a `config.yml` next to the process (overridable with
//! `DOCQA_CONFIG_PATH`); a missing file means defaults. Every value has a
//! default mirroring the reference deployment, so an empty file is valid.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::errors::RagError;

pub const CONFIG_PATH_ENV: &str = "DOCQA_CONFIG_PATH";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory scanned (non-recursively) for `*.txt` sources.
    pub documents_dir: PathBuf,
    /// Encoding label tried when a file is not valid UTF-8.
    pub fallback_encoding: String,
    pub chunking: ChunkingSettings,
    pub retrieval: RetrievalSettings,
    pub index: IndexSettings,
    pub ollama: OllamaSettings,
    /// When set, logs additionally go to a daily-rolling file here.
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub backend: IndexBackend,
    /// Location of the durable index; ignored by the memory backend.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OllamaSettings {
    pub base_url: String,
    pub generation_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            documents_dir: PathBuf::from("./data"),
            fallback_encoding: "big5".to_string(),
            chunking: ChunkingSettings::default(),
            retrieval: RetrievalSettings::default(),
            index: IndexSettings::default(),
            ollama: OllamaSettings::default(),
            log_dir: None,
        }
    }
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            backend: IndexBackend::Sqlite,
            path: PathBuf::from("./index/rag.db"),
        }
    }
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            generation_model: "cwchang/llama3-taide-lx-8b-chat-alpha1:latest".to_string(),
            embedding_model: "nomic-embed-text:latest".to_string(),
            temperature: 0.1,
            request_timeout_secs: 120,
        }
    }
}

impl AppConfig {
    /// Loads from `DOCQA_CONFIG_PATH`, falling back to `./config.yml`.
    pub fn load() -> Result<Self, RagError> {
        let path = match env::var(CONFIG_PATH_ENV) {
            Ok(path) => PathBuf::from(path),
            Err(_) => PathBuf::from("config.yml"),
        };
        Self::load_from(&path)
    }

    /// Loads from an explicit path; a missing or empty file yields the
    /// defaults, a malformed one is a configuration error.
    pub fn load_from(path: &Path) -> Result<Self, RagError> {
        let config = if path.exists() {
            let contents = fs::read_to_string(path)?;
            if contents.trim().is_empty() {
                AppConfig::default()
            } else {
                serde_yaml::from_str::<AppConfig>(&contents).map_err(|e| {
                    RagError::Configuration(format!("failed to parse {}: {}", path.display(), e))
                })?
            }
        } else {
            AppConfig::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RagError> {
        if self.chunking.chunk_size == 0 {
            return Err(RagError::Configuration(
                "chunking.chunk_size must be at least 1".to_string(),
            ));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(RagError::Configuration(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(RagError::Configuration(
                "retrieval.top_k must be at least 1".to_string(),
            ));
        }
        if self.ollama.base_url.trim().is_empty() {
            return Err(RagError::Configuration(
                "ollama.base_url must not be empty".to_string(),
            ));
        }
        if encoding_rs::Encoding::for_label(self.fallback_encoding.as_bytes()).is_none() {
            return Err(RagError::Configuration(format!(
                "unknown fallback_encoding label `{}`",
                self.fallback_encoding
            )));
        }
        Ok(())
    }
}
