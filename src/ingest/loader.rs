//! Plain-text document loading.
//!
//! Scans a directory (non-recursively) for `*.txt` files in lexicographic
//! name order. Each file is read as strict UTF-8 first; on failure one
//! retry with the configured fallback encoding is attempted. A file that
//! survives neither decode is logged and skipped, never fatal on its own.

use std::path::Path;

use encoding_rs::Encoding;

use crate::core::errors::RagError;

/// How a document's bytes were turned into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    Utf8,
    /// Decoded via the fallback; carries the resolved encoding name.
    Fallback(&'static str),
}

/// A loaded source file.
#[derive(Debug, Clone)]
pub struct Document {
    pub text: String,
    /// The file name (without directory) used for citations.
    pub source_id: String,
    pub encoding: SourceEncoding,
}

pub struct DocumentLoader {
    fallback: &'static Encoding,
}

impl DocumentLoader {
    /// `fallback_label` is any WHATWG encoding label, e.g. `big5`.
    pub fn new(fallback_label: &str) -> Result<Self, RagError> {
        let fallback = Encoding::for_label(fallback_label.as_bytes()).ok_or_else(|| {
            RagError::Configuration(format!(
                "unknown fallback_encoding label `{}`",
                fallback_label
            ))
        })?;
        Ok(Self { fallback })
    }

    /// Loads every decodable `.txt` file under `dir`.
    ///
    /// Returns `NoDocuments` when the directory is missing, holds no `.txt`
    /// files, or every candidate fails to decode.
    pub async fn load_dir(&self, dir: &Path) -> Result<Vec<Document>, RagError> {
        if !dir.is_dir() {
            tracing::warn!("document directory {} does not exist", dir.display());
            return Err(RagError::NoDocuments {
                dir: dir.to_path_buf(),
            });
        }

        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let is_txt = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("txt"))
                .unwrap_or(false);
            if is_txt {
                paths.push(path);
            }
        }
        // Directory iteration order is platform-defined; sort for a stable
        // corpus order.
        paths.sort();

        let mut documents = Vec::new();
        for path in &paths {
            match self.load_file(path).await {
                Ok(Some(document)) => documents.push(document),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!("failed to read {}: {}", path.display(), err);
                }
            }
        }

        if documents.is_empty() {
            return Err(RagError::NoDocuments {
                dir: dir.to_path_buf(),
            });
        }

        tracing::info!(
            "loaded {} document(s) from {}",
            documents.len(),
            dir.display()
        );
        Ok(documents)
    }

    /// Reads one file; `Ok(None)` means it failed both decodes and was
    /// skipped.
    async fn load_file(&self, path: &Path) -> Result<Option<Document>, RagError> {
        let source_id = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let bytes = tokio::fs::read(path).await?;

        match String::from_utf8(bytes) {
            Ok(text) => Ok(Some(Document {
                text,
                source_id,
                encoding: SourceEncoding::Utf8,
            })),
            Err(err) => {
                let bytes = err.into_bytes();
                let (text, encoding, had_errors) = self.fallback.decode(&bytes);
                if had_errors {
                    tracing::warn!(
                        "skipping {}: not valid UTF-8 and {} decode failed",
                        path.display(),
                        self.fallback.name()
                    );
                    return Ok(None);
                }
                tracing::debug!(
                    "decoded {} with fallback encoding {}",
                    path.display(),
                    encoding.name()
                );
                Ok(Some(Document {
                    text: text.into_owned(),
                    source_id,
                    encoding: SourceEncoding::Fallback(encoding.name()),
                }))
            }
        }
    }
}
