//! Ollama-backed generation and embeddings over HTTP.
//!
//! `/api/generate` streams newline-delimited JSON. Transport chunks do not
//! line up with those newlines, so decoding keeps a carry-over buffer and
//! only parses complete lines; the terminal object carries `done: true` and
//! a stream that ends without it is reported as a failure, never silently
//! truncated.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use crate::core::config::OllamaSettings;
use crate::core::errors::RagError;

use super::provider::{TextEmbedder, TextGenerator};

#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    generation_model: String,
    embedding_model: String,
    temperature: f32,
    client: Client,
}

impl OllamaClient {
    pub fn new(settings: &OllamaSettings) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| RagError::Configuration(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            generation_model: settings.generation_model.clone(),
            embedding_model: settings.embedding_model.clone(),
            temperature: settings.temperature,
            client,
        })
    }

    /// True when the server answers `/api/tags`.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

}

/// One line of an `/api/generate` response, streaming or not.
#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, PartialEq)]
enum StreamLine {
    Fragment(String),
    /// Terminal line; may still carry a last piece of text.
    Done { trailing: String },
    Error(String),
    Skip,
}

fn parse_stream_line(line: &str) -> StreamLine {
    let line = line.trim();
    if line.is_empty() {
        return StreamLine::Skip;
    }
    let chunk: GenerateChunk = match serde_json::from_str(line) {
        Ok(chunk) => chunk,
        Err(e) => return StreamLine::Error(format!("malformed stream line: {}", e)),
    };
    if let Some(msg) = chunk.error {
        return StreamLine::Error(msg);
    }
    if chunk.done {
        StreamLine::Done {
            trailing: chunk.response,
        }
    } else if chunk.response.is_empty() {
        StreamLine::Skip
    } else {
        StreamLine::Fragment(chunk.response)
    }
}

/// Reassembles newline-delimited records from arbitrarily split byte chunks.
#[derive(Default)]
struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.push_str(&String::from_utf8_lossy(bytes));
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let line = self.pending[..pos].to_string();
            self.pending.drain(..=pos);
            lines.push(line);
        }
        lines
    }

    /// Whatever is left after the transport closed without a final newline.
    fn finish(self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending)
        }
    }
}

#[derive(PartialEq)]
enum Relay {
    More,
    Finished,
}

async fn relay_line(line: &str, tx: &mpsc::Sender<Result<String, RagError>>) -> Relay {
    match parse_stream_line(line) {
        StreamLine::Fragment(text) => {
            if tx.send(Ok(text)).await.is_err() {
                return Relay::Finished;
            }
            Relay::More
        }
        StreamLine::Done { trailing } => {
            if !trailing.is_empty() {
                let _ = tx.send(Ok(trailing)).await;
            }
            Relay::Finished
        }
        StreamLine::Error(msg) => {
            let _ = tx.send(Err(RagError::Generation(msg))).await;
            Relay::Finished
        }
        StreamLine::Skip => Relay::More,
    }
}

/// Decodes a JSONL generate body onto the fragment channel. Generic over
/// the byte source so the decode path can be driven without a server.
/// A body that ends before a `done` line is a generation error; the
/// consumer never sees a silently truncated answer.
async fn relay_stream_lines<S, B, E>(mut stream: S, tx: mpsc::Sender<Result<String, RagError>>)
where
    S: futures_util::Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut lines = LineBuffer::default();

    while let Some(item) = stream.next().await {
        let bytes = match item {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tx.send(Err(RagError::generation(e))).await;
                return;
            }
        };
        for line in lines.push(bytes.as_ref()) {
            if relay_line(&line, &tx).await == Relay::Finished {
                return;
            }
        }
    }

    if let Some(line) = lines.finish() {
        if relay_line(&line, &tx).await == Relay::Finished {
            return;
        }
    }

    let _ = tx
        .send(Err(RagError::Generation(
            "response stream ended without a completion marker".to_string(),
        )))
        .await;
}

#[async_trait]
impl TextGenerator for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String, RagError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = json!({
            "model": self.generation_model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": self.temperature },
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(RagError::generation)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Generation(format!(
                "ollama returned {}: {}",
                status, text
            )));
        }

        let payload: GenerateChunk = res.json().await.map_err(RagError::generation)?;
        if let Some(msg) = payload.error {
            return Err(RagError::Generation(msg));
        }
        Ok(payload.response)
    }

    async fn stream_generate(
        &self,
        prompt: &str,
    ) -> Result<mpsc::Receiver<Result<String, RagError>>, RagError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = json!({
            "model": self.generation_model,
            "prompt": prompt,
            "stream": true,
            "options": { "temperature": self.temperature },
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(RagError::generation)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Generation(format!(
                "ollama returned {}: {}",
                status, text
            )));
        }

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(relay_stream_lines(res.bytes_stream(), tx));
        Ok(rx)
    }
}

#[async_trait]
impl TextEmbedder for OllamaClient {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let mut embeddings: Vec<Vec<f32>> = Vec::with_capacity(inputs.len());

        for input in inputs {
            let body = json!({
                "model": self.embedding_model,
                "prompt": input,
            });
            let res = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(RagError::embedding)?;

            if !res.status().is_success() {
                let status = res.status();
                let text = res.text().await.unwrap_or_default();
                return Err(RagError::Embedding(format!(
                    "ollama returned {}: {}",
                    status, text
                )));
            }

            let payload: EmbeddingsResponse = res.json().await.map_err(RagError::embedding)?;
            if payload.embedding.is_empty() {
                return Err(RagError::Embedding(
                    "model returned an empty embedding".to_string(),
                ));
            }
            if let Some(first) = embeddings.first() {
                if payload.embedding.len() != first.len() {
                    return Err(RagError::Embedding(format!(
                        "inconsistent embedding dimensions: {} then {}",
                        first.len(),
                        payload.embedding.len()
                    )));
                }
            }
            embeddings.push(payload.embedding);
        }

        Ok(embeddings)
    }
}
