//! Answer synthesis from retrieved context.
//!
//! The prompt instructs the model to answer only from the supplied
//! material and to fall back to a fixed refusal sentence when the material
//! does not cover the question, so "no answer" is a detectable string
//! rather than a hallucinated guess.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::core::errors::RagError;
use crate::index::ScoredChunk;
use crate::llm::TextGenerator;
use crate::retriever::RetrievalResult;

/// Exact refusal line the prompt asks for when the context is unhelpful.
pub const NO_ANSWER_SENTINEL: &str =
    "I could not find relevant information in the provided documents.";

/// A streaming answer: the context is known up front, the body arrives
/// incrementally. Dropping `fragments` cancels generation.
pub struct StreamingAnswer {
    pub context: Vec<RetrievalResult>,
    pub fragments: mpsc::Receiver<Result<String, RagError>>,
}

pub struct Synthesizer {
    generator: Arc<dyn TextGenerator>,
}

impl Synthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    fn build_prompt(question: &str, hits: &[ScoredChunk]) -> String {
        let mut material = String::new();
        for (i, hit) in hits.iter().enumerate() {
            material.push_str(&format!(
                "[{}] (Source: {})\n{}\n\n",
                i + 1,
                hit.chunk.source_id,
                hit.chunk.text
            ));
        }

        format!(
            "Answer the question using only the material below.\n\
             If the material does not contain the answer, reply exactly: {}\n\n\
             Material:\n{}Question: {}\n\nAnswer:",
            NO_ANSWER_SENTINEL, material, question
        )
    }

    /// Whole answer in one call. With no context at all the sentinel is
    /// returned directly; the model has nothing to ground an answer in.
    pub async fn answer(&self, question: &str, hits: &[ScoredChunk]) -> Result<String, RagError> {
        if hits.is_empty() {
            return Ok(NO_ANSWER_SENTINEL.to_string());
        }

        let prompt = Self::build_prompt(question, hits);
        tracing::debug!("generating answer from {} context chunk(s)", hits.len());
        self.generator.generate(&prompt).await
    }

    /// Streamed answer. The returned value carries the full context
    /// immediately; fragments follow on the channel as the model produces
    /// them.
    pub async fn stream_answer(
        &self,
        question: &str,
        hits: Vec<ScoredChunk>,
    ) -> Result<StreamingAnswer, RagError> {
        let context: Vec<RetrievalResult> = hits.iter().map(RetrievalResult::from).collect();

        if hits.is_empty() {
            let (tx, rx) = mpsc::channel(1);
            // Channel closes once tx drops, after the sentinel.
            let _ = tx.send(Ok(NO_ANSWER_SENTINEL.to_string())).await;
            return Ok(StreamingAnswer {
                context,
                fragments: rx,
            });
        }

        let prompt = Self::build_prompt(question, &hits);
        tracing::debug!("streaming answer from {} context chunk(s)", hits.len());
        let fragments = self.generator.stream_generate(&prompt).await?;
        Ok(StreamingAnswer { context, fragments })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::ingest::Chunk;

    fn hit(text: &str, source: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                text: text.to_string(),
                source_id: source.to_string(),
                chunk_index: 0,
            },
            score: 0.8,
        }
    }

    /// Replays a fixed script of fragments; `Err` entries become
    /// generation failures.
    struct ScriptedGenerator {
        script: Vec<Result<String, String>>,
        prompts: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedGenerator {
        fn new(script: Vec<Result<String, String>>) -> Self {
            Self {
                script,
                prompts: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }

        fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, RagError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            let mut answer = String::new();
            for item in &self.script {
                match item {
                    Ok(fragment) => answer.push_str(fragment),
                    Err(msg) => return Err(RagError::Generation(msg.clone())),
                }
            }
            Ok(answer)
        }

        async fn stream_generate(
            &self,
            prompt: &str,
        ) -> Result<mpsc::Receiver<Result<String, RagError>>, RagError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            let script = self.script.clone();
            let (tx, rx) = mpsc::channel(4);
            tokio::spawn(async move {
                for item in script {
                    let item = item.map_err(RagError::Generation);
                    let failed = item.is_err();
                    if tx.send(item).await.is_err() || failed {
                        return;
                    }
                }
            });
            Ok(rx)
        }
    }

    #[test]
    fn prompt_numbers_chunks_and_cites_sources() {
        let hits = vec![hit("first passage", "a.txt"), hit("second passage", "b.txt")];
        let prompt = Synthesizer::build_prompt("what is this?", &hits);

        assert!(prompt.contains("[1] (Source: a.txt)\nfirst passage"));
        assert!(prompt.contains("[2] (Source: b.txt)\nsecond passage"));
        assert!(prompt.contains("Question: what is this?"));
        assert!(prompt.contains(NO_ANSWER_SENTINEL));
        // Context must precede the question.
        assert!(prompt.find("first passage").unwrap() < prompt.find("Question:").unwrap());
    }

    #[tokio::test]
    async fn blocking_answer_feeds_context_to_the_generator() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok("the answer".to_string())]));
        let synthesizer = Synthesizer::new(generator.clone());

        let answer = synthesizer
            .answer("question?", &[hit("relevant text", "doc.txt")])
            .await
            .unwrap();

        assert_eq!(answer, "the answer");
        assert!(generator.last_prompt().contains("relevant text"));
    }

    #[tokio::test]
    async fn empty_context_short_circuits_to_the_sentinel() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok("unused".to_string())]));
        let synthesizer = Synthesizer::new(generator.clone());

        let answer = synthesizer.answer("question?", &[]).await.unwrap();
        assert_eq!(answer, NO_ANSWER_SENTINEL);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);

        let mut streamed = synthesizer.stream_answer("question?", vec![]).await.unwrap();
        assert!(streamed.context.is_empty());
        let only = streamed.fragments.recv().await.unwrap().unwrap();
        assert_eq!(only, NO_ANSWER_SENTINEL);
        assert!(streamed.fragments.recv().await.is_none());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn streaming_answer_exposes_context_before_fragments() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Ok("Hel".to_string()),
            Ok("lo".to_string()),
        ]));
        let synthesizer = Synthesizer::new(generator);

        let mut streamed = synthesizer
            .stream_answer("greeting?", vec![hit("greetings text", "greet.txt")])
            .await
            .unwrap();

        assert_eq!(streamed.context.len(), 1);
        assert_eq!(streamed.context[0].source, "greet.txt");

        let mut answer = String::new();
        while let Some(fragment) = streamed.fragments.recv().await {
            answer.push_str(&fragment.unwrap());
        }
        assert_eq!(answer, "Hello");
    }

    #[tokio::test]
    async fn mid_stream_failure_reaches_the_consumer() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Ok("partial".to_string()),
            Err("model crashed".to_string()),
        ]));
        let synthesizer = Synthesizer::new(generator);

        let mut streamed = synthesizer
            .stream_answer("q", vec![hit("text", "doc.txt")])
            .await
            .unwrap();

        assert_eq!(streamed.fragments.recv().await.unwrap().unwrap(), "partial");
        let err = streamed.fragments.recv().await.unwrap().unwrap_err();
        assert!(matches!(err, RagError::Generation(_)));
        assert!(streamed.fragments.recv().await.is_none());
    }

    /// Emits fragments forever until the consumer goes away, then raises a
    /// flag so the test can observe cancellation.
    struct EndlessGenerator {
        cancelled: Arc<AtomicBool>,
    }

    #[async_trait]
    impl TextGenerator for EndlessGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, RagError> {
            Ok(String::new())
        }

        async fn stream_generate(
            &self,
            _prompt: &str,
        ) -> Result<mpsc::Receiver<Result<String, RagError>>, RagError> {
            let cancelled = self.cancelled.clone();
            let (tx, rx) = mpsc::channel(1);
            tokio::spawn(async move {
                loop {
                    if tx.send(Ok("chunk ".to_string())).await.is_err() {
                        cancelled.store(true, Ordering::SeqCst);
                        return;
                    }
                }
            });
            Ok(rx)
        }
    }

    #[tokio::test]
    async fn dropping_the_receiver_cancels_generation() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let synthesizer = Synthesizer::new(Arc::new(EndlessGenerator {
            cancelled: cancelled.clone(),
        }));

        let mut streamed = synthesizer
            .stream_answer("q", vec![hit("text", "doc.txt")])
            .await
            .unwrap();
        streamed.fragments.recv().await.unwrap().unwrap();
        drop(streamed);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !cancelled.load(Ordering::SeqCst) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "producer kept running after the receiver was dropped"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
