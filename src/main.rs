use std::io::Write as _;
use std::path::Path;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use docqa::pipeline::PipelineStatus;
use docqa::{event_stream, AppConfig, RagPipeline, StreamEvent};

const SAMPLE_DOCUMENT: &str = "\
Retrieval-augmented generation combines a document index with a language \
model. Instead of answering from its training data alone, the model is \
shown passages retrieved from a local corpus and asked to ground its \
answer in them.

This sample corpus is created automatically on first start so the system \
has something to index. Drop your own .txt files into the documents \
directory and restart to index them instead.

The pipeline splits each document into overlapping character windows, \
embeds every window with an embedding model, and stores the vectors in a \
local index. At question time the most similar windows are retrieved and \
passed to the generation model together with the question.
";

fn corpus_has_documents(dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries.filter_map(|e| e.ok()).any(|e| {
        e.path()
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("txt"))
            .unwrap_or(false)
    })
}

/// Seeds a sample document when the corpus directory holds no `.txt` files,
/// so a fresh checkout starts up with something to index.
fn ensure_sample_corpus(dir: &Path) -> std::io::Result<()> {
    if corpus_has_documents(dir) {
        return Ok(());
    }
    std::fs::create_dir_all(dir)?;
    let sample = dir.join("sample.txt");
    std::fs::write(&sample, SAMPLE_DOCUMENT)?;
    tracing::info!("created sample document at {}", sample.display());
    Ok(())
}

async fn answer_question(pipeline: &RagPipeline, question: &str) -> anyhow::Result<()> {
    let streamed = match pipeline.query_stream(question).await {
        Ok(streamed) => streamed,
        Err(err) => {
            eprintln!("error: {}", err);
            return Ok(());
        }
    };

    let mut events = event_stream(streamed);
    while let Some(event) = events.recv().await {
        match event {
            StreamEvent::Context(results) => {
                if !results.is_empty() {
                    println!("\nSources:");
                    for (i, result) in results.iter().enumerate() {
                        println!("  [{}] {}", i + 1, result.source);
                    }
                }
                print!("\nAnswer: ");
                std::io::stdout().flush()?;
            }
            StreamEvent::Answer(fragment) => {
                print!("{}", fragment);
                std::io::stdout().flush()?;
            }
            StreamEvent::Error(message) => {
                eprintln!("\nerror: {}", message);
            }
            StreamEvent::Done => {
                println!();
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    docqa::logging::init(config.log_dir.as_deref());

    ensure_sample_corpus(&config.documents_dir)
        .with_context(|| format!("failed to seed {}", config.documents_dir.display()))?;

    println!("Document Q&A");
    println!("Indexing documents, this can take a moment on first start...");

    let pipeline = RagPipeline::from_config(config).await?;
    pipeline
        .initialize()
        .await
        .context("pipeline initialization failed")?;

    if let PipelineStatus::Ready { documents, chunks } = pipeline.status().await {
        println!("Ready: {} document(s), {} chunk(s) indexed.", documents, chunks);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nQuestion (exit/quit to leave): ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        answer_question(&pipeline, question).await?;
    }

    println!("Goodbye.");
    Ok(())
}
