//! # docqa CLI
//!
//! Command-line interface for the document question-answering engine.
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa ingest <path>` | Extract, chunk, and index a file or directory |
//! | `docqa ask "<question>"` | Answer one question and exit |
//! | `docqa chat` | Interactive chat session |
//! | `docqa status` | Show indexed sources and settings |
//! | `docqa clear` | Delete the index and forget all documents |
//!
//! ## Examples
//!
//! ```bash
//! # Index a directory of reports
//! docqa ingest ./reports
//!
//! # One-shot question with a bigger model
//! docqa ask "list all open action items" --model qwen2.5:14b
//!
//! # Interactive session; /model, /retrieval, /clear, /quit inside
//! docqa chat
//! ```

use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use docqa::config::{self, RetrievalConfig};
use docqa::embedding::{Embedder, OllamaEmbedder};
use docqa::engine::Engine;
use docqa::ingest;
use docqa::llm::{ChatModel, OllamaClient, VisionModel};
use docqa::models::QueryResponse;
use docqa::retrieval::RetrievalMode;

/// docqa — ask questions about your documents with a local model.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Missing file means built-in defaults (Ollama on localhost).
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "Multi-format document question-answering with local retrieval-augmented chat",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Ingest a file or directory.
    ///
    /// Extracts text per format (PDF, DOCX, XLSX, CSV, JSON, XML, YAML,
    /// TXT/MD, RTF; images go through the vision model), chunks it, and
    /// rebuilds the vector index. Unreadable files become placeholder
    /// entries instead of aborting the run.
    Ingest {
        /// File or directory to ingest.
        path: PathBuf,
    },

    /// Answer a single question against the indexed documents.
    ///
    /// Casual input and questions asked before any ingest are answered
    /// directly by the chat model without retrieval.
    Ask {
        /// The question.
        question: String,

        /// Use this model instead of the configured one.
        #[arg(long)]
        model: Option<String>,
    },

    /// Interactive chat session.
    ///
    /// In-session commands: `/model <name>`, `/retrieval <mode> [k]`,
    /// `/clear`, `/quit`.
    Chat,

    /// Show indexed sources, chunk counts, and active settings.
    Status,

    /// Delete the index and forget all ingested documents.
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = config::load_or_default(&cli.config)?;

    let client = Arc::new(OllamaClient::new(&config.models.url)?);
    let embedder: Arc<dyn Embedder> =
        Arc::new(OllamaEmbedder::new(&config.embedding, &config.models.url)?);
    let chat: Arc<dyn ChatModel> = client.clone();
    let vision: Arc<dyn VisionModel> = client;

    let mut engine = Engine::new(config, chat, vision, embedder)?;

    match cli.command {
        Commands::Ingest { path } => cmd_ingest(&mut engine, &path).await,
        Commands::Ask { question, model } => {
            if let Some(model) = model {
                engine.switch_model(&model);
            }
            let response = engine.ask(&question).await;
            print_response(&response);
            Ok(())
        }
        Commands::Chat => cmd_chat(&mut engine).await,
        Commands::Status => {
            cmd_status(&engine);
            Ok(())
        }
        Commands::Clear => {
            engine.clear();
            println!("Cleared index and document ledger.");
            Ok(())
        }
    }
}

async fn cmd_ingest(engine: &mut Engine, path: &PathBuf) -> anyhow::Result<()> {
    let files = ingest::collect_files(path)?;
    if files.is_empty() {
        println!("Nothing to ingest under {}", path.display());
        return Ok(());
    }

    let mut total = 0usize;
    for file in &files {
        let bytes = tokio::fs::read(file).await?;
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());
        let added = engine.ingest_file(&bytes, &name).await?;
        println!("  {} → {} chunks", name, added);
        total += added;
    }
    println!(
        "Ingested {} file(s), {} chunks total. Index holds {} chunks.",
        files.len(),
        total,
        engine.index_len()
    );
    Ok(())
}

fn cmd_status(engine: &Engine) {
    println!("Model:          {}", engine.model());
    let retrieval = engine.retrieval_config();
    println!(
        "Retrieval:      {} (k={}, lambda={}, threshold={})",
        retrieval.mode,
        retrieval.effective_k(),
        retrieval.lambda,
        retrieval.score_threshold
    );
    println!("Indexed chunks: {}", engine.index_len());

    let sources = engine.indexed_sources();
    if sources.is_empty() {
        println!("No documents indexed.");
    } else {
        println!("Sources:");
        for source in sources {
            println!("  - {}", source);
        }
    }
}

fn print_response(response: &QueryResponse) {
    println!("{}", response.answer);
    if !response.sources.is_empty() {
        println!();
        println!("Sources:");
        for (i, chunk) in response.sources.iter().enumerate() {
            let preview: String = chunk.text.chars().take(100).collect();
            println!(
                "  [{}] {}: {}...",
                i + 1,
                chunk.metadata.source,
                preview.replace('\n', " ")
            );
        }
    }
}

async fn cmd_chat(engine: &mut Engine) -> anyhow::Result<()> {
    println!("docqa chat — {} ({} indexed chunks)", engine.model(), engine.index_len());
    println!("Commands: /model <name>, /retrieval <mode> [k], /clear, /quit");

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix('/') {
            let mut parts = rest.split_whitespace();
            match parts.next() {
                Some("quit") | Some("exit") => break,
                Some("clear") => {
                    engine.clear();
                    println!("Cleared index and conversation.");
                }
                Some("model") => match parts.next() {
                    Some(model) => {
                        engine.switch_model(model);
                        println!("Switched to {}", model);
                    }
                    None => println!("Usage: /model <name>"),
                },
                Some("retrieval") => {
                    let mode = parts.next().map(|m| m.parse::<RetrievalMode>());
                    let k = parts.next().map(|k| k.parse::<usize>());
                    match (mode, k) {
                        (Some(Ok(mode)), k) => {
                            let mut retrieval: RetrievalConfig = engine.retrieval_config().clone();
                            retrieval.mode = mode;
                            if let Some(Ok(k)) = k {
                                retrieval.k = k;
                            }
                            match engine.configure_retrieval(retrieval) {
                                Ok(()) => println!(
                                    "Retrieval: {} (k={})",
                                    mode,
                                    engine.retrieval_config().effective_k()
                                ),
                                Err(e) => println!("Invalid retrieval settings: {}", e),
                            }
                        }
                        (Some(Err(e)), _) => println!("{}", e),
                        (None, _) => println!("Usage: /retrieval <similarity|mmr|threshold> [k]"),
                    }
                }
                _ => println!("Unknown command: /{}", rest),
            }
            continue;
        }

        let response = engine.ask(line).await;
        print_response(&response);
        println!();
    }

    Ok(())
}
