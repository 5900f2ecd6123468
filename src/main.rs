//! # RAG Pipeline CLI (`rag`)
//!
//! The `rag` binary drives the ingestion and retrieval pipeline from the
//! command line.
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag ingest` | Chunk, hash, embed, and index all raw documents |
//! | `rag query "<text>"` | Retrieve matching chunks and generate a grounded answer |
//! | `rag stats` | Show indexed record count and index file size |
//!
//! ## Examples
//!
//! ```bash
//! # Incremental ingest (unchanged chunks are skipped)
//! rag ingest --config ./config/rag.toml
//!
//! # Rebuild the collection from scratch
//! rag ingest --rebuild
//!
//! # Delete the index file entirely, then reingest
//! rag ingest --purge
//!
//! # Grounded answer with a tighter candidate set
//! rag query "how are refunds handled?" --k 3 --min-similarity 0.6
//!
//! # Stream the answer as it is generated
//! rag query "summarize the onboarding flow" --stream
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

use rag_pipeline::answer::{AppContext, QueryRequest};
use rag_pipeline::config::{self, Config};
use rag_pipeline::embedding::OllamaEmbedder;
use rag_pipeline::generate::OllamaGenerator;
use rag_pipeline::index::sqlite::{self, SqliteIndex};
use rag_pipeline::index::VectorIndex;
use rag_pipeline::ingest;

/// RAG Pipeline CLI — content-addressed document ingestion and grounded
/// retrieval over a local vector index.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rag",
    about = "RAG pipeline — ingest documents, retrieve grounded context, generate answers",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/rag.toml`. Index, chunking, embedding, and
    /// generation settings are read from this file.
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Ingest all raw documents into the vector index.
    ///
    /// Scans `<raw>/pdfs` and `<raw>/txts`, chunks and hashes each document,
    /// and upserts only chunks the index has not seen. Re-running over
    /// unchanged input adds nothing.
    Ingest {
        /// Drop the collection's records before ingesting.
        #[arg(long)]
        rebuild: bool,

        /// Delete the index file on disk before ingesting.
        #[arg(long)]
        purge: bool,

        /// Override the configured write batch size.
        #[arg(long)]
        batch: Option<usize>,
    },

    /// Retrieve matching chunks and generate a grounded answer.
    Query {
        /// The question to answer.
        text: String,

        /// Number of chunks to retrieve (clamped to 1..=50).
        #[arg(long)]
        k: Option<usize>,

        /// Minimum similarity a chunk must reach to ground the answer.
        #[arg(long)]
        min_similarity: Option<f64>,

        /// Cap on generated tokens for this query.
        #[arg(long)]
        max_tokens: Option<usize>,

        /// Stream the answer to stdout as it is generated.
        #[arg(long)]
        stream: bool,
    },

    /// Show indexed record count and index file size.
    Stats,
}

/// Build the long-lived query context: index handle plus completion client.
async fn build_context(config: Config) -> Result<AppContext> {
    let pool = sqlite::connect(&config.index.path).await?;
    let embedder = Arc::new(
        OllamaEmbedder::new(&config.embedding)
            .map_err(|e| anyhow::anyhow!("embedding client init failed: {}", e))?,
    );
    let index = SqliteIndex::open_or_create(
        pool,
        &config.index.collection,
        config.index.distance,
        embedder,
    )
    .await?;
    let completions = OllamaGenerator::new(&config.generation)
        .map_err(|e| anyhow::anyhow!("completion client init failed: {}", e))?;

    Ok(AppContext {
        config,
        index: Arc::new(index),
        completions: Arc::new(completions),
    })
}

async fn run_query(config: Config, request: QueryRequest, stream: bool) -> Result<()> {
    let ctx = build_context(config).await?;

    if stream {
        let outcome = ctx.answer_stream(&request).await?;
        let mut fragments = outcome.fragments;
        let mut stdout = std::io::stdout().lock();
        while let Some(fragment) = fragments.next().await {
            let fragment = fragment.context("generation stream failed")?;
            stdout.write_all(fragment.as_bytes())?;
            stdout.flush()?;
        }
        writeln!(stdout)?;
        print_retrieval_summary(
            outcome.stats.retrieved_count,
            outcome.stats.filtered_count,
            outcome.stats.top_similarity,
            outcome.metric,
        );
    } else {
        let outcome = ctx.answer(&request).await?;
        println!("{}", outcome.response);
        print_retrieval_summary(
            outcome.stats.retrieved_count,
            outcome.stats.filtered_count,
            outcome.stats.top_similarity,
            outcome.metric,
        );
        for (i, (meta, sim)) in outcome
            .metadatas
            .iter()
            .zip(outcome.similarities.iter())
            .enumerate()
        {
            println!(
                "  [{}] {} #{} similarity={:.4}",
                i + 1,
                meta.file,
                meta.chunk_index,
                sim
            );
        }
    }
    Ok(())
}

fn print_retrieval_summary(
    retrieved: usize,
    kept: usize,
    top_similarity: Option<f64>,
    metric: &str,
) {
    match top_similarity {
        Some(top) => println!(
            "\nretrieval: {} candidates, {} kept, top similarity {:.4} ({})",
            retrieved, kept, top, metric
        ),
        None => println!(
            "\nretrieval: {} candidates, 0 kept ({})",
            retrieved, metric
        ),
    }
}

async fn run_stats(config: Config) -> Result<()> {
    let pool = sqlite::connect(&config.index.path).await?;
    let embedder = Arc::new(
        OllamaEmbedder::new(&config.embedding)
            .map_err(|e| anyhow::anyhow!("embedding client init failed: {}", e))?,
    );
    let index = SqliteIndex::open_or_create(
        pool,
        &config.index.collection,
        config.index.distance,
        embedder,
    )
    .await?;

    let count = index.count().await?;
    let size = std::fs::metadata(&config.index.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("collection: {}", config.index.collection);
    println!("distance:   {}", config.index.distance.label());
    println!("records:    {}", count);
    println!("index size: {} bytes ({})", size, config.index.path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest {
            rebuild,
            purge,
            batch,
        } => {
            let batch_size = batch.unwrap_or(cfg.ingest.batch_size);
            let stats = ingest::run_ingest(&cfg, rebuild, purge, batch_size).await?;
            println!(
                "ingest_done files={} chunks={} added={} skipped={} secs={:.2}",
                stats.files, stats.chunks, stats.added, stats.skipped, stats.seconds
            );
        }
        Commands::Query {
            text,
            k,
            min_similarity,
            max_tokens,
            stream,
        } => {
            let request = QueryRequest {
                text,
                k,
                min_similarity,
                max_tokens,
            };
            run_query(cfg, request, stream).await?;
        }
        Commands::Stats => {
            run_stats(cfg).await?;
        }
    }

    Ok(())
}
