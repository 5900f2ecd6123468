//! # RAG Pipeline
//!
//! A content-addressed document ingestion and retrieval pipeline for
//! grounded LLM answers.
//!
//! Documents (PDF and plain text) are chunked with overlap, content-hashed
//! into stable chunk IDs, embedded, and stored in a local vector index.
//! Queries embed the question, rank the nearest chunks by normalized
//! similarity, and feed the survivors as context to a completion model —
//! buffered or streamed.
//!
//! ## Pipeline
//!
//! ```text
//! ┌───────────┐   ┌──────────────────┐   ┌──────────────┐
//! │ PDFs/TXTs │──▶│ Chunk+Hash+Embed │──▶│ Vector index │
//! └───────────┘   └──────────────────┘   └──────┬───────┘
//!                                               │
//!                    ┌──────────────────────────┤
//!                    ▼                          ▼
//!              ┌───────────┐            ┌──────────────┐
//!              │ Retrieval │───context─▶│  Generation  │
//!              └───────────┘            └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rag ingest                          # index everything under data/raw
//! rag query "how does billing work?"  # grounded answer
//! rag query "..." --stream            # stream fragments as they arrive
//! rag stats                           # record count and index size
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Chunk metadata and ingest counters |
//! | [`chunk`] | Overlapping text chunking and stable chunk IDs |
//! | [`hash`] | Content digests (XXH3-128, MD5) |
//! | [`extract`] | PDF and TXT text extraction |
//! | [`embedding`] | Embedding client abstraction |
//! | [`index`] | Vector index trait, SQLite and in-memory backends |
//! | [`ingest`] | Batched, deduplicated ingestion runs |
//! | [`similarity`] | Distance-to-similarity normalization |
//! | [`retrieve`] | Ranked, threshold-filtered retrieval |
//! | [`prompt`] | Grounded prompt construction |
//! | [`generate`] | Completion client, buffered and streaming |
//! | [`answer`] | Retrieve-then-generate orchestration |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generate;
pub mod hash;
pub mod index;
pub mod ingest;
pub mod models;
pub mod prompt;
pub mod retrieve;
pub mod retry;
pub mod similarity;
