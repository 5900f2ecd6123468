//! Ingestion pipeline orchestration.
//!
//! One run is a linear pass: optional purge/rebuild of the index, then for
//! every PDF and TXT under the raw data tree — extract, chunk, hash, and
//! buffer records, flushing batches with an existence check so re-ingesting
//! unchanged input adds nothing. A bad file is logged and skipped; an
//! unreachable index aborts the run, since partial writes against it cannot
//! be reconciled.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{debug, error, info};
use walkdir::WalkDir;

use crate::chunk::{chunk_text, stable_chunk_id};
use crate::config::Config;
use crate::embedding::OllamaEmbedder;
use crate::extract;
use crate::hash::hash_text;
use crate::index::sqlite::{self, SqliteIndex};
use crate::index::VectorIndex;
use crate::models::{ChunkMetadata, DocKind, IngestStats};

/// CLI entry point: set up the index per the purge/rebuild flags, then run
/// the document pass.
pub async fn run_ingest(
    config: &Config,
    rebuild: bool,
    purge: bool,
    batch_size: usize,
) -> Result<IngestStats> {
    if purge {
        sqlite::purge_storage(&config.index.path);
        info!(path = %config.index.path.display(), "purged index storage");
    }

    let pool = sqlite::connect(&config.index.path).await?;

    // Purge already removed everything; only a plain rebuild drops the
    // collection out of an otherwise intact database.
    if rebuild && !purge {
        sqlite::drop_collection(&pool, &config.index.collection).await?;
        info!(collection = %config.index.collection, "dropped collection for rebuild");
    }

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

    ingest_documents(config, &index, batch_size).await
}

/// The document pass, separated from index setup so tests can drive it
/// against an in-memory index.
pub async fn ingest_documents(
    config: &Config,
    index: &dyn VectorIndex,
    batch_size: usize,
) -> Result<IngestStats> {
    let started = Instant::now();
    let batch_size = batch_size.max(1);
    let chunk_chars = config.chunking.chunk_chars();
    let overlap_chars = config.chunking.overlap_chars();

    let mut stats = IngestStats::default();
    let mut buffer = WriteBuffer::default();

    for (path, kind) in enumerate_sources(config)? {
        let Some(text) = read_source(&path, kind) else {
            continue;
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_stem = path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        stats.files += 1;

        for (idx, chunk) in chunk_text(&text, chunk_chars, overlap_chars)
            .into_iter()
            .enumerate()
        {
            stats.chunks += 1;

            let digest = hash_text(&chunk, config.hashing.algo);
            let id = stable_chunk_id(&file_stem, idx, &digest);

            buffer.push(
                id,
                chunk,
                ChunkMetadata {
                    file: file_name.clone(),
                    chunk_index: idx,
                    digest,
                    doc_type: kind,
                    source_path: path.to_string_lossy().into_owned(),
                    extra: Default::default(),
                },
            );

            if buffer.len() >= batch_size {
                buffer.flush(index, &mut stats).await?;
            }
        }
    }

    buffer.flush(index, &mut stats).await?;
    stats.seconds = started.elapsed().as_secs_f64();

    info!(
        files = stats.files,
        chunks = stats.chunks,
        added = stats.added,
        skipped = stats.skipped,
        secs = stats.seconds,
        "ingest finished"
    );
    Ok(stats)
}

/// Pending records awaiting a batched, deduplicated upsert.
#[derive(Default)]
struct WriteBuffer {
    ids: Vec<String>,
    documents: Vec<String>,
    metadatas: Vec<ChunkMetadata>,
}

impl WriteBuffer {
    fn len(&self) -> usize {
        self.ids.len()
    }

    fn push(&mut self, id: String, document: String, metadata: ChunkMetadata) {
        self.ids.push(id);
        self.documents.push(document);
        self.metadatas.push(metadata);
    }

    /// Upsert the subset of buffered records the index has not seen.
    ///
    /// Index failures propagate — they abort the run.
    async fn flush(&mut self, index: &dyn VectorIndex, stats: &mut IngestStats) -> Result<()> {
        if self.ids.is_empty() {
            return Ok(());
        }

        let have = index
            .existing_ids(&self.ids)
            .await
            .context("existence check against index failed")?;

        let mut new_ids = Vec::new();
        let mut new_docs = Vec::new();
        let mut new_metas = Vec::new();
        for (i, id) in self.ids.iter().enumerate() {
            if !have.contains(id) {
                new_ids.push(id.clone());
                new_docs.push(self.documents[i].clone());
                new_metas.push(self.metadatas[i].clone());
            }
        }

        if !new_ids.is_empty() {
            index
                .upsert(&new_ids, &new_docs, &new_metas)
                .await
                .context("batch upsert into index failed")?;
            stats.added += new_ids.len() as u64;
        }
        stats.skipped += have.len() as u64;
        debug!(new = new_ids.len(), skipped = have.len(), "flushed batch");

        self.ids.clear();
        self.documents.clear();
        self.metadatas.clear();
        Ok(())
    }
}

/// List source files: all PDFs, then all TXTs, each sorted by path.
/// Both directories are created when missing.
fn enumerate_sources(config: &Config) -> Result<Vec<(PathBuf, DocKind)>> {
    let pdf_dir = config.paths.pdf_dir();
    let txt_dir = config.paths.txt_dir();
    std::fs::create_dir_all(&pdf_dir)
        .with_context(|| format!("cannot create {}", pdf_dir.display()))?;
    std::fs::create_dir_all(&txt_dir)
        .with_context(|| format!("cannot create {}", txt_dir.display()))?;

    let mut sources = Vec::new();
    sources.extend(files_with_extension(&pdf_dir, "pdf").into_iter().map(|p| (p, DocKind::Pdf)));
    sources.extend(files_with_extension(&txt_dir, "txt").into_iter().map(|p| (p, DocKind::Txt)));
    Ok(sources)
}

fn files_with_extension(dir: &Path, ext: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|s| s.to_str())
                .is_some_and(|s| s.eq_ignore_ascii_case(ext))
        })
        .collect();
    files.sort();
    files
}

/// Read one source document, returning `None` when it should be skipped.
///
/// A file that vanished between listing and reading is a quiet skip; an
/// extraction or read failure is logged and skipped; a PDF with no
/// extractable text is skipped. No per-file outcome aborts the run.
fn read_source(path: &Path, kind: DocKind) -> Option<String> {
    let text = match kind {
        DocKind::Pdf => match std::fs::read(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "file vanished, skipping");
                return None;
            }
            Err(e) => {
                error!(path = %path.display(), "failed to read PDF (skipping): {}", e);
                return None;
            }
            Ok(bytes) => match extract::extract_pdf_text(&bytes) {
                Ok(Some(text)) => text,
                Ok(None) => {
                    debug!(path = %path.display(), "PDF has no extractable text, skipping");
                    return None;
                }
                Err(e) => {
                    error!(path = %path.display(), "failed to process PDF (skipping): {}", e);
                    return None;
                }
            },
        },
        DocKind::Txt => match extract::read_txt_file(path) {
            Ok(text) => text,
            Err(e) => {
                if path.exists() {
                    error!(path = %path.display(), "failed to read TXT (skipping): {}", e);
                } else {
                    debug!(path = %path.display(), "file vanished, skipping");
                }
                return None;
            }
        },
    };

    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}
