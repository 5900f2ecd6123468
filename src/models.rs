//! Core data types shared across the pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Source document kind, recorded in chunk metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocKind {
    Pdf,
    Txt,
}

/// Per-chunk metadata persisted alongside each indexed record.
///
/// Known fields are typed; `extra` is a flattened extension map so records
/// written with additional fields still round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Source filename (with extension), e.g. `handbook.pdf`.
    pub file: String,
    /// Zero-based position of the chunk within its document.
    pub chunk_index: usize,
    /// Content digest of the chunk text (32-char hex).
    pub digest: String,
    #[serde(rename = "type")]
    pub doc_type: DocKind,
    /// Path the document was read from at ingest time.
    pub source_path: String,
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Counters accumulated over one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestStats {
    /// Documents successfully read and chunked.
    pub files: u64,
    /// Chunks produced, counted before deduplication.
    pub chunks: u64,
    /// Records written to the index this run.
    pub added: u64,
    /// Records skipped because their ID already existed.
    pub skipped: u64,
    /// Wall-clock duration of the run.
    pub seconds: f64,
}
