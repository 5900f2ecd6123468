use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::hash::HashAlgo;
use crate::similarity::DistanceMetric;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub paths: PathsConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub hashing: HashingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    /// Root of the raw document tree; `pdfs/` and `txts/` live beneath it.
    pub raw_data_dir: PathBuf,
}

impl PathsConfig {
    pub fn pdf_dir(&self) -> PathBuf {
        self.raw_data_dir.join("pdfs")
    }

    pub fn txt_dir(&self) -> PathBuf {
        self.raw_data_dir.join("txts")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// On-disk location of the vector index database file.
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_distance")]
    pub distance: DistanceMetric,
}

fn default_collection() -> String {
    "rag_docs".to_string()
}
fn default_distance() -> DistanceMetric {
    DistanceMetric::Cosine
}

/// Chunk geometry is configured in estimated tokens and converted to
/// characters with `chars_per_token`; the conversion is
/// `floor(tokens * chars_per_token)` and never changes between runs with
/// the same settings.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_tokens")]
    pub chunk_tokens: usize,
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_tokens: default_chunk_tokens(),
            overlap_tokens: default_overlap_tokens(),
            chars_per_token: default_chars_per_token(),
        }
    }
}

impl ChunkingConfig {
    pub fn chunk_chars(&self) -> usize {
        (self.chunk_tokens as f64 * self.chars_per_token) as usize
    }

    pub fn overlap_chars(&self) -> usize {
        (self.overlap_tokens as f64 * self.chars_per_token) as usize
    }
}

fn default_chunk_tokens() -> usize {
    800
}
fn default_overlap_tokens() -> usize {
    140
}
fn default_chars_per_token() -> f64 {
    4.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct HashingConfig {
    #[serde(default = "default_hash_algo")]
    pub algo: HashAlgo,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            algo: default_hash_algo(),
        }
    }
}

fn default_hash_algo() -> HashAlgo {
    HashAlgo::Xxh3
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    128
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Default number of neighbors when a query does not override `k`.
    #[serde(default = "default_k")]
    pub k: usize,
    /// Default minimum similarity threshold.
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            min_similarity: default_min_similarity(),
        }
    }
}

fn default_k() -> usize {
    5
}
fn default_min_similarity() -> f64 {
    0.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_ollama_host")]
    pub host: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// L2-normalize embedding vectors; recommended under cosine distance
    /// when the provider does not normalize itself.
    #[serde(default = "default_normalize")]
    pub normalize: bool,
}

fn default_ollama_host() -> String {
    "http://127.0.0.1:11434".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_normalize() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_ollama_host")]
    pub host: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Model context window in tokens; also bounds prompt context size.
    #[serde(default = "default_context_window")]
    pub context_window_tokens: usize,
    /// Default completion length when a query does not override it.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_generation_model() -> String {
    "llama3.2".to_string()
}
fn default_temperature() -> f64 {
    0.2
}
fn default_context_window() -> usize {
    4096
}
fn default_max_tokens() -> usize {
    512
}
fn default_generation_timeout_secs() -> u64 {
    120
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.chunk_tokens == 0 {
        anyhow::bail!("chunking.chunk_tokens must be > 0");
    }
    if config.chunking.chars_per_token <= 0.0 {
        anyhow::bail!("chunking.chars_per_token must be > 0");
    }
    if config.ingest.batch_size == 0 {
        anyhow::bail!("ingest.batch_size must be >= 1");
    }
    if config.retrieval.k == 0 {
        anyhow::bail!("retrieval.k must be >= 1");
    }
    if !config.retrieval.min_similarity.is_finite() {
        anyhow::bail!("retrieval.min_similarity must be a finite number");
    }
    if config.generation.context_window_tokens == 0 {
        anyhow::bail!("generation.context_window_tokens must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [paths]
        raw_data_dir = "data/raw"

        [index]
        path = "data/index.sqlite3"

        [embedding]

        [generation]
    "#;

    #[test]
    fn minimal_config_fills_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.index.collection, "rag_docs");
        assert_eq!(config.index.distance, DistanceMetric::Cosine);
        assert_eq!(config.chunking.chunk_tokens, 800);
        assert_eq!(config.ingest.batch_size, 128);
        assert_eq!(config.retrieval.k, 5);
        assert!(config.embedding.normalize);
    }

    #[test]
    fn token_to_char_conversion_is_deterministic() {
        let chunking = ChunkingConfig {
            chunk_tokens: 800,
            overlap_tokens: 140,
            chars_per_token: 4.0,
        };
        assert_eq!(chunking.chunk_chars(), 3200);
        assert_eq!(chunking.overlap_chars(), 560);
    }

    #[test]
    fn rejects_zero_chunk_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rag.toml");
        let bad = MINIMAL.replace("[embedding]", "[chunking]\nchunk_tokens = 0\n\n[embedding]");
        std::fs::write(&path, bad).unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn rejects_unknown_distance_metric() {
        let bad = MINIMAL.replace(
            "path = \"data/index.sqlite3\"",
            "path = \"data/index.sqlite3\"\ndistance = \"dot\"",
        );
        assert!(toml::from_str::<Config>(&bad).is_err());
    }
}
