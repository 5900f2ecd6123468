//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the seam between the pipeline and the
//! nearest-neighbor store: ingestion upserts records through it, retrieval
//! queries it for the `k` closest chunks. Implementations embed text
//! internally via an [`Embedder`](crate::embedding::Embedder) handle, and
//! report raw distances under the collection's configured metric.

pub mod memory;
pub mod sqlite;

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::ChunkMetadata;
use crate::similarity::DistanceMetric;

/// Per-query arrays returned by [`VectorIndex::query`].
///
/// The three arrays are parallel: `documents[i]` scored `distances[i]` with
/// `metadatas[i]`. Rows come back ordered by ascending distance.
#[derive(Debug, Clone, Default)]
pub struct IndexQueryResult {
    pub documents: Vec<String>,
    pub distances: Vec<f64>,
    pub metadatas: Vec<ChunkMetadata>,
}

/// Black-box nearest-neighbor store keyed by chunk ID.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// The distance metric this collection is bound to.
    fn metric(&self) -> DistanceMetric;

    /// Which of `ids` already exist in the collection.
    async fn existing_ids(&self, ids: &[String]) -> Result<HashSet<String>>;

    /// Embed and persist records; an existing ID is overwritten in place.
    ///
    /// The three slices must be parallel and equal in length.
    async fn upsert(
        &self,
        ids: &[String],
        documents: &[String],
        metadatas: &[ChunkMetadata],
    ) -> Result<()>;

    /// Nearest neighbors of `text`, at most `k` rows, ascending distance.
    async fn query(&self, text: &str, k: usize) -> Result<IndexQueryResult>;

    /// Number of records in the collection.
    async fn count(&self) -> Result<u64>;
}

/// Raw distance between a query vector and a stored vector under `metric`.
///
/// Inner product follows the negated-dot-product convention, so smaller is
/// closer for every metric.
pub fn distance(query: &[f32], stored: &[f32], metric: DistanceMetric) -> f64 {
    match metric {
        DistanceMetric::Cosine => 1.0 - f64::from(cosine_similarity(query, stored)),
        DistanceMetric::L2 => {
            let sq: f32 = query
                .iter()
                .zip(stored.iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
            f64::from(sq.sqrt())
        }
        DistanceMetric::Ip => -f64::from(dot(query, stored)),
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity in `[-1, 1]`; 0.0 for empty or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

/// Encode a float vector as little-endian `f32` bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn cosine_mismatched_lengths_score_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn cosine_distance_is_zero_for_identical() {
        let v = vec![0.6, 0.8];
        assert!(distance(&v, &v, DistanceMetric::Cosine).abs() < 1e-6);
    }

    #[test]
    fn l2_distance_matches_euclidean() {
        let d = distance(&[0.0, 0.0], &[3.0, 4.0], DistanceMetric::L2);
        assert!((d - 5.0).abs() < 1e-6);
    }

    #[test]
    fn ip_distance_is_the_negated_dot_product() {
        let d = distance(&[1.0, 2.0], &[3.0, 4.0], DistanceMetric::Ip);
        assert!((d + 11.0).abs() < 1e-6);
    }
}
