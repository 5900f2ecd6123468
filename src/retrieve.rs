//! Query-time retrieval: nearest neighbors, normalized, ranked, filtered.
//!
//! The retriever asks the vector index for the top-`k` neighbors of a
//! query, converts raw distances to similarities, ranks descending, and
//! drops everything under the similarity threshold. The threshold is
//! applied after ranking, over the already-capped candidate set — it can
//! only shrink the result, never widen it past `k`.

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::index::VectorIndex;
use crate::models::ChunkMetadata;
use crate::similarity::{distances_to_similarities, DistanceMetric};

const MIN_K: usize = 1;
const MAX_K: usize = 50;

/// Ranked, filtered retrieval output. The four arrays are parallel and
/// share the filtered, descending-similarity order.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub documents: Vec<String>,
    pub similarities: Vec<f64>,
    pub metadatas: Vec<ChunkMetadata>,
    pub raw_distances: Vec<f64>,
    pub metric: &'static str,
    /// How many candidates the index returned, before threshold filtering.
    pub candidate_count: usize,
}

impl RetrievalResult {
    fn empty(metric: DistanceMetric) -> Self {
        Self {
            documents: Vec::new(),
            similarities: Vec::new(),
            metadatas: Vec::new(),
            raw_distances: Vec::new(),
            metric: metric.label(),
            candidate_count: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Apply the config default and clamp `k` into `[1, 50]`.
pub fn effective_k(config: &RetrievalConfig, k: Option<usize>) -> usize {
    k.unwrap_or(config.k).clamp(MIN_K, MAX_K)
}

/// Apply the config default and clamp the similarity threshold.
///
/// Cosine similarities live in `[0, 1]`, so the threshold is clamped to
/// that range; l2/ip thresholds are only floored at zero since their
/// similarity scales have no meaningful upper bound to clamp against.
pub fn effective_min_similarity(
    config: &RetrievalConfig,
    min_similarity: Option<f64>,
    metric: DistanceMetric,
) -> f64 {
    let value = min_similarity.unwrap_or(config.min_similarity);
    match metric {
        DistanceMetric::Cosine => value.clamp(0.0, 1.0),
        DistanceMetric::L2 | DistanceMetric::Ip => value.max(0.0),
    }
}

pub struct Retriever<'a> {
    config: &'a RetrievalConfig,
    index: &'a dyn VectorIndex,
}

impl<'a> Retriever<'a> {
    pub fn new(config: &'a RetrievalConfig, index: &'a dyn VectorIndex) -> Self {
        Self { config, index }
    }

    /// Retrieve the best-matching chunks for `text`.
    ///
    /// A query against an empty collection returns an empty result carrying
    /// the metric label; it is a normal outcome, not an error.
    pub async fn query(
        &self,
        text: &str,
        k: Option<usize>,
        min_similarity: Option<f64>,
    ) -> Result<RetrievalResult> {
        let metric = self.index.metric();
        let k = effective_k(self.config, k);
        let threshold = effective_min_similarity(self.config, min_similarity, metric);

        let raw = self.index.query(text, k).await?;
        if raw.documents.is_empty() {
            debug!(k, threshold, metric = metric.label(), "retrieval: no hits");
            return Ok(RetrievalResult::empty(metric));
        }

        let mut documents = raw.documents;
        let mut distances = raw.distances;
        let mut metadatas = raw.metadatas;

        // Collaborator contract violation: truncate, never panic.
        let n = documents.len().min(distances.len()).min(metadatas.len());
        if documents.len() != n || distances.len() != n || metadatas.len() != n {
            warn!(
                docs = documents.len(),
                dists = distances.len(),
                metas = metadatas.len(),
                "retrieval: parallel array length mismatch, truncating to {}",
                n
            );
            documents.truncate(n);
            distances.truncate(n);
            metadatas.truncate(n);
        }

        let similarities = distances_to_similarities(&distances, metric);

        let mut order: Vec<usize> = (0..n).collect();
        // Stable sort: equal similarities keep the index's return order.
        order.sort_by(|&a, &b| {
            similarities[b]
                .partial_cmp(&similarities[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut result = RetrievalResult::empty(metric);
        result.candidate_count = n;
        for i in order {
            if similarities[i] >= threshold {
                result.documents.push(documents[i].clone());
                result.similarities.push(similarities[i]);
                result.metadatas.push(metadatas[i].clone());
                result.raw_distances.push(distances[i]);
            }
        }

        debug!(
            kept = result.documents.len(),
            candidates = n,
            k,
            threshold,
            metric = metric.label(),
            "retrieval complete"
        );
        Ok(result)
    }
}
