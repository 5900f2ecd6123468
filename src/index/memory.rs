//! In-memory [`VectorIndex`] implementation for testing.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`; queries are
//! brute-force distance scans. Insertion order is preserved, which makes
//! tie-breaking deterministic in tests.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::Embedder;
use crate::models::ChunkMetadata;
use crate::similarity::DistanceMetric;

use super::{distance, IndexQueryResult, VectorIndex};

struct StoredRecord {
    id: String,
    document: String,
    vector: Vec<f32>,
    metadata: ChunkMetadata,
}

/// In-memory vector index for tests.
pub struct MemoryIndex {
    metric: DistanceMetric,
    embedder: Arc<dyn Embedder>,
    records: RwLock<Vec<StoredRecord>>,
}

impl MemoryIndex {
    pub fn new(metric: DistanceMetric, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            metric,
            embedder,
            records: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    async fn existing_ids(&self, ids: &[String]) -> Result<HashSet<String>> {
        let records = self.records.read().unwrap();
        let stored: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
        Ok(ids
            .iter()
            .filter(|id| stored.contains(id.as_str()))
            .cloned()
            .collect())
    }

    async fn upsert(
        &self,
        ids: &[String],
        documents: &[String],
        metadatas: &[ChunkMetadata],
    ) -> Result<()> {
        anyhow::ensure!(
            ids.len() == documents.len() && ids.len() == metadatas.len(),
            "upsert arrays must be parallel"
        );

        let mut vectors = Vec::with_capacity(documents.len());
        for doc in documents {
            vectors.push(self.embedder.embed(doc).await?);
        }

        let mut records = self.records.write().unwrap();
        for ((id, doc), (vector, meta)) in ids
            .iter()
            .zip(documents.iter())
            .zip(vectors.into_iter().zip(metadatas.iter()))
        {
            let record = StoredRecord {
                id: id.clone(),
                document: doc.clone(),
                vector,
                metadata: meta.clone(),
            };
            match records.iter_mut().find(|r| &r.id == id) {
                Some(existing) => *existing = record,
                None => records.push(record),
            }
        }
        Ok(())
    }

    async fn query(&self, text: &str, k: usize) -> Result<IndexQueryResult> {
        {
            let records = self.records.read().unwrap();
            if records.is_empty() {
                return Ok(IndexQueryResult::default());
            }
        }

        let query_vec = self.embedder.embed(text).await?;

        let records = self.records.read().unwrap();
        let mut scored: Vec<(f64, usize)> = records
            .iter()
            .enumerate()
            .map(|(i, r)| (distance(&query_vec, &r.vector, self.metric), i))
            .collect();
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        let mut result = IndexQueryResult::default();
        for (dist, i) in scored {
            result.documents.push(records[i].document.clone());
            result.distances.push(dist);
            result.metadatas.push(records[i].metadata.clone());
        }
        Ok(result)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.records.read().unwrap().len() as u64)
    }
}
