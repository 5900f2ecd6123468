//! Grounded question answering: retrieve first, then generate.
//!
//! [`AppContext`] holds the long-lived handles — config, index, completion
//! client — built once at startup and shared by reference-counted clones.
//! [`answer`] and [`answer_stream`] run the two phases strictly in order:
//! retrieval completes before any generation call is made, so a query that
//! matches nothing never costs a model invocation.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::generate::{CompletionClient, FragmentStream, Generator};
use crate::index::VectorIndex;
use crate::models::ChunkMetadata;
use crate::retrieve::{RetrievalResult, Retriever};

/// Fallback response when retrieval yields nothing above the threshold.
pub const NO_DOCUMENTS_RESPONSE: &str = "No relevant documents found.";

/// Long-lived handles shared across queries.
pub struct AppContext {
    pub config: Config,
    pub index: Arc<dyn VectorIndex>,
    pub completions: Arc<dyn CompletionClient>,
}

/// One grounded-answer request.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub text: String,
    pub k: Option<usize>,
    pub min_similarity: Option<f64>,
    pub max_tokens: Option<usize>,
}

/// Retrieval accounting reported alongside every answer.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalStats {
    /// Candidates the index returned before threshold filtering.
    pub retrieved_count: usize,
    /// Documents that passed the threshold and grounded the answer.
    pub filtered_count: usize,
    /// Best similarity among the kept documents, `None` when none passed.
    pub top_similarity: Option<f64>,
}

/// A complete buffered answer with its grounding.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub response: String,
    pub documents: Vec<String>,
    pub similarities: Vec<f64>,
    pub metadatas: Vec<ChunkMetadata>,
    pub metric: &'static str,
    pub stats: RetrievalStats,
}

/// A streaming answer: the grounding is known up front, the response text
/// arrives as fragments.
pub struct StreamingOutcome {
    pub fragments: FragmentStream,
    pub documents: Vec<String>,
    pub similarities: Vec<f64>,
    pub metadatas: Vec<ChunkMetadata>,
    pub metric: &'static str,
    pub stats: RetrievalStats,
}

impl AppContext {
    async fn retrieve(&self, request: &QueryRequest) -> Result<(RetrievalResult, RetrievalStats)> {
        let retriever = Retriever::new(&self.config.retrieval, self.index.as_ref());
        let retrieval = retriever
            .query(&request.text, request.k, request.min_similarity)
            .await?;

        let stats = RetrievalStats {
            // Filtering only ever shrinks the set, so raw_distances carries
            // the post-filter count too; the pre-filter count is what the
            // index handed back before thresholding.
            retrieved_count: retrieval.candidate_count,
            filtered_count: retrieval.documents.len(),
            top_similarity: retrieval.similarities.first().copied(),
        };
        Ok((retrieval, stats))
    }

    fn generator(&self) -> Generator {
        Generator::new(self.config.generation.clone(), Arc::clone(&self.completions))
    }

    /// Answer a query with a fully buffered response.
    pub async fn answer(&self, request: &QueryRequest) -> Result<QueryOutcome> {
        let (retrieval, stats) = self.retrieve(request).await?;

        if retrieval.is_empty() {
            return Ok(QueryOutcome {
                response: NO_DOCUMENTS_RESPONSE.to_string(),
                documents: Vec::new(),
                similarities: Vec::new(),
                metadatas: Vec::new(),
                metric: retrieval.metric,
                stats,
            });
        }

        let context = retrieval.documents.join("\n\n");
        let response = self
            .generator()
            .generate(&request.text, &context, request.max_tokens)
            .await?;

        Ok(QueryOutcome {
            response,
            documents: retrieval.documents,
            similarities: retrieval.similarities,
            metadatas: retrieval.metadatas,
            metric: retrieval.metric,
            stats,
        })
    }

    /// Answer a query with a lazy fragment stream.
    ///
    /// The no-hits case yields the fallback text as a single fragment so
    /// callers can treat both outcomes uniformly.
    pub async fn answer_stream(&self, request: &QueryRequest) -> Result<StreamingOutcome> {
        let (retrieval, stats) = self.retrieve(request).await?;

        if retrieval.is_empty() {
            let fragments: FragmentStream = Box::pin(futures::stream::once(async {
                Ok(NO_DOCUMENTS_RESPONSE.to_string())
            }));
            return Ok(StreamingOutcome {
                fragments,
                documents: Vec::new(),
                similarities: Vec::new(),
                metadatas: Vec::new(),
                metric: retrieval.metric,
                stats,
            });
        }

        let context = retrieval.documents.join("\n\n");
        let fragments = self
            .generator()
            .generate_stream(&request.text, &context, request.max_tokens)
            .await?;

        Ok(StreamingOutcome {
            fragments,
            documents: retrieval.documents,
            similarities: retrieval.similarities,
            metadatas: retrieval.metadatas,
            metric: retrieval.metric,
            stats,
        })
    }
}
