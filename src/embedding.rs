//! Embedding collaborator.
//!
//! The vector index embeds documents and queries through the [`Embedder`]
//! trait; the production implementation calls Ollama's embeddings endpoint
//! with retry/backoff. Vectors are optionally L2-normalized, which is the
//! right call under cosine distance when the provider does not normalize
//! itself.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::UpstreamError;
use crate::retry::{with_retry, BASE_DELAY, MAX_ATTEMPTS};

/// Black-box text-embedding function: text in, fixed-length vector out.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamError>;
}

/// Embedding client for an Ollama server.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    host: String,
    model: String,
    normalize: bool,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(UpstreamError::from_transport)?;
        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            normalize: config.normalize,
        })
    }

    async fn request_embedding(&self, text: &str) -> Result<Vec<f32>, UpstreamError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": text,
        });

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.host))
            .json(&body)
            .send()
            .await
            .map_err(UpstreamError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(UpstreamError::from_status(status.as_u16(), message));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;
        if parsed.embedding.is_empty() {
            return Err(UpstreamError::InvalidResponse(
                "empty embedding vector".to_string(),
            ));
        }
        Ok(parsed.embedding)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamError> {
        if text.trim().is_empty() {
            return Err(UpstreamError::InvalidResponse(
                "cannot embed empty text".to_string(),
            ));
        }

        let vector = with_retry(MAX_ATTEMPTS, BASE_DELAY, |_| self.request_embedding(text)).await?;

        if self.normalize {
            Ok(l2_normalize(vector))
        } else {
            Ok(vector)
        }
    }
}

/// Scale a vector to unit length; zero vectors pass through unchanged.
pub fn l2_normalize(vec: Vec<f32>) -> Vec<f32> {
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vec.into_iter().map(|x| x / norm).collect()
    } else {
        vec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_vector_has_unit_length() {
        let v = l2_normalize(vec![3.0, 4.0]);
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_is_left_alone() {
        assert_eq!(l2_normalize(vec![0.0, 0.0, 0.0]), vec![0.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn empty_text_is_rejected_without_a_request() {
        let embedder = OllamaEmbedder::new(&crate::config::EmbeddingConfig {
            host: "http://127.0.0.1:1".to_string(),
            model: "m".to_string(),
            timeout_secs: 1,
            normalize: true,
        })
        .unwrap();
        let err = embedder.embed("   ").await.unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidResponse(_)));
    }
}
