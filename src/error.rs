//! Error taxonomy for the model collaborators (embedding, completion).
//!
//! Connectivity failures, timeouts, and transient upstream responses are
//! retryable; client-side API errors and malformed responses are not and
//! must surface immediately without consuming retry budget.

use thiserror::Error;

use crate::retry::Retryable;

#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Could not reach the service at all.
    #[error("connection error: {0}")]
    Connect(String),

    /// The per-attempt timeout elapsed.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The service answered with a transient failure (429 or 5xx).
    #[error("upstream error {status}: {message}")]
    Busy { status: u16, message: String },

    /// The service rejected the request (non-retryable 4xx).
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// The service answered 200 with a body we could not interpret.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl UpstreamError {
    /// Classify a transport-level reqwest failure.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout(err.to_string())
        } else {
            UpstreamError::Connect(err.to_string())
        }
    }

    /// Classify a non-success HTTP status plus its body.
    pub fn from_status(status: u16, message: String) -> Self {
        if status == 429 || status >= 500 {
            UpstreamError::Busy { status, message }
        } else {
            UpstreamError::Api { status, message }
        }
    }
}

impl Retryable for UpstreamError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            UpstreamError::Connect(_) | UpstreamError::Timeout(_) | UpstreamError::Busy { .. }
        )
    }
}
