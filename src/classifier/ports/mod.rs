//! Port contract for the text-generation classifier.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for classifier calls.
pub type ClassifierResult<T> = Result<T, ClassifierError>;

/// Text-generation endpoint that answers a prompt with free text.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Sends `prompt` and returns the generated text.
    async fn classify(&self, prompt: &str) -> ClassifierResult<String>;
}

/// Errors returned by classifier adapters.
#[derive(Debug, Clone, Error)]
pub enum ClassifierError {
    /// The request did not complete within its timeout.
    #[error("classifier request timed out after {0:?}")]
    Timeout(Duration),

    /// The endpoint answered with a non-success status.
    #[error("classifier returned HTTP {status}: {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body excerpt.
        message: String,
    },

    /// The response did not contain generated text.
    #[error("malformed classifier response: {0}")]
    MalformedResponse(String),

    /// Network-level failure.
    #[error("classifier transport error: {0}")]
    Transport(Arc<dyn std::error::Error + Send + Sync>),
}

impl ClassifierError {
    /// Wraps a transport error.
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Arc::new(err))
    }

    /// Returns `true` when retrying the same prompt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport(_) => true,
            Self::Rejected { status, .. } => *status == 429 || *status >= 500,
            Self::MalformedResponse(_) => false,
        }
    }
}
