//! Errors raised by completion services.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while requesting a completion.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The request never produced an HTTP response.
    #[error("Completion request failed: {message}")]
    Transport { message: String, is_retryable: bool },

    /// The service answered with a non-success status.
    #[error("Completion service returned status {status}: {message}")]
    Http {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    /// The response body could not be read as a completion.
    #[error("Invalid completion response: {0}")]
    InvalidResponse(String),

    /// The client is missing credentials or settings for the requested model.
    #[error("Completion client misconfigured: {0}")]
    Configuration(String),

    #[error("Completion failed: {0}")]
    Other(String),
}

impl CompletionError {
    /// Returns `true` for failures that may succeed when retried: connection
    /// problems, timeouts, rate limits and 5xx gateway errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            CompletionError::Transport { is_retryable, .. } => *is_retryable,
            CompletionError::Http { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            CompletionError::InvalidResponse(_)
            | CompletionError::Configuration(_)
            | CompletionError::Other(_) => false,
        }
    }

    /// Server-requested delay before retrying, when one was sent.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            CompletionError::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
