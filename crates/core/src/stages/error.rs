use std::time::Duration;

use thiserror::Error;

use crate::retry::RetryableError;

/// Error type for stage executors.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl StageError {
    /// Map a transport error, keeping timeouts distinguishable.
    pub(crate) fn from_reqwest(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            StageError::Timeout(timeout)
        } else {
            StageError::Http(error.to_string())
        }
    }

    /// Map a non-success HTTP status. 429 becomes `RateLimited`.
    pub(crate) fn from_status(status: u16, body: &str) -> Self {
        let message: String = body.chars().take(200).collect();
        if status == 429 {
            StageError::RateLimited(message)
        } else {
            StageError::Api { status, message }
        }
    }
}

impl RetryableError for StageError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, StageError::RateLimited(_))
    }
}
