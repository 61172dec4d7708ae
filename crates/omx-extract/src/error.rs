//! Error types for the extraction engine
//!
//! The taxonomy mirrors how failures are handled: transient errors are
//! retried by the [`crate::retry::RetryPolicy`], permanent errors abort the
//! partition, and resource errors (I/O) are fatal to the run.

use thiserror::Error;

/// Result type alias for extraction operations
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Error type for extraction operations
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Transient request failure (timeout, connect error, 5xx, 429); retried.
    #[error("Transient request failure: {0}")]
    Transient(String),

    /// Non-retryable request rejection (4xx other than 429).
    #[error("Request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Response body that fails page-level sanity checks; aborts the partition.
    #[error("Malformed page response: {0}")]
    MalformedPage(String),

    /// Retry budget exhausted on a transient failure.
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    /// File system failure; fatal to the run, not retried.
    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    /// Serialization failure while writing a partition.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid engine configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ExtractError {
    /// Whether the retry policy may re-attempt the request that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExtractError::Transient(_))
    }

    /// Classify a reqwest error. Only timeouts and connection problems are
    /// transient; a request that cannot even be constructed (for example a
    /// bogus next-link URL) fails the same way on every attempt, so it is
    /// permanent.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            ExtractError::Transient(err.to_string())
        } else {
            ExtractError::MalformedPage(err.to_string())
        }
    }

    /// Classify a non-success HTTP status. 5xx and 429 are transient,
    /// every other 4xx is a permanent rejection.
    pub fn from_status(status: u16, body: String) -> Self {
        if status >= 500 || status == 429 {
            ExtractError::Transient(format!("status {}: {}", status, body))
        } else {
            ExtractError::Rejected { status, body }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_are_retryable() {
        assert!(ExtractError::from_status(500, String::new()).is_retryable());
        assert!(ExtractError::from_status(503, String::new()).is_retryable());
        assert!(ExtractError::from_status(429, String::new()).is_retryable());
    }

    #[test]
    fn test_client_errors_are_permanent() {
        assert!(!ExtractError::from_status(404, String::new()).is_retryable());
        assert!(!ExtractError::from_status(400, String::new()).is_retryable());
        assert!(!ExtractError::MalformedPage("not json".into()).is_retryable());
    }

    #[test]
    fn test_unconstructable_request_is_permanent() {
        // An invalid URL errors before anything hits the network; retrying
        // would burn the whole backoff budget on a deterministic failure.
        let err = reqwest::Client::new()
            .get("::not-a-url::")
            .build()
            .unwrap_err();
        assert!(!ExtractError::from_reqwest(err).is_retryable());
    }
}
