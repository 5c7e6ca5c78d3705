//! Error types for pipeline operations.
//!
//! This module defines [`KbError`] which covers all error cases that can occur
//! when fetching, parsing, generating or reporting on knowledge base documents.

use thiserror::Error;

/// Errors that can occur during pipeline operations.
#[derive(Error, Debug)]
pub enum KbError {
    /// Network-related errors (connection failures, timeouts, etc.).
    #[error("Network error: {0}")]
    Network(String),

    /// A provider answered with a non-success status code.
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// The status code returned.
        status: u16,
        /// The requested URL.
        url: String,
    },

    /// Rate limit exceeded by a provider.
    #[error("Rate limited by {provider}: retry after {retry_after:?}")]
    RateLimited {
        /// The provider that rate limited the request.
        provider: String,
        /// Suggested time to wait before retrying.
        retry_after: Option<std::time::Duration>,
    },

    /// Error parsing a payload or document.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The payload parsed but did not have the expected shape.
    #[error("Unexpected {provider} payload: {reason}")]
    Schema {
        /// The provider whose payload was rejected.
        provider: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The requested ticker, company or file does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Delimited text error.
    #[error("CSV error: {0}")]
    Csv(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl KbError {
    /// Returns true if the error only affects the ticker being processed.
    ///
    /// Batch stages log these and continue with the next ticker. Everything
    /// else (configuration, invalid arguments) aborts the stage before any
    /// network activity.
    #[must_use]
    pub const fn is_ticker_scoped(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::InvalidParameter(_))
    }
}

impl From<reqwest::Error> for KbError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

/// Result type alias using [`KbError`].
pub type Result<T> = std::result::Result<T, KbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_scope() {
        assert!(KbError::Network("timeout".into()).is_ticker_scoped());
        assert!(KbError::Parse("bad csv".into()).is_ticker_scoped());
        assert!(!KbError::Config("no root".into()).is_ticker_scoped());
        assert!(!KbError::InvalidParameter("ticker".into()).is_ticker_scoped());
    }

    #[test]
    fn test_display() {
        let err = KbError::HttpStatus {
            status: 404,
            url: "https://example.org".into(),
        };
        assert_eq!(err.to_string(), "HTTP 404 from https://example.org");
    }
}
