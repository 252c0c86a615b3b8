//! Error types for usenet-webquery
//!
//! Engine-level failures (bad configuration, a stopped engine, client helper
//! failures) are reported through [`Error`]. Failures of an individual query
//! never show up here: they are delivered exactly once to the query's reply
//! callback as a [`ReplyStatus`](crate::types::ReplyStatus).

use thiserror::Error;

/// Result type alias for usenet-webquery operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for usenet-webquery
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "tick_interval")
        key: Option<String>,
    },

    /// A query target could not be parsed as a URL
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP client construction or request error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error (reading an attachment from disk, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The engine task is no longer running
    #[error("shutdown in progress: not accepting new queries")]
    ShuttingDown,

    /// The awaited query was aborted and will never produce a reply
    #[error("query {0} was aborted")]
    Aborted(crate::types::QueryId),

    /// A reply arrived but its content could not be interpreted
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A Newznab indexer rejected or garbled an API call
    #[error("newznab error: {0}")]
    Newznab(#[from] crate::clients::newznab::NewznabError),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QueryId;

    #[test]
    fn test_config_error_carries_key() {
        let err = Error::config("timeout_ticks", "must be greater than zero");
        match &err {
            Error::Config { key, message } => {
                assert_eq!(key.as_deref(), Some("timeout_ticks"));
                assert_eq!(message, "must be greater than zero");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
        assert_eq!(
            err.to_string(),
            "configuration error: must be greater than zero"
        );
    }

    #[test]
    fn test_aborted_error_names_query() {
        let err = Error::Aborted(QueryId(7));
        assert_eq!(err.to_string(), "query 7 was aborted");
    }

    #[test]
    fn test_url_parse_error_converts() {
        let parse_err = url::Url::parse("not a url").unwrap_err();
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }
}
