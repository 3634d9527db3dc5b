//! Error taxonomy for resilient HTTP calls
//!
//! A logical request resolves to exactly one of these variants (or a decoded
//! body). Intermediate retryable failures are traced but never surfaced
//! individually; only the terminal failure reaches the caller.

use std::time::Duration;

use thiserror::Error;

/// Terminal failure of a logical request.
#[derive(Debug, Error)]
pub enum Error {
    /// A response arrived with a non-success status that is not retryable,
    /// or retries were exhausted on a retryable status.
    #[error("HTTP {status}: {status_text}")]
    Http { status: u16, status_text: String },

    /// An attempt did not settle within its per-attempt timeout.
    #[error("Operation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// Transport-level failure (connection refused, DNS, malformed stream).
    #[error("Network error: {source}")]
    Network {
        #[source]
        source: reqwest::Error,
    },

    /// The circuit breaker rejected the call before any attempt was made.
    #[error("Circuit breaker is open for '{key}', rejecting calls")]
    CircuitOpen { key: String },

    /// The target URL could not be parsed.
    #[error("Invalid URL: {source}")]
    InvalidUrl {
        #[from]
        source: url::ParseError,
    },

    /// The request body could not be serialized to JSON.
    #[error("Failed to serialize request body: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    /// Configuration failed validation at construction time.
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build the HTTP error for a status code, e.g. `HTTP 400: Bad Request`.
    pub(crate) fn from_status(status: reqwest::StatusCode) -> Self {
        Error::Http {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("Unknown").to_string(),
        }
    }

    /// Stable label for metrics recording.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Http { .. } => "http",
            Error::Timeout { .. } => "timeout",
            Error::Network { .. } => "network",
            Error::CircuitOpen { .. } => "circuit_open",
            Error::InvalidUrl { .. } => "invalid_url",
            Error::Serialization { .. } => "serialization",
            Error::InvalidConfiguration { .. } => "invalid_configuration",
        }
    }

    /// The HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates the user-visible message format for HTTP failures.
    #[test]
    fn test_http_error_display() {
        let err = Error::from_status(reqwest::StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "HTTP 400: Bad Request");

        let err = Error::from_status(reqwest::StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.to_string(), "HTTP 503: Service Unavailable");
    }

    #[test]
    fn test_timeout_error_display() {
        let err = Error::Timeout { timeout: Duration::from_millis(250) };
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn test_circuit_open_display_names_key() {
        let err = Error::CircuitOpen { key: "api.example.com/v1".to_string() };
        assert!(err.to_string().contains("api.example.com/v1"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::from_status(reqwest::StatusCode::BAD_GATEWAY).kind(), "http");
        assert_eq!(Error::Timeout { timeout: Duration::from_secs(1) }.kind(), "timeout");
        assert_eq!(Error::CircuitOpen { key: "k".into() }.kind(), "circuit_open");
    }

    #[test]
    fn test_status_accessor() {
        assert_eq!(Error::from_status(reqwest::StatusCode::TOO_MANY_REQUESTS).status(), Some(429));
        assert_eq!(Error::Timeout { timeout: Duration::from_secs(1) }.status(), None);
    }
}
