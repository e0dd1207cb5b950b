//! Error types for backend calls.
//!
//! Every variant carries the URI (or path) it failed on so retry logs and the
//! final error surfaced to the caller stay actionable.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::marker::MarkerError;

/// Errors that can occur while talking to the processing backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection-level failure (DNS, refused, reset, TLS).
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URI that failed.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// Request did not complete within the session timeout.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URI that timed out.
        url: String,
    },

    /// Backend answered with a non-2xx status.
    #[error("HTTP {status} requesting {url}")]
    HttpStatus {
        /// The URI that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Response body did not match the expected shape.
    #[error("unexpected response payload from {url}: {message}")]
    Decode {
        /// The URI whose payload could not be decoded.
        url: String,
        /// Decoder message.
        message: String,
    },

    /// The URI could not be parsed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URI string.
        url: String,
    },

    /// Marker bookkeeping failed after a job was accepted.
    #[error("marker store error: {0}")]
    Marker(#[from] MarkerError),

    /// Local file system error while writing a resource.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// File path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Operation was cancelled by the user.
    #[error("interrupted while processing {url}")]
    Interrupted {
        /// The URI being processed when the interrupt arrived.
        url: String,
    },

    /// Job did not become ready within the configured wait limit.
    #[error("job {handle} not ready after {waited:?}")]
    PollTimeout {
        /// The job handle that was being polled.
        handle: String,
        /// How long the poller waited.
        waited: Duration,
    },
}

impl ApiError {
    /// Creates a network error, promoting reqwest timeouts to [`ApiError::Timeout`].
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Network { url, source }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a payload decode error.
    pub fn decode(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an interrupt error.
    pub fn interrupted(url: impl Into<String>) -> Self {
        Self::Interrupted { url: url.into() }
    }

    /// Returns the HTTP status code when this is a status error.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_display_contains_status_and_url() {
        let error = ApiError::http_status("https://maps.example.com/api/v2/x", 422);
        let msg = error.to_string();
        assert!(msg.contains("422"), "Expected status in: {msg}");
        assert!(msg.contains("/api/v2/x"), "Expected URL in: {msg}");
        assert_eq!(error.status(), Some(422));
    }

    #[test]
    fn test_decode_display() {
        let error = ApiError::decode("https://h/status", "missing field `percentage`");
        assert!(error.to_string().contains("percentage"));
        assert_eq!(error.status(), None);
    }

    #[test]
    fn test_poll_timeout_display_names_handle() {
        let error = ApiError::PollTimeout {
            handle: "abc-123".to_string(),
            waited: Duration::from_secs(60),
        };
        assert!(error.to_string().contains("abc-123"));
    }

    #[test]
    fn test_marker_error_converts() {
        let error: ApiError = MarkerError::invalid_handle("../x").into();
        assert!(matches!(error, ApiError::Marker(_)));
    }
}
