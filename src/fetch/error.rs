//! Error types for page fetches.

use thiserror::Error;

/// Errors that can occur while fetching a page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL being fetched.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}\n  Suggestion: Raise `timeout_secs` in the config if the source is slow")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Non-success HTTP response.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The URL could not be built or parsed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The offending URL or reference.
        url: String,
    },

    /// The HTTP client could not be constructed (bad header, TLS backend, ...).
    #[error("HTTP client construction failed: {reason}")]
    Client {
        /// What went wrong.
        reason: String,
    },
}

impl FetchError {
    /// Creates a network or timeout error from a reqwest error.
    pub fn from_reqwest(url: impl Into<String>, source: reqwest::Error) -> Self {
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

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a client construction error.
    pub fn client(reason: impl std::fmt::Display) -> Self {
        Self::Client {
            reason: reason.to_string(),
        }
    }
}
