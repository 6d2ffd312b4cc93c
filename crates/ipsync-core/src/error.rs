//! Error types for ipsync
//!
//! This module defines all error types used throughout the workspace.

use thiserror::Error;

/// Result type alias for ipsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for ipsync
#[derive(Error, Debug)]
pub enum Error {
    /// IP source-related errors
    #[error("IP source error: {0}")]
    IpSource(String),

    /// DNS provider-related errors
    #[error("DNS provider error: {0}")]
    DnsProvider(String),

    /// Content publisher errors
    #[error("Publisher error: {0}")]
    Publisher(String),

    /// Local IP list file errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem / socket errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport errors (connection refused, timeout, ...)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Remote server failed (5xx)
    #[error("Server error ({provider}, status {status}): {message}")]
    Server {
        /// Service that failed
        provider: String,
        /// HTTP status code
        status: u16,
        /// Response body or summary
        message: String,
    },

    /// Record or resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// A retried operation failed on every attempt
    #[error("{operation} failed after {attempts} attempt(s): {last}")]
    RetryExhausted {
        /// What was being attempted
        operation: String,
        /// Number of attempts made
        attempts: u32,
        /// The last error observed
        last: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an IP source error
    pub fn ip_source(msg: impl Into<String>) -> Self {
        Self::IpSource(msg.into())
    }

    /// Create a DNS provider error
    pub fn dns_provider(msg: impl Into<String>) -> Self {
        Self::DnsProvider(msg.into())
    }

    /// Create a publisher error
    pub fn publisher(msg: impl Into<String>) -> Self {
        Self::Publisher(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP transport error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Map a non-success HTTP status from a remote API to an error
    ///
    /// `context` describes the call that failed (e.g. "list DNS records").
    pub fn from_status(provider: &str, status: u16, context: &str, body: &str) -> Self {
        match status {
            401 | 403 => Self::auth(format!(
                "{provider}: {context} rejected (status {status}): invalid token or insufficient permissions"
            )),
            404 => Self::not_found(format!("{provider}: {context} (status 404)")),
            429 => Self::rate_limited(format!("{provider}: {context} (status 429)")),
            500..=599 => Self::Server {
                provider: provider.to_string(),
                status,
                message: format!("{context}: {body}"),
            },
            _ => Self::provider(provider, format!("{context} failed: {status} - {body}")),
        }
    }

    /// Whether retrying the same call may succeed
    ///
    /// Transport failures, rate limits and 5xx responses are transient.
    /// Authentication, validation and not-found errors are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Io(_) | Self::RateLimited(_) | Self::Server { .. }
        )
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(
            Error::from_status("cloudflare", 403, "list", ""),
            Error::Authentication(_)
        ));
        assert!(matches!(
            Error::from_status("cloudflare", 404, "list", ""),
            Error::NotFound(_)
        ));
        assert!(matches!(
            Error::from_status("cloudflare", 429, "list", ""),
            Error::RateLimited(_)
        ));
        assert!(matches!(
            Error::from_status("cloudflare", 502, "list", "bad gateway"),
            Error::Server { status: 502, .. }
        ));
        assert!(matches!(
            Error::from_status("cloudflare", 400, "list", "bad"),
            Error::Provider { .. }
        ));
    }

    #[test]
    fn transient_classification() {
        assert!(Error::http("connection reset").is_transient());
        assert!(Error::rate_limited("slow down").is_transient());
        assert!(Error::from_status("github", 503, "put", "").is_transient());
        assert!(!Error::auth("nope").is_transient());
        assert!(!Error::config("bad").is_transient());
        assert!(!Error::from_status("github", 422, "put", "").is_transient());
    }
}
