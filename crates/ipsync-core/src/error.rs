//! Error types for ipsync
//!
//! This module defines all error types used throughout the workspace.

use thiserror::Error;

/// Result type alias for ipsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for ipsync
#[derive(Error, Debug)]
pub enum Error {
    /// IP finder-related errors
    #[error("IP finder error: {0}")]
    IpFinder(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// OS-level network errors (interface enumeration, sockets)
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors (transport-level, before a status code is known)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Zone or record not found
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

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an IP finder error
    pub fn ip_finder(msg: impl Into<String>) -> Self {
        Self::IpFinder(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
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

    /// Whether the failure is likely to clear up by itself before the next tick
    ///
    /// Only used to pick a log level; the reconciler treats every failure the
    /// same way and waits for the next tick.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Http(_) | Self::RateLimited(_) => true,
            Self::Provider { message, .. } => message.contains("transient"),
            _ => false,
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
