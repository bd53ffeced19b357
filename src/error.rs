//! Error types for Geogate

use std::time::Duration;
use thiserror::Error;

/// Result type alias for Geogate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the application
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Interactive prompt error: {0}")]
    Prompt(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Operation failed: {0}")]
    Other(String),
}

impl From<dialoguer::Error> for Error {
    fn from(err: dialoguer::Error) -> Self {
        Error::Prompt(err.to_string())
    }
}

/// Failures talking to an upstream API (or to the proxy, from the client side)
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Upstream rate limit exceeded. Retry after {0:?}")]
    RateLimited(Duration),

    #[error("Upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Upstream request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),

    /// The proxy reported an upstream failure on our behalf
    #[error("Proxy could not reach upstream: {detail}")]
    Gateway { infrastructure: bool, detail: String },

    #[error("Upstream gate is shut down")]
    GateClosed,

    #[error("Search cancelled")]
    Cancelled,
}

impl UpstreamError {
    /// True for failures that implicate the upstream's own capacity
    /// (gateway timeouts, rate limits) rather than the request itself.
    pub fn is_infrastructure(&self) -> bool {
        match self {
            UpstreamError::RateLimited(_) | UpstreamError::Timeout => true,
            UpstreamError::Status { status, .. } => matches!(status, 429 | 503 | 504),
            UpstreamError::Gateway { infrastructure, .. } => *infrastructure,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else if err.is_connect() {
            UpstreamError::Network("Failed to connect to upstream".to_string())
        } else {
            UpstreamError::Network(err.to_string())
        }
    }
}

/// Persistence errors. These are logged and swallowed by the stores.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(String),

    #[error("Cache serialization error: {0}")]
    Serialize(String),

    #[error("Could not determine cache directory")]
    NoCacheDir,
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found. Run `geogate init` to create one.")]
    NotFound,

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to save configuration: {0}")]
    SaveError(String),
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
