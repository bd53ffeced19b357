//! Upstream API clients
//!
//! Two upstreams sit behind the proxy: the Overpass POI interpreter, which
//! truncates dense results and times out under load, and the OpenSky state
//! vector feed, which enforces a hard daily quota.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::UpstreamError;

#[cfg(test)]
pub mod mock;
pub mod opensky;
pub mod overpass;
pub mod sink;

pub use opensky::{AircraftQuery, OpenSkyClient};
pub use overpass::OverpassClient;
pub use sink::{ElementDedup, ResponseSink};

/// Result type for upstream calls
pub type UpstreamResult<T> = std::result::Result<T, UpstreamError>;

/// A successful upstream body, kept verbatim
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    pub body: Vec<u8>,
    pub content_type: String,
}

/// Overpass interpreter
#[async_trait]
pub trait OverpassApi: Send + Sync {
    /// Run an Overpass QL query
    async fn interpreter(&self, query: &str) -> UpstreamResult<UpstreamResponse>;
}

/// OpenSky state vectors
#[async_trait]
pub trait OpenSkyApi: Send + Sync {
    /// Fetch current state vectors for a bounding box or a single transponder
    async fn states(&self, query: &AircraftQuery) -> UpstreamResult<UpstreamResponse>;
}

/// Map a non-success response onto the error taxonomy.
///
/// Shared by both clients so that 429 handling (and its `Retry-After`)
/// behaves identically.
pub(crate) async fn error_for_status(response: reqwest::Response) -> UpstreamError {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(60);
        return UpstreamError::RateLimited(Duration::from_secs(retry_after));
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| format!("HTTP {}", status));
    UpstreamError::Status {
        status: status.as_u16(),
        body: truncate(&body, 512),
    }
}

/// Read a successful body along with its content type
pub(crate) async fn read_body(
    response: reqwest::Response,
    default_type: &str,
) -> UpstreamResult<UpstreamResponse> {
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(default_type)
        .to_string();
    let body = response
        .bytes()
        .await
        .map_err(|e| UpstreamError::InvalidResponse(format!("Failed to read body: {}", e)))?;
    Ok(UpstreamResponse {
        body: body.to_vec(),
        content_type,
    })
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}
