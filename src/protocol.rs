//! JSON bodies exchanged between the proxy server and its clients

use serde::{Deserialize, Serialize};

use crate::hints::SearchOutcome;
use crate::proxy::QuotaSnapshot;

/// Header that turns `/overpass` into a cache-only lookup
pub const CACHE_ONLY_HEADER: &str = "x-cache-only";

/// Header reporting how a response was produced
pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// Value of the `X-Cache` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    Stale,
    Bypass,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Stale => "STALE",
            CacheStatus::Bypass => "BYPASS",
        }
    }
}

/// `GET /radius-hint` query string
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct HintQuery {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HintResponse {
    pub radius: u32,
}

/// `POST /radius-hint` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub result_count: usize,
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub capped: bool,
    /// Set when the error was a gateway timeout or rate limit
    #[serde(default)]
    pub infrastructure_error: bool,
}

impl FeedbackRequest {
    pub fn from_outcome(lat: f64, lon: f64, outcome: &SearchOutcome) -> Self {
        Self {
            lat,
            lon,
            result_count: outcome.result_count,
            error: outcome.errored,
            capped: outcome.capped,
            infrastructure_error: outcome.infrastructure_error,
        }
    }

    pub fn to_outcome(&self) -> SearchOutcome {
        if self.error {
            SearchOutcome::failure(self.lat, self.lon, self.infrastructure_error)
        } else {
            SearchOutcome::success(self.lat, self.lon, self.result_count, self.capped)
        }
    }
}

/// `GET /cache/stats`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub entries: usize,
    pub radius_hints: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub queue_depth: usize,
    pub unique_elements: usize,
    pub opensky: QuotaSnapshot,
}

/// `POST /cache/clear`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearResponse {
    pub entries: usize,
    pub radius_hints: usize,
    pub unique_elements: usize,
}

/// Error body for 4xx/5xx responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub detail: String,
    #[serde(default)]
    pub infrastructure: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feedback_wire_names() {
        let body = r#"{"lat":42.36,"lon":-71.059,"resultCount":520,"error":false,"capped":true}"#;
        let req: FeedbackRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.result_count, 520);
        assert!(req.capped);
        assert!(!req.infrastructure_error);

        let outcome = req.to_outcome();
        assert!(outcome.capped);
        assert!(!outcome.errored);
    }

    #[test]
    fn test_feedback_error_maps_to_failure() {
        let body = r#"{"lat":1,"lon":2,"error":true,"infrastructureError":true}"#;
        let outcome = serde_json::from_str::<FeedbackRequest>(body)
            .unwrap()
            .to_outcome();
        assert!(outcome.errored);
        assert!(outcome.infrastructure_error);
        assert_eq!(outcome.result_count, 0);
    }

    #[test]
    fn test_stats_field_names() {
        let stats = StatsResponse {
            entries: 1,
            radius_hints: 2,
            hits: 3,
            misses: 1,
            hit_rate: 0.75,
            queue_depth: 0,
            unique_elements: 9,
            opensky: QuotaSnapshot {
                requests_last_24h: 4,
                remaining: 3596,
                backoff_level: 0,
            },
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["radiusHints"], 2);
        assert_eq!(json["hitRate"], 0.75);
        assert_eq!(json["opensky"]["requestsLast24h"], 4);
        assert_eq!(json["opensky"]["backoffLevel"], 0);
    }
}
