//! Cap-detecting retry-to-fit search
//!
//! ```text
//! hint ─► query ─┬─ capped, above floor ─► halve radius ─► query (same centre)
//!                ├─ errored ─────────────► report ─► done
//!                └─ ok / at floor ───────► report ─► done
//! ```
//!
//! Exactly one outcome is reported per search, on the terminal transition.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{HintSource, QuerySource};
use crate::config::SearchConfig;
use crate::error::UpstreamError;
use crate::hints::SearchOutcome;
use crate::upstream::UpstreamResult;

/// An OSM tag filter: `key` or `key=value`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFilter {
    pub key: String,
    pub value: Option<String>,
}

impl FromStr for TagFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = match s.split_once('=') {
            Some((k, v)) => (k.trim(), Some(v.trim())),
            None => (s.trim(), None),
        };
        if key.is_empty() || key.contains('"') || value.is_some_and(|v| v.contains('"')) {
            return Err(format!("invalid tag filter '{}'", s));
        }
        Ok(Self {
            key: key.to_string(),
            value: value.map(str::to_string),
        })
    }
}

impl fmt::Display for TagFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Some(ref v) => write!(f, "[\"{}\"=\"{}\"]", self.key, v),
            None => write!(f, "[\"{}\"]", self.key),
        }
    }
}

/// Overpass QL for at most `limit` nodes/ways/relations within `radius_m`
/// of a point matching any of `tags`.
///
/// The output limit is the cap threshold, so a truncated answer comes back
/// with exactly `limit` elements.
pub fn build_query(
    lat: f64,
    lon: f64,
    radius_m: u32,
    tags: &[TagFilter],
    limit: usize,
) -> String {
    let around = format!("(around:{},{},{})", radius_m, lat, lon);
    let body = if tags.is_empty() {
        format!("nwr{};", around)
    } else {
        tags.iter()
            .map(|t| format!("nwr{}{};", t, around))
            .collect::<String>()
    };
    format!("[out:json][timeout:25];({});out center {};", body, limit)
}

#[derive(Deserialize)]
struct OverpassBody {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Deserialize)]
struct OverpassElement {
    #[serde(default)]
    tags: Option<serde_json::Map<String, serde_json::Value>>,
}

/// (raw, tagged) element counts
fn count_elements(body: &[u8]) -> UpstreamResult<(usize, usize)> {
    let parsed: OverpassBody = serde_json::from_slice(body)
        .map_err(|e| UpstreamError::InvalidResponse(format!("Overpass body: {}", e)))?;
    let raw = parsed.elements.len();
    let tagged = parsed
        .elements
        .iter()
        .filter(|e| e.tags.as_ref().is_some_and(|t| !t.is_empty()))
        .count();
    Ok((raw, tagged))
}

#[derive(Debug, Clone, Copy)]
pub struct SearchSettings {
    /// Raw element count at which a response is treated as truncated
    pub cap_threshold: usize,
    /// Smallest radius the loop will shrink to
    pub radius_floor_m: u32,
}

impl From<&SearchConfig> for SearchSettings {
    fn from(config: &SearchConfig) -> Self {
        Self {
            cap_threshold: config.cap_threshold,
            radius_floor_m: config.radius_floor_m,
        }
    }
}

/// Final state of one search
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub lat: f64,
    pub lon: f64,
    /// Radius the hint suggested
    pub initial_radius_m: u32,
    /// Radius of the last attempt
    pub radius_m: u32,
    pub attempts: u32,
    /// Elements in the last response, as returned
    pub raw_count: usize,
    /// Elements carrying at least one tag
    pub result_count: usize,
    /// Still truncated at the radius floor
    pub capped: bool,
    /// Cell hint after feedback; `None` if the report failed
    pub hint_after: Option<u32>,
    pub body: Vec<u8>,
}

/// Runs searches against a hint source and a query source
pub struct SearchClient {
    hints: Arc<dyn HintSource>,
    queries: Arc<dyn QuerySource>,
    settings: SearchSettings,
}

impl SearchClient {
    pub fn new(
        hints: Arc<dyn HintSource>,
        queries: Arc<dyn QuerySource>,
        settings: SearchSettings,
    ) -> Self {
        Self {
            hints,
            queries,
            settings,
        }
    }

    pub async fn search(
        &self,
        lat: f64,
        lon: f64,
        tags: &[TagFilter],
    ) -> UpstreamResult<SearchResult> {
        self.search_with_cancel(lat, lon, tags, &CancellationToken::new())
            .await
    }

    /// As [`search`](Self::search); a cancelled search reports no outcome.
    pub async fn search_with_cancel(
        &self,
        lat: f64,
        lon: f64,
        tags: &[TagFilter],
        cancel: &CancellationToken,
    ) -> UpstreamResult<SearchResult> {
        let initial = tokio::select! {
            _ = cancel.cancelled() => return Err(UpstreamError::Cancelled),
            hint = self.hints.radius_hint(lat, lon) => hint?,
        };
        let floor = self.settings.radius_floor_m;
        let mut radius = initial.max(floor);
        let mut attempts = 0;
        let mut any_capped = false;

        loop {
            if cancel.is_cancelled() {
                log::debug!("Search at {},{} cancelled after {} attempts", lat, lon, attempts);
                return Err(UpstreamError::Cancelled);
            }
            attempts += 1;
            let query = build_query(lat, lon, radius, tags, self.settings.cap_threshold);
            log::debug!("Search attempt {} at {},{} r={}m", attempts, lat, lon, radius);

            let fetched = tokio::select! {
                _ = cancel.cancelled() => return Err(UpstreamError::Cancelled),
                r = self.queries.run_query(&query) => r,
            };
            let counted = fetched.and_then(|resp| {
                count_elements(&resp.body).map(|(raw, tagged)| (resp.body, raw, tagged))
            });

            let (body, raw, tagged) = match counted {
                Ok(counted) => counted,
                Err(e) => {
                    log::warn!("Search at {},{} failed at r={}m: {}", lat, lon, radius, e);
                    let outcome = SearchOutcome::failure(lat, lon, e.is_infrastructure());
                    self.report(lat, lon, &outcome).await;
                    return Err(e);
                }
            };

            let capped = raw >= self.settings.cap_threshold;
            if capped {
                any_capped = true;
                if radius > floor {
                    let next = (radius / 2).max(floor);
                    log::info!(
                        "Capped at {} elements (r={}m), retrying at {}m",
                        raw,
                        radius,
                        next
                    );
                    radius = next;
                    continue;
                }
                log::warn!("Still capped at the {}m floor", floor);
            }

            let outcome = SearchOutcome::success(lat, lon, tagged, any_capped);
            let hint_after = self.report(lat, lon, &outcome).await;
            return Ok(SearchResult {
                lat,
                lon,
                initial_radius_m: initial,
                radius_m: radius,
                attempts,
                raw_count: raw,
                result_count: tagged,
                capped,
                hint_after,
                body,
            });
        }
    }

    async fn report(&self, lat: f64, lon: f64, outcome: &SearchOutcome) -> Option<u32> {
        match self.hints.report_outcome(lat, lon, outcome).await {
            Ok(radius) => Some(radius),
            Err(e) => {
                log::warn!("Failed to report search outcome: {}", e);
                None
            }
        }
    }
}
