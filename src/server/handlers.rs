//! Route handlers

use axum::Json;
use axum::extract::{Form, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use super::AppState;
use super::error::{ApiError, ApiResult};
use crate::cache::overpass_cache_key;
use crate::protocol::{
    CACHE_ONLY_HEADER, CACHE_STATUS_HEADER, CacheStatus, ClearResponse, FeedbackRequest,
    HealthResponse, HintQuery, HintResponse, StatsResponse,
};
use crate::proxy::{AircraftReply, ResponseSource};
use crate::upstream::AircraftQuery;

fn body_response(body: Vec<u8>, content_type: &str, status: CacheStatus) -> Response {
    let mut response = (StatusCode::OK, body).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/json")),
    );
    headers.insert(CACHE_STATUS_HEADER, HeaderValue::from_static(status.as_str()));
    response
}

fn check_coords(lat: f64, lon: f64) -> ApiResult<()> {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(ApiError::BadRequest(format!(
            "coordinates out of range: {},{}",
            lat, lon
        )));
    }
    Ok(())
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /radius-hint?lat=&lon=
pub async fn get_radius_hint(
    State(state): State<AppState>,
    Query(q): Query<HintQuery>,
) -> ApiResult<Json<HintResponse>> {
    check_coords(q.lat, q.lon)?;
    Ok(Json(HintResponse {
        radius: state.hints.get_hint(q.lat, q.lon),
    }))
}

/// POST /radius-hint
pub async fn post_radius_hint(
    State(state): State<AppState>,
    Json(feedback): Json<FeedbackRequest>,
) -> ApiResult<Json<HintResponse>> {
    check_coords(feedback.lat, feedback.lon)?;
    let radius = state.hints.adjust_hint(&feedback.to_outcome());
    Ok(Json(HintResponse { radius }))
}

#[derive(Debug, Deserialize)]
pub struct OverpassForm {
    data: String,
}

/// POST /overpass
pub async fn overpass(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<OverpassForm>,
) -> ApiResult<Response> {
    let cache_only = headers
        .get(CACHE_ONLY_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));

    let key = overpass_cache_key(&form.data);
    if let Some(ref key) = key
        && let Some(entry) = state.cache.get(key, state.overpass_ttl)
    {
        return Ok(body_response(
            entry.payload,
            &entry.content_type,
            CacheStatus::Hit,
        ));
    }

    if cache_only {
        let mut response = StatusCode::NO_CONTENT.into_response();
        response.headers_mut().insert(
            CACHE_STATUS_HEADER,
            HeaderValue::from_static(CacheStatus::Miss.as_str()),
        );
        return Ok(response);
    }

    let gated = state.gate.submit(&form.data).await?;
    let status = match gated.source {
        ResponseSource::Cache => CacheStatus::Hit,
        ResponseSource::Upstream => CacheStatus::Miss,
        ResponseSource::Passthrough => CacheStatus::Bypass,
    };
    Ok(body_response(
        gated.response.body,
        &gated.response.content_type,
        status,
    ))
}

#[derive(Debug, Deserialize)]
pub struct AircraftParams {
    bbox: Option<String>,
    icao24: Option<String>,
}

/// GET /aircraft?bbox=s,w,n,e | ?icao24=hex
pub async fn aircraft(
    State(state): State<AppState>,
    Query(params): Query<AircraftParams>,
) -> ApiResult<Response> {
    let query = match (params.bbox.as_deref(), params.icao24.as_deref()) {
        (Some(bbox), None) => AircraftQuery::parse_bbox(bbox),
        (None, Some(icao)) => AircraftQuery::parse_icao24(icao),
        _ => Err("exactly one of bbox or icao24 is required".to_string()),
    }
    .map_err(ApiError::BadRequest)?;

    match state.aircraft.fetch(&query).await? {
        AircraftReply::Fresh(entry) => Ok(body_response(
            entry.payload,
            &entry.content_type,
            CacheStatus::Hit,
        )),
        AircraftReply::Live(entry) => Ok(body_response(
            entry.payload,
            &entry.content_type,
            CacheStatus::Miss,
        )),
        AircraftReply::Stale(entry) => Ok(body_response(
            entry.payload,
            &entry.content_type,
            CacheStatus::Stale,
        )),
        AircraftReply::TryLater(wait) => Err(ApiError::TryLater(wait)),
    }
}

/// GET /cache/stats
pub async fn cache_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.cache.stats();
    Json(StatsResponse {
        entries: stats.entries,
        radius_hints: state.hints.len(),
        hits: stats.hits,
        misses: stats.misses,
        hit_rate: stats.hit_rate(),
        queue_depth: state.gate.queue_depth(),
        unique_elements: state.dedup.unique_elements(),
        opensky: state.aircraft.limiter().snapshot(),
    })
}

/// POST /cache/clear
///
/// Quota state is left alone: it mirrors requests already spent upstream.
pub async fn cache_clear(State(state): State<AppState>) -> Json<ClearResponse> {
    let cleared = ClearResponse {
        entries: state.cache.clear(),
        radius_hints: state.hints.clear(),
        unique_elements: state.dedup.clear(),
    };
    log::info!(
        "Cleared {} cache entries, {} radius hints",
        cleared.entries,
        cleared.radius_hints
    );
    Json(cleared)
}
