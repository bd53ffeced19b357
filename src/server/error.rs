//! HTTP error mapping

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use std::time::Duration;

use crate::error::UpstreamError;
use crate::protocol::ErrorBody;

/// Errors a handler can return
#[derive(Debug)]
pub enum ApiError {
    /// Malformed parameters
    BadRequest(String),
    /// Upstream failure surfaced to the caller (502)
    Upstream(UpstreamError),
    /// Throttled with nothing cached (429 + `Retry-After`)
    TryLater(Duration),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        ApiError::Upstream(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(detail) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    error: "bad_request".to_string(),
                    detail,
                    infrastructure: false,
                }),
            )
                .into_response(),
            ApiError::Upstream(err) => (
                StatusCode::BAD_GATEWAY,
                Json(ErrorBody {
                    error: "upstream_error".to_string(),
                    detail: err.to_string(),
                    infrastructure: err.is_infrastructure(),
                }),
            )
                .into_response(),
            ApiError::TryLater(wait) => {
                // Round up so a client never retries early
                let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(ErrorBody {
                        error: "quota_exhausted".to_string(),
                        detail: format!("No cached data; retry in {}s", secs),
                        infrastructure: true,
                    }),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(secs));
                response
            }
        }
    }
}
