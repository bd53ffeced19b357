//! HTTP client for a running geogate proxy

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{Client as HttpClient, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::SearchConfig;
use crate::error::UpstreamError;
use crate::hints::SearchOutcome;
use crate::protocol::{
    CACHE_ONLY_HEADER, ClearResponse, ErrorBody, FeedbackRequest, HealthResponse, HintResponse,
    StatsResponse,
};
use crate::upstream::{UpstreamResponse, UpstreamResult};

/// Overpass responses can take the full upstream timeout plus queueing
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Proxy API client
pub struct ProxyClient {
    http: HttpClient,
    base_url: String,
    rate_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl ProxyClient {
    pub fn new(base_url: &str, requests_per_second: u32) -> UpstreamResult<Self> {
        let http = HttpClient::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("geogate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        let quota = Quota::per_second(
            NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN),
        );

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    pub fn from_config(config: &SearchConfig) -> UpstreamResult<Self> {
        Self::new(&config.proxy_url, config.requests_per_second)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> UpstreamResult<HealthResponse> {
        self.get_json("/health", &[]).await
    }

    pub async fn get_hint(&self, lat: f64, lon: f64) -> UpstreamResult<u32> {
        let params = [("lat", lat.to_string()), ("lon", lon.to_string())];
        let hint: HintResponse = self.get_json("/radius-hint", &params).await?;
        Ok(hint.radius)
    }

    pub async fn report(&self, lat: f64, lon: f64, outcome: &SearchOutcome) -> UpstreamResult<u32> {
        let body = FeedbackRequest::from_outcome(lat, lon, outcome);
        let hint: HintResponse = self.post_json("/radius-hint", &body).await?;
        Ok(hint.radius)
    }

    /// Run a query through the proxy. With `cache_only`, a miss is `None`.
    pub async fn overpass(
        &self,
        query: &str,
        cache_only: bool,
    ) -> UpstreamResult<Option<UpstreamResponse>> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/overpass", self.base_url);
        let mut request = self.http.post(&url).form(&[("data", query)]);
        if cache_only {
            request = request.header(CACHE_ONLY_HEADER, "true");
        }
        let response = check(request.send().await?).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/json")
            .to_string();
        let body = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(format!("Failed to read body: {}", e)))?;
        Ok(Some(UpstreamResponse {
            body: body.to_vec(),
            content_type,
        }))
    }

    pub async fn stats(&self) -> UpstreamResult<StatsResponse> {
        self.get_json("/cache/stats", &[]).await
    }

    pub async fn clear(&self) -> UpstreamResult<ClearResponse> {
        self.post_json("/cache/clear", &serde_json::json!({})).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> UpstreamResult<T> {
        self.rate_limiter.until_ready().await;
        let url = format!("{}{}", self.base_url, path);
        let response = check(self.http.get(&url).query(params).send().await?).await?;
        parse_json(response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> UpstreamResult<T> {
        self.rate_limiter.until_ready().await;
        let url = format!("{}{}", self.base_url, path);
        let response = check(self.http.post(&url).json(body).send().await?).await?;
        parse_json(response).await
    }
}

async fn parse_json<T: DeserializeOwned>(response: reqwest::Response) -> UpstreamResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| UpstreamError::InvalidResponse(format!("Failed to parse response: {}", e)))
}

/// Map proxy error statuses back onto [`UpstreamError`]
async fn check(response: reqwest::Response) -> UpstreamResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let text = response.text().await.unwrap_or_default();
    let error_body = serde_json::from_str::<ErrorBody>(&text).ok();

    match status {
        StatusCode::TOO_MANY_REQUESTS => Err(UpstreamError::RateLimited(Duration::from_secs(
            retry_after.unwrap_or(60),
        ))),
        StatusCode::BAD_GATEWAY => {
            let (infrastructure, detail) = match error_body {
                Some(body) => (body.infrastructure, body.detail),
                None => (false, text),
            };
            Err(UpstreamError::Gateway {
                infrastructure,
                detail,
            })
        }
        _ => Err(UpstreamError::Status {
            status: status.as_u16(),
            body: error_body.map(|b| b.detail).unwrap_or(text),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(server: &mockito::Server) -> ProxyClient {
        ProxyClient::new(&server.url(), 100).unwrap()
    }

    #[tokio::test]
    async fn test_get_hint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/radius-hint")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("lat".into(), "42.36".into()),
                Matcher::UrlEncoded("lon".into(), "-71.059".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"radius":1500}"#)
            .create_async()
            .await;

        assert_eq!(client(&server).get_hint(42.36, -71.059).await.unwrap(), 1500);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_report_sends_camel_case_feedback() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/radius-hint")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "resultCount": 290,
                "capped": true,
                "error": false
            })))
            .with_status(200)
            .with_body(r#"{"radius":1500}"#)
            .create_async()
            .await;

        let outcome = SearchOutcome::success(42.36, -71.059, 290, true);
        let radius = client(&server)
            .report(42.36, -71.059, &outcome)
            .await
            .unwrap();
        assert_eq!(radius, 1500);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_overpass_cache_only_miss_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/overpass")
            .match_header("x-cache-only", "true")
            .with_status(204)
            .create_async()
            .await;

        let resp = client(&server).overpass("out;", true).await.unwrap();
        assert!(resp.is_none());
    }

    #[tokio::test]
    async fn test_bad_gateway_keeps_infrastructure_flag() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/overpass")
            .with_status(502)
            .with_body(
                r#"{"error":"upstream_error","detail":"Upstream returned HTTP 504: timeout","infrastructure":true}"#,
            )
            .create_async()
            .await;

        let err = client(&server).overpass("out;", false).await.unwrap_err();
        assert!(err.is_infrastructure());
        assert!(err.to_string().contains("504"));
    }

    #[tokio::test]
    async fn test_too_many_requests() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/cache/stats")
            .with_status(429)
            .with_header("retry-after", "12")
            .create_async()
            .await;

        let err = client(&server).stats().await.unwrap_err();
        assert!(matches!(err, UpstreamError::RateLimited(d) if d == Duration::from_secs(12)));
    }
}
