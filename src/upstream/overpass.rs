//! Overpass interpreter client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;

use super::{OverpassApi, UpstreamResponse, UpstreamResult, error_for_status, read_body};
use crate::config::OverpassConfig;
use crate::error::UpstreamError;

/// HTTP client for an Overpass API interpreter endpoint
pub struct OverpassClient {
    http: HttpClient,
    url: String,
}

impl OverpassClient {
    pub fn new(config: &OverpassConfig) -> UpstreamResult<Self> {
        Self::with_url(&config.url, Duration::from_secs(config.timeout_secs))
    }

    pub fn with_url(url: &str, timeout: Duration) -> UpstreamResult<Self> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("geogate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        Ok(Self {
            http,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl OverpassApi for OverpassClient {
    async fn interpreter(&self, query: &str) -> UpstreamResult<UpstreamResponse> {
        let response = self
            .http
            .post(&self.url)
            .form(&[("data", query)])
            .send()
            .await
            .map_err(UpstreamError::from)?;

        if !response.status().is_success() {
            let err = error_for_status(response).await;
            log::warn!("Overpass request failed: {}", err);
            return Err(err);
        }

        read_body(response, "application/json").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(server: &mockito::Server) -> OverpassClient {
        OverpassClient::with_url(
            &format!("{}/api/interpreter", server.url()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_posts_query_as_form_field() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/interpreter")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(mockito::Matcher::Regex(r"^data=node%28around".into()))
            .with_status(200)
            .with_header("content-type", "application/json; charset=utf-8")
            .with_body(r#"{"elements":[]}"#)
            .create_async()
            .await;

        let resp = client(&server)
            .interpreter("node(around:100,1,2);out;")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(resp.body, br#"{"elements":[]}"#);
        assert_eq!(resp.content_type, "application/json; charset=utf-8");
    }

    #[tokio::test]
    async fn test_gateway_timeout_maps_to_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/interpreter")
            .with_status(504)
            .with_body("Gateway Timeout")
            .create_async()
            .await;

        let err = client(&server).interpreter("out;").await.unwrap_err();
        match &err {
            UpstreamError::Status { status, body } => {
                assert_eq!(*status, 504);
                assert!(body.contains("Gateway Timeout"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(err.is_infrastructure());
    }

    #[tokio::test]
    async fn test_too_many_requests_reads_retry_after() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/interpreter")
            .with_status(429)
            .with_header("retry-after", "17")
            .create_async()
            .await;

        let err = client(&server).interpreter("out;").await.unwrap_err();
        assert!(matches!(err, UpstreamError::RateLimited(d) if d == Duration::from_secs(17)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let client =
            OverpassClient::with_url("http://127.0.0.1:9/interpreter", Duration::from_secs(2))
                .unwrap();
        let err = client.interpreter("out;").await.unwrap_err();
        assert!(matches!(
            err,
            UpstreamError::Network(_) | UpstreamError::Timeout
        ));
    }
}
