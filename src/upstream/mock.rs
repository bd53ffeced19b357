//! Mock upstreams for testing
//!
//! Responses are scripted per call; when the script runs out the default
//! response is returned. Every call is recorded with the (tokio) instant it
//! was dispatched so pacing can be asserted under a paused clock.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{AircraftQuery, OpenSkyApi, OverpassApi, UpstreamResponse, UpstreamResult};
use crate::error::UpstreamError;

type Script = Arc<Mutex<VecDeque<UpstreamResult<UpstreamResponse>>>>;

/// Build a JSON response with `n` tagged nodes
pub fn elements_body(n: usize) -> UpstreamResponse {
    let elements: Vec<serde_json::Value> = (0..n)
        .map(|i| serde_json::json!({"type": "node", "id": i, "tags": {"name": format!("poi-{}", i)}}))
        .collect();
    UpstreamResponse {
        body: serde_json::to_vec(&serde_json::json!({ "elements": elements }))
            .unwrap_or_default(),
        content_type: "application/json".to_string(),
    }
}

pub fn json_body(body: &str) -> UpstreamResponse {
    UpstreamResponse {
        body: body.as_bytes().to_vec(),
        content_type: "application/json".to_string(),
    }
}

/// Mock Overpass interpreter
#[derive(Clone)]
pub struct MockOverpass {
    script: Script,
    default: UpstreamResponse,
    latency: Duration,
    calls: Arc<Mutex<Vec<(Instant, String)>>>,
}

impl Default for MockOverpass {
    fn default() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            default: elements_body(3),
            latency: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockOverpass {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated time spent in the upstream
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub async fn push(&self, response: UpstreamResult<UpstreamResponse>) {
        self.script.lock().await.push_back(response);
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    pub async fn dispatch_times(&self) -> Vec<Instant> {
        self.calls.lock().await.iter().map(|(t, _)| *t).collect()
    }

    pub async fn queries(&self) -> Vec<String> {
        self.calls.lock().await.iter().map(|(_, q)| q.clone()).collect()
    }
}

#[async_trait]
impl OverpassApi for MockOverpass {
    async fn interpreter(&self, query: &str) -> UpstreamResult<UpstreamResponse> {
        self.calls
            .lock()
            .await
            .push((Instant::now(), query.to_string()));
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match self.script.lock().await.pop_front() {
            Some(result) => result,
            None => Ok(self.default.clone()),
        }
    }
}

/// Mock OpenSky feed
#[derive(Clone)]
pub struct MockOpenSky {
    script: Script,
    calls: Arc<Mutex<Vec<AircraftQuery>>>,
}

impl Default for MockOpenSky {
    fn default() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockOpenSky {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, response: UpstreamResult<UpstreamResponse>) {
        self.script.lock().await.push_back(response);
    }

    pub async fn push_rate_limited(&self, times: usize) {
        for _ in 0..times {
            self.push(Err(UpstreamError::RateLimited(Duration::from_secs(1))))
                .await;
        }
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

#[async_trait]
impl OpenSkyApi for MockOpenSky {
    async fn states(&self, query: &AircraftQuery) -> UpstreamResult<UpstreamResponse> {
        self.calls.lock().await.push(query.clone());
        match self.script.lock().await.pop_front() {
            Some(result) => result,
            None => Ok(json_body(r#"{"time":0,"states":[]}"#)),
        }
    }
}
