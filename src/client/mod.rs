//! Caller side of the proxy
//!
//! [`SearchClient`] runs the retry-to-fit loop against two seams: a
//! [`HintSource`] for radius hints and a [`QuerySource`] for Overpass
//! queries. Over the network both are a [`ProxyClient`]; co-located with the
//! proxy they are the [`RadiusHintStore`] and the [`UpstreamGate`] directly.

use async_trait::async_trait;

use crate::error::UpstreamError;
use crate::hints::{RadiusHintStore, SearchOutcome};
use crate::proxy::UpstreamGate;
use crate::upstream::{UpstreamResponse, UpstreamResult};

pub mod proxy;
pub mod search;

pub use proxy::ProxyClient;
pub use search::{SearchClient, SearchResult, SearchSettings, TagFilter, build_query};

/// Where radius hints come from and where outcomes go
#[async_trait]
pub trait HintSource: Send + Sync {
    async fn radius_hint(&self, lat: f64, lon: f64) -> UpstreamResult<u32>;

    /// Report one terminal outcome; returns the cell's new radius
    async fn report_outcome(
        &self,
        lat: f64,
        lon: f64,
        outcome: &SearchOutcome,
    ) -> UpstreamResult<u32>;
}

/// Executes Overpass QL
#[async_trait]
pub trait QuerySource: Send + Sync {
    async fn run_query(&self, query: &str) -> UpstreamResult<UpstreamResponse>;
}

#[async_trait]
impl HintSource for RadiusHintStore {
    async fn radius_hint(&self, lat: f64, lon: f64) -> UpstreamResult<u32> {
        Ok(self.get_hint(lat, lon))
    }

    async fn report_outcome(
        &self,
        _lat: f64,
        _lon: f64,
        outcome: &SearchOutcome,
    ) -> UpstreamResult<u32> {
        Ok(self.adjust_hint(outcome))
    }
}

#[async_trait]
impl QuerySource for UpstreamGate {
    async fn run_query(&self, query: &str) -> UpstreamResult<UpstreamResponse> {
        self.submit(query).await.map(|gated| gated.response)
    }
}

#[async_trait]
impl HintSource for ProxyClient {
    async fn radius_hint(&self, lat: f64, lon: f64) -> UpstreamResult<u32> {
        self.get_hint(lat, lon).await
    }

    async fn report_outcome(
        &self,
        lat: f64,
        lon: f64,
        outcome: &SearchOutcome,
    ) -> UpstreamResult<u32> {
        self.report(lat, lon, outcome).await
    }
}

#[async_trait]
impl QuerySource for ProxyClient {
    async fn run_query(&self, query: &str) -> UpstreamResult<UpstreamResponse> {
        self.overpass(query, false).await?.ok_or_else(|| {
            UpstreamError::InvalidResponse("Proxy returned no content".to_string())
        })
    }
}
