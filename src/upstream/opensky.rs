//! OpenSky Network state-vector client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;

use super::{OpenSkyApi, UpstreamResponse, UpstreamResult, error_for_status, read_body};
use crate::cache::{aircraft_bbox_key, aircraft_icao_key};
use crate::config::OpenSkyConfig;
use crate::error::UpstreamError;

/// What the caller wants to see
#[derive(Debug, Clone, PartialEq)]
pub enum AircraftQuery {
    BoundingBox {
        south: f64,
        west: f64,
        north: f64,
        east: f64,
    },
    /// Single transponder, lowercase hex
    Icao24(String),
}

impl AircraftQuery {
    /// Parse `s,w,n,e`
    pub fn parse_bbox(raw: &str) -> Result<Self, String> {
        let parts: Vec<f64> = raw
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|e| format!("bbox '{}' is not four numbers: {}", raw, e))?;
        let [south, west, north, east] = parts[..] else {
            return Err(format!("bbox '{}' must be s,w,n,e", raw));
        };
        if !(-90.0..=90.0).contains(&south) || !(-90.0..=90.0).contains(&north) {
            return Err(format!("bbox '{}' latitude out of range", raw));
        }
        if south > north {
            return Err(format!("bbox '{}' has south above north", raw));
        }
        Ok(Self::BoundingBox {
            south,
            west,
            north,
            east,
        })
    }

    /// Validate a 24-bit ICAO address in hex
    pub fn parse_icao24(raw: &str) -> Result<Self, String> {
        let hex = raw.trim().to_ascii_lowercase();
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("icao24 '{}' must be 6 hex digits", raw));
        }
        Ok(Self::Icao24(hex))
    }

    pub fn cache_key(&self) -> String {
        match self {
            Self::BoundingBox {
                south,
                west,
                north,
                east,
            } => aircraft_bbox_key(*south, *west, *north, *east),
            Self::Icao24(hex) => aircraft_icao_key(hex),
        }
    }

    fn query_params(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::BoundingBox {
                south,
                west,
                north,
                east,
            } => vec![
                ("lamin", south.to_string()),
                ("lomin", west.to_string()),
                ("lamax", north.to_string()),
                ("lomax", east.to_string()),
            ],
            Self::Icao24(hex) => vec![("icao24", hex.clone())],
        }
    }
}

/// HTTP client for `/states/all`
pub struct OpenSkyClient {
    http: HttpClient,
    base_url: String,
    credentials: Option<(String, String)>,
}

impl OpenSkyClient {
    pub fn new(config: &OpenSkyConfig) -> UpstreamResult<Self> {
        let mut client =
            Self::with_url(&config.url, Duration::from_secs(config.timeout_secs))?;
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            client.credentials = Some((user.clone(), pass.clone()));
        }
        Ok(client)
    }

    pub fn with_url(base_url: &str, timeout: Duration) -> UpstreamResult<Self> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("geogate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials: None,
        })
    }
}

#[async_trait]
impl OpenSkyApi for OpenSkyClient {
    async fn states(&self, query: &AircraftQuery) -> UpstreamResult<UpstreamResponse> {
        let url = format!("{}/states/all", self.base_url);
        let mut request = self.http.get(&url).query(&query.query_params());
        if let Some((ref user, ref pass)) = self.credentials {
            request = request.basic_auth(user, Some(pass));
        }

        let response = request.send().await.map_err(UpstreamError::from)?;
        if !response.status().is_success() {
            let err = error_for_status(response).await;
            log::warn!("OpenSky request failed: {}", err);
            return Err(err);
        }

        read_body(response, "application/json").await
    }
}
