//! Proxy HTTP server
//!
//! | Route               | Handler |
//! |---------------------|---------|
//! | `GET /health`       | liveness |
//! | `GET /radius-hint`  | current hint for a point |
//! | `POST /radius-hint` | apply search feedback |
//! | `POST /overpass`    | cached, gated Overpass passthrough |
//! | `GET /aircraft`     | quota-governed OpenSky passthrough |
//! | `GET /cache/stats`  | counters |
//! | `POST /cache/clear` | drop all cached state |

mod error;
mod handlers;

pub use error::{ApiError, ApiResult};

use axum::Router;
use axum::routing::{get, post};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::PersistentCache;
use crate::config::Config;
use crate::error::Result;
use crate::hints::RadiusHintStore;
use crate::proxy::{AircraftService, GateSettings, QuotaLimiter, UpstreamGate};
use crate::upstream::{
    ElementDedup, OpenSkyApi, OpenSkyClient, OverpassApi, OverpassClient, ResponseSink,
};

/// Everything the handlers share
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<PersistentCache>,
    pub hints: Arc<RadiusHintStore>,
    pub gate: UpstreamGate,
    pub aircraft: Arc<AircraftService>,
    pub dedup: Arc<ElementDedup>,
    pub overpass_ttl: Duration,
}

impl AppState {
    /// Wire stores and upstreams together. Spawns the gate worker, so this
    /// must run inside a tokio runtime.
    pub fn new(
        config: &Config,
        cache: Arc<PersistentCache>,
        hints: Arc<RadiusHintStore>,
        overpass: Arc<dyn OverpassApi>,
        opensky: Arc<dyn OpenSkyApi>,
    ) -> Self {
        let dedup = Arc::new(ElementDedup::new());
        let gate = UpstreamGate::spawn(
            overpass,
            Arc::clone(&cache),
            Some(Arc::clone(&dedup) as Arc<dyn ResponseSink>),
            GateSettings {
                min_interval: config.overpass.min_interval(),
                ttl: config.cache.overpass_ttl(),
            },
        );
        let aircraft = Arc::new(AircraftService::new(
            opensky,
            Arc::clone(&cache),
            Arc::new(QuotaLimiter::from_config(&config.opensky)),
            config.cache.aircraft_ttl(),
        ));

        Self {
            cache,
            hints,
            gate,
            aircraft,
            dedup,
            overpass_ttl: config.cache.overpass_ttl(),
        }
    }

    /// Open persisted stores under the configured cache directory and connect
    /// the real upstream clients.
    pub fn from_config(config: &Config) -> Result<Self> {
        let dir = config.cache.resolve_dir()?;
        let delay = config.cache.flush_delay();

        let cache = Arc::new(PersistentCache::open_at(&dir, delay));
        cache.load();
        let hints = Arc::new(RadiusHintStore::open_at(config.hints.clone(), &dir, delay));
        hints.load();

        let overpass = Arc::new(OverpassClient::new(&config.overpass)?);
        let opensky = Arc::new(OpenSkyClient::new(&config.opensky)?);

        Ok(Self::new(config, cache, hints, overpass, opensky))
    }

    /// Persist both stores immediately
    pub async fn flush(&self) {
        self.cache.flush_now().await;
        self.hints.flush_now().await;
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/radius-hint",
            get(handlers::get_radius_hint).post(handlers::post_radius_hint),
        )
        .route("/overpass", post(handlers::overpass))
        .route("/aircraft", get(handlers::aircraft))
        .route("/cache/stats", get(handlers::cache_stats))
        .route("/cache/clear", post(handlers::cache_clear))
        .with_state(state)
}

/// Serve until `shutdown` resolves, then flush both stores.
pub async fn serve<F>(addr: SocketAddr, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown)
        .await?;

    log::info!("Shutting down, flushing cache and hints");
    state.flush().await;
    Ok(())
}
