//! Geogate: adaptive caching and rate-governance proxy for geospatial APIs
//!
//! The proxy sits between a constrained client and upstreams that truncate,
//! time out, or enforce hard daily quotas:
//!
//! - [`cache::PersistentCache`] keeps upstream bodies under a TTL with
//!   debounced JSON snapshots.
//! - [`hints::RadiusHintStore`] learns a search radius per ~111 m grid cell.
//! - [`proxy::UpstreamGate`] serializes Overpass requests behind one FIFO
//!   queue and a minimum interval.
//! - [`proxy::QuotaLimiter`] spreads the OpenSky daily allowance and degrades
//!   to stale data under throttle.
//! - [`client::SearchClient`] closes the loop: query, detect truncation,
//!   shrink in place, report the outcome.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod hints;
pub mod output;
pub mod protocol;
pub mod proxy;
pub mod server;
pub mod upstream;

pub use error::{Error, Result};
