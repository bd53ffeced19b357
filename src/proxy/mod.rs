//! Rate governance in front of the upstreams
//!
//! - [`UpstreamGate`] serializes every Overpass request through one FIFO
//!   queue with a minimum dispatch interval.
//! - [`QuotaLimiter`] spreads the OpenSky daily allowance and backs off on 429.
//! - [`AircraftService`] combines the limiter with stale-cache degradation.

pub mod aircraft;
pub mod gate;
pub mod quota;

pub use aircraft::{AircraftReply, AircraftService};
pub use gate::{GateResponse, GateSettings, ResponseSource, UpstreamGate};
pub use quota::{Admission, QuotaLimiter, QuotaSnapshot, ThrottleReason};
