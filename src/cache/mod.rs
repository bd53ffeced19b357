//! Local cache for upstream responses
//!
//! Provides an in-memory TTL cache with debounced JSON snapshots on disk.
//! Entries survive restarts on a best-effort basis: a crash between a
//! mutation and the next flush loses that mutation.

pub mod key;
pub mod persist;
pub mod storage;

use std::time::Duration;

/// Default TTLs per upstream, overridable in `CacheConfig`.
pub struct CacheTtl;

impl CacheTtl {
    // POI data changes slowly
    pub const OVERPASS: Duration = Duration::from_secs(24 * 60 * 60); // 24 hr

    // Aircraft positions go stale within seconds
    pub const AIRCRAFT: Duration = Duration::from_secs(15); // 15 sec
}

// Re-export main types
pub use key::{aircraft_bbox_key, aircraft_icao_key, overpass_cache_key};
pub use persist::FlushScheduler;
pub use storage::{CacheEntry, CacheLookup, CacheStats, PersistentCache};
