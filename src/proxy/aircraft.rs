//! Quota-governed aircraft lookups with stale fallback

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheEntry, CacheLookup, PersistentCache};
use crate::error::UpstreamError;
use crate::upstream::{AircraftQuery, OpenSkyApi, UpstreamResult};

use super::quota::{Admission, QuotaLimiter};

/// What the aircraft endpoint hands back
#[derive(Debug, Clone, PartialEq)]
pub enum AircraftReply {
    /// Served from cache within TTL, no quota spent
    Fresh(CacheEntry),
    /// Fetched from the feed just now
    Live(CacheEntry),
    /// Throttled; an expired entry is served instead
    Stale(CacheEntry),
    /// Throttled with nothing cached
    TryLater(Duration),
}

/// Front door for the OpenSky feed
pub struct AircraftService {
    upstream: Arc<dyn OpenSkyApi>,
    cache: Arc<PersistentCache>,
    limiter: Arc<QuotaLimiter>,
    ttl: Duration,
}

impl AircraftService {
    pub fn new(
        upstream: Arc<dyn OpenSkyApi>,
        cache: Arc<PersistentCache>,
        limiter: Arc<QuotaLimiter>,
        ttl: Duration,
    ) -> Self {
        Self {
            upstream,
            cache,
            limiter,
            ttl,
        }
    }

    pub fn limiter(&self) -> &QuotaLimiter {
        &self.limiter
    }

    /// Resolve a query, degrading to stale data whenever the limiter says no.
    ///
    /// Only non-rate-limit upstream failures surface as errors.
    pub async fn fetch(&self, query: &AircraftQuery) -> UpstreamResult<AircraftReply> {
        let key = query.cache_key();
        let stale = match self.cache.lookup(&key, self.ttl) {
            CacheLookup::Fresh(entry) => return Ok(AircraftReply::Fresh(entry)),
            CacheLookup::Stale(entry) => Some(entry),
            CacheLookup::Miss => None,
        };

        if let Admission::Throttled {
            reason,
            retry_after,
        } = self.limiter.try_acquire()
        {
            log::debug!("OpenSky throttled ({:?}) for {}", reason, key);
            return Ok(degrade(stale, retry_after));
        }

        match self.upstream.states(query).await {
            Ok(response) => {
                self.limiter.record_success();
                let entry = self
                    .cache
                    .set(&key, response.body, &response.content_type);
                Ok(AircraftReply::Live(entry))
            }
            Err(UpstreamError::RateLimited(server_hint)) => {
                let wait = self.limiter.record_rate_limited();
                Ok(degrade(stale, wait.max(server_hint)))
            }
            Err(e) => Err(e),
        }
    }
}

fn degrade(stale: Option<CacheEntry>, retry_after: Duration) -> AircraftReply {
    match stale {
        Some(entry) => AircraftReply::Stale(entry),
        None => AircraftReply::TryLater(retry_after),
    }
}
