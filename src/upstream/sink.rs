//! Downstream consumers of fresh upstream bodies

use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Mutex;

/// Receives every successful, freshly fetched Overpass body
pub trait ResponseSink: Send + Sync {
    fn accept(&self, cache_key: Option<&str>, body: &[u8]);
}

#[derive(Deserialize)]
struct ElementsBody {
    #[serde(default)]
    elements: Vec<ElementRef>,
}

#[derive(Deserialize)]
struct ElementRef {
    #[serde(rename = "type")]
    kind: String,
    id: u64,
}

/// Upper bound on tracked elements (a few tens of MB)
pub const MAX_TRACKED_ELEMENTS: usize = 1_000_000;

/// Tracks unique OSM elements seen across all responses.
///
/// Overlapping searches return the same nodes many times; this counts each
/// `(type, id)` once. The set lives until `/cache/clear` and holds at most
/// `limit` elements; past that, new elements are not tracked and the count
/// is a lower bound.
pub struct ElementDedup {
    seen: Mutex<HashSet<(String, u64)>>,
    limit: usize,
}

impl Default for ElementDedup {
    fn default() -> Self {
        Self::with_limit(MAX_TRACKED_ELEMENTS)
    }
}

impl ElementDedup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            seen: Mutex::new(HashSet::new()),
            limit,
        }
    }

    pub fn unique_elements(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn clear(&self) -> usize {
        match self.seen.lock() {
            Ok(mut seen) => {
                let n = seen.len();
                seen.clear();
                n
            }
            Err(_) => 0,
        }
    }
}

impl ResponseSink for ElementDedup {
    fn accept(&self, cache_key: Option<&str>, body: &[u8]) {
        let parsed: ElementsBody = match serde_json::from_slice(body) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::debug!(
                    "Skipping element dedup for {}: {}",
                    cache_key.unwrap_or("<uncached>"),
                    e
                );
                return;
            }
        };
        let Ok(mut seen) = self.seen.lock() else {
            return;
        };
        let before = seen.len();
        for element in parsed.elements {
            if seen.len() >= self.limit {
                log::warn!(
                    "Element dedup full at {} elements; further elements are not tracked",
                    self.limit
                );
                break;
            }
            seen.insert((element.kind, element.id));
        }
        log::debug!("Element dedup: {} new, {} total", seen.len() - before, seen.len());
    }
}
