//! TTL cache storage with debounced JSON snapshots
//!
//! Entries are replace-only: a `set` overwrites the whole entry, and the
//! only way an entry leaves the map (short of `clear`) is a read past its TTL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::persist::{self, FlushScheduler};

/// File name of the cache snapshot inside the cache directory
pub const CACHE_FILE: &str = "cache.json";

/// A cached upstream body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Raw upstream bytes, base64 in the snapshot
    #[serde(with = "payload_b64")]
    pub payload: Vec<u8>,

    /// Content-Type the upstream sent
    pub content_type: String,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.stored_at).to_std().unwrap_or(Duration::ZERO)
    }

    fn is_expired_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.age_at(now) > ttl
    }
}

mod payload_b64 {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Result of a non-evicting lookup
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Fresh(CacheEntry),
    /// Past TTL but retained for degraded serving
    Stale(CacheEntry),
    Miss,
}

/// Statistics about cache state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

type EntryMap = HashMap<String, CacheEntry>;

/// In-memory key → entry store with lazy TTL eviction and best-effort persistence
pub struct PersistentCache {
    entries: Arc<Mutex<EntryMap>>,
    /// `None` keeps the cache memory-only
    path: Option<PathBuf>,
    flusher: FlushScheduler,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PersistentCache {
    /// Cache without a backing file
    pub fn in_memory() -> Self {
        Self::build(None, Duration::ZERO)
    }

    /// Cache snapshotting to `<dir>/cache.json`. Call [`load`](Self::load) to
    /// read any previous snapshot.
    pub fn open_at(dir: &Path, flush_delay: Duration) -> Self {
        Self::build(Some(dir.join(CACHE_FILE)), flush_delay)
    }

    fn build(path: Option<PathBuf>, flush_delay: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            path,
            flusher: FlushScheduler::new(flush_delay),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EntryMap> {
        // A panic elsewhere never leaves the map half-written
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace in-memory state with the snapshot on disk. Returns entries loaded.
    pub fn load(&self) -> usize {
        let Some(ref path) = self.path else {
            return 0;
        };
        let pairs: Vec<(String, CacheEntry)> = persist::load_pairs(path);
        let count = pairs.len();
        *self.lock() = pairs.into_iter().collect();
        log::info!("Loaded {} cache entries from {}", count, path.display());
        count
    }

    /// Get an entry younger than `ttl`; an expired entry is evicted and reported as a miss.
    pub fn get(&self, key: &str, ttl: Duration) -> Option<CacheEntry> {
        self.get_at(key, ttl, Utc::now())
    }

    pub fn get_at(&self, key: &str, ttl: Duration, now: DateTime<Utc>) -> Option<CacheEntry> {
        let found = self.get_inner(key, ttl, now);
        self.record(found.is_some());
        found
    }

    /// Same eviction rule as [`get`](Self::get) without touching hit/miss counters.
    pub fn recheck(&self, key: &str, ttl: Duration) -> Option<CacheEntry> {
        self.get_inner(key, ttl, Utc::now())
    }

    fn get_inner(&self, key: &str, ttl: Duration, now: DateTime<Utc>) -> Option<CacheEntry> {
        let mut entries = self.lock();
        let expired = match entries.get(key) {
            None => return None,
            Some(entry) => entry.is_expired_at(ttl, now),
        };
        if expired {
            entries.remove(key);
            drop(entries);
            log::debug!("Evicted expired cache entry {}", key);
            self.schedule_flush();
            return None;
        }
        entries.get(key).cloned()
    }

    /// Classify an entry without evicting it, so expired data stays available
    /// as a fallback.
    pub fn lookup(&self, key: &str, ttl: Duration) -> CacheLookup {
        self.lookup_at(key, ttl, Utc::now())
    }

    pub fn lookup_at(&self, key: &str, ttl: Duration, now: DateTime<Utc>) -> CacheLookup {
        let result = match self.lock().get(key) {
            None => CacheLookup::Miss,
            Some(entry) if entry.is_expired_at(ttl, now) => CacheLookup::Stale(entry.clone()),
            Some(entry) => CacheLookup::Fresh(entry.clone()),
        };
        self.record(matches!(result, CacheLookup::Fresh(_)));
        result
    }

    /// Store unconditionally (last write wins) and schedule a flush.
    pub fn set(&self, key: &str, payload: Vec<u8>, content_type: &str) -> CacheEntry {
        self.set_at(key, payload, content_type, Utc::now())
    }

    pub fn set_at(
        &self,
        key: &str,
        payload: Vec<u8>,
        content_type: &str,
        now: DateTime<Utc>,
    ) -> CacheEntry {
        let entry = CacheEntry {
            payload,
            content_type: content_type.to_string(),
            stored_at: now,
        };
        self.lock().insert(key.to_string(), entry.clone());
        self.schedule_flush();
        entry
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Drop every entry, reset counters and delete the snapshot. Returns entries removed.
    pub fn clear(&self) -> usize {
        let removed = {
            let mut entries = self.lock();
            let n = entries.len();
            entries.clear();
            n
        };
        self.flusher.cancel();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        if let Some(ref path) = self.path {
            persist::remove_snapshot(path);
        }
        removed
    }

    /// Write the snapshot immediately (used on shutdown)
    pub async fn flush_now(&self) {
        let Some(ref path) = self.path else {
            return;
        };
        let result = self
            .flusher
            .flush_now(path, || persist::encode_pairs(&snapshot(&self.entries)))
            .await;
        if let Err(e) = result {
            log::warn!("Cache flush failed: {}", e);
        }
    }

    /// Number of snapshot writes so far
    pub fn flush_count(&self) -> u64 {
        self.flusher.writes()
    }

    fn schedule_flush(&self) {
        let Some(ref path) = self.path else {
            return;
        };
        let entries = Arc::clone(&self.entries);
        self.flusher
            .schedule(path.clone(), move || persist::encode_pairs(&snapshot(&entries)));
    }

    fn record(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn snapshot(entries: &Mutex<EntryMap>) -> Vec<(String, CacheEntry)> {
    let guard = entries.lock().unwrap_or_else(|e| e.into_inner());
    let mut pairs: Vec<_> = guard.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    pairs
}
