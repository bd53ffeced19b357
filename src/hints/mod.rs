//! Per-cell radius controller
//!
//! Learns a "good" search radius for each ~111 m grid cell from search
//! feedback. Truncated results halve the radius, sparse results grow it,
//! adequate results confirm it. Cells with no history borrow the nearest
//! known hint within the fuzzy range, or fall back to the global default.
//!
//! The only write path is [`RadiusHintStore::adjust_hint`], so a cell's hint
//! is a pure function of the outcomes reported for it.

pub mod grid;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::cache::persist::{self, FlushScheduler};
use crate::config::HintConfig;

pub use grid::{GridKey, planar_distance_m};

/// File name of the hint snapshot inside the cache directory
pub const HINTS_FILE: &str = "radius-hints.json";

const CAPPED_FACTOR: f64 = 0.5;
const ERROR_FACTOR: f64 = 0.7;
const SPARSE_FACTOR: f64 = 1.3;

/// How reported upstream errors feed back into the radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorFeedbackPolicy {
    /// Every error shrinks the radius by 0.7
    Shrink,
    /// Gateway timeouts and rate limits leave the hint untouched; other
    /// errors shrink by 0.7
    #[default]
    SkipInfrastructure,
}

/// Learned radius for one cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RadiusHint {
    pub grid_key: GridKey,
    pub radius_m: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

/// Feedback from one terminal search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub grid_key: GridKey,
    pub result_count: usize,
    pub capped: bool,
    pub errored: bool,
    /// The error was a gateway timeout or rate limit rather than a bad request
    #[serde(default)]
    pub infrastructure_error: bool,
}

impl SearchOutcome {
    pub fn success(lat: f64, lon: f64, result_count: usize, capped: bool) -> Self {
        Self {
            grid_key: GridKey::from_coords(lat, lon),
            result_count,
            capped,
            errored: false,
            infrastructure_error: false,
        }
    }

    pub fn failure(lat: f64, lon: f64, infrastructure_error: bool) -> Self {
        Self {
            grid_key: GridKey::from_coords(lat, lon),
            result_count: 0,
            capped: false,
            errored: true,
            infrastructure_error,
        }
    }
}

/// What an adjustment did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintAction {
    Shrunk,
    Grown,
    Confirmed,
    Skipped,
}

type HintMap = HashMap<GridKey, RadiusHint>;

/// Grid-cell → radius store, persisted like the response cache
pub struct RadiusHintStore {
    hints: Arc<Mutex<HintMap>>,
    config: HintConfig,
    path: Option<PathBuf>,
    flusher: FlushScheduler,
}

impl RadiusHintStore {
    pub fn in_memory(config: HintConfig) -> Self {
        Self::build(config, None, Duration::ZERO)
    }

    /// Store snapshotting to `<dir>/radius-hints.json`
    pub fn open_at(config: HintConfig, dir: &Path, flush_delay: Duration) -> Self {
        Self::build(config, Some(dir.join(HINTS_FILE)), flush_delay)
    }

    fn build(config: HintConfig, path: Option<PathBuf>, flush_delay: Duration) -> Self {
        Self {
            hints: Arc::new(Mutex::new(HashMap::new())),
            config,
            path,
            flusher: FlushScheduler::new(flush_delay),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HintMap> {
        self.hints.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> &HintConfig {
        &self.config
    }

    /// Replace in-memory state with the snapshot on disk. Returns hints loaded.
    ///
    /// Radii outside the configured bounds (e.g. after a config change) are
    /// clamped on load.
    pub fn load(&self) -> usize {
        let Some(ref path) = self.path else {
            return 0;
        };
        let pairs: Vec<(GridKey, RadiusHint)> = persist::load_pairs(path);
        let count = pairs.len();
        let mut hints = self.lock();
        hints.clear();
        for (key, mut hint) in pairs {
            hint.radius_m = self.clamp(hint.radius_m as f64);
            hints.insert(key, hint);
        }
        drop(hints);
        log::info!("Loaded {} radius hints from {}", count, path.display());
        count
    }

    /// Radius to use for a search centred at `(lat, lon)`.
    ///
    /// Exact cell first, then the nearest hint within `fuzzy_range_m`, then
    /// the global default.
    pub fn get_hint(&self, lat: f64, lon: f64) -> u32 {
        current_radius(&self.lock(), &self.config, lat, lon)
    }

    /// Apply search feedback and return the cell's new radius.
    pub fn adjust_hint(&self, outcome: &SearchOutcome) -> u32 {
        self.adjust_hint_at(outcome, Utc::now())
    }

    /// Lookup, decision and write happen under one lock hold, so concurrent
    /// reports for the same cell are applied one after another.
    pub fn adjust_hint_at(&self, outcome: &SearchOutcome, now: DateTime<Utc>) -> u32 {
        let key = outcome.grid_key;
        let mut hints = self.lock();
        let current = current_radius(&hints, &self.config, key.lat(), key.lon());
        let (action, radius) = self.next_radius(current, outcome);

        if action == HintAction::Skipped {
            drop(hints);
            log::debug!(
                "Hint for {} unchanged at {}m (infrastructure error)",
                key,
                current
            );
            return current;
        }

        hints.insert(
            key,
            RadiusHint {
                grid_key: key,
                radius_m: radius,
                updated_at: now,
            },
        );
        drop(hints);
        log::info!(
            "Hint for {}: {}m -> {}m ({:?}, {} results)",
            key,
            current,
            radius,
            action,
            outcome.result_count
        );
        self.schedule_flush();
        radius
    }

    fn next_radius(&self, current: u32, outcome: &SearchOutcome) -> (HintAction, u32) {
        let current_f = current as f64;
        if outcome.capped {
            return (HintAction::Shrunk, self.clamp(current_f * CAPPED_FACTOR));
        }
        if outcome.errored {
            if outcome.infrastructure_error
                && self.config.error_policy == ErrorFeedbackPolicy::SkipInfrastructure
            {
                return (HintAction::Skipped, current);
            }
            return (HintAction::Shrunk, self.clamp(current_f * ERROR_FACTOR));
        }
        if outcome.result_count < self.config.min_useful {
            return (HintAction::Grown, self.clamp(current_f * SPARSE_FACTOR));
        }
        (HintAction::Confirmed, self.clamp(current_f))
    }

    fn clamp(&self, radius: f64) -> u32 {
        let r = radius.round();
        let min = self.config.min_radius_m as f64;
        let max = self.config.max_radius_m as f64;
        r.clamp(min, max) as u32
    }

    /// Exact-cell record, if any
    pub fn hint_for(&self, key: &GridKey) -> Option<RadiusHint> {
        self.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every hint and delete the snapshot. Returns hints removed.
    pub fn clear(&self) -> usize {
        let removed = {
            let mut hints = self.lock();
            let n = hints.len();
            hints.clear();
            n
        };
        self.flusher.cancel();
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
            .flush_now(path, || persist::encode_pairs(&snapshot(&self.hints)))
            .await;
        if let Err(e) = result {
            log::warn!("Hint flush failed: {}", e);
        }
    }

    fn schedule_flush(&self) {
        let Some(ref path) = self.path else {
            return;
        };
        let hints = Arc::clone(&self.hints);
        self.flusher
            .schedule(path.clone(), move || persist::encode_pairs(&snapshot(&hints)));
    }
}

fn current_radius(hints: &HintMap, config: &HintConfig, lat: f64, lon: f64) -> u32 {
    let key = GridKey::from_coords(lat, lon);
    if let Some(hint) = hints.get(&key) {
        return hint.radius_m;
    }

    let nearest = hints
        .values()
        .map(|h| {
            (
                planar_distance_m(lat, lon, h.grid_key.lat(), h.grid_key.lon()),
                h,
            )
        })
        .filter(|(d, _)| *d <= config.fuzzy_range_m)
        .min_by(|a, b| a.0.total_cmp(&b.0));

    match nearest {
        Some((distance, hint)) => {
            log::debug!(
                "Fuzzy hint for {}: {}m from {} ({:.0}m away)",
                key,
                hint.radius_m,
                hint.grid_key,
                distance
            );
            hint.radius_m
        }
        None => config.default_radius_m,
    }
}

fn snapshot(hints: &Mutex<HintMap>) -> Vec<(GridKey, RadiusHint)> {
    let guard = hints.lock().unwrap_or_else(|e| e.into_inner());
    let mut pairs: Vec<_> = guard.iter().map(|(k, v)| (*k, v.clone())).collect();
    pairs.sort_by_key(|(k, _)| *k);
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LAT: f64 = 42.360;
    const LON: f64 = -71.059;

    fn store() -> RadiusHintStore {
        RadiusHintStore::in_memory(HintConfig::default())
    }

    fn store_with_range(range_m: f64) -> RadiusHintStore {
        RadiusHintStore::in_memory(HintConfig {
            fuzzy_range_m: range_m,
            ..HintConfig::default()
        })
    }

    /// Point `meters` due north of (LAT, LON)
    fn north_of(meters: f64) -> (f64, f64) {
        (LAT + meters / 111_194.93, LON)
    }

    fn seed(store: &RadiusHintStore, lat: f64, lon: f64, radius: u32) {
        store.lock().insert(
            GridKey::from_coords(lat, lon),
            RadiusHint {
                grid_key: GridKey::from_coords(lat, lon),
                radius_m: radius,
                updated_at: Utc::now(),
            },
        );
    }

    #[test]
    fn test_unknown_cell_gets_default() {
        assert_eq!(store().get_hint(LAT, LON), 3000);
    }

    #[test]
    fn test_capped_halves() {
        let store = store();
        let r = store.adjust_hint(&SearchOutcome::success(LAT, LON, 520, true));
        assert_eq!(r, 1500);
        assert_eq!(store.get_hint(LAT, LON), 1500);
    }

    #[test]
    fn test_capped_never_increases_and_converges_to_floor() {
        let store = store();
        let mut previous = store.get_hint(LAT, LON);
        for _ in 0..20 {
            let next = store.adjust_hint(&SearchOutcome::success(LAT, LON, 900, true));
            assert!(next <= previous);
            if previous > 100 {
                assert!(next < previous);
            }
            assert!(next >= 100);
            previous = next;
        }
        assert_eq!(previous, 100);
    }

    #[test]
    fn test_capped_wins_over_sparse_signal() {
        let store = store();
        let r = store.adjust_hint(&SearchOutcome::success(LAT, LON, 0, true));
        assert_eq!(r, 1500);
    }

    #[test]
    fn test_sparse_grows_until_ceiling() {
        let store = store();
        assert_eq!(
            store.adjust_hint(&SearchOutcome::success(LAT, LON, 2, false)),
            3900
        );
        for _ in 0..20 {
            store.adjust_hint(&SearchOutcome::success(LAT, LON, 0, false));
        }
        assert_eq!(store.get_hint(LAT, LON), 15_000);
    }

    #[test]
    fn test_confirm_keeps_radius_and_refreshes_timestamp() {
        let store = store();
        let t0 = Utc::now() - chrono::Duration::hours(1);
        store.adjust_hint_at(&SearchOutcome::success(LAT, LON, 600, true), t0);

        let t1 = Utc::now();
        let r = store.adjust_hint_at(&SearchOutcome::success(LAT, LON, 42, false), t1);
        assert_eq!(r, 1500);

        let hint = store.hint_for(&GridKey::from_coords(LAT, LON)).unwrap();
        assert_eq!(hint.radius_m, 1500);
        assert_eq!(hint.updated_at, t1);
    }

    #[test]
    fn test_error_shrinks_under_shrink_policy() {
        let store = RadiusHintStore::in_memory(HintConfig {
            error_policy: ErrorFeedbackPolicy::Shrink,
            ..HintConfig::default()
        });
        assert_eq!(
            store.adjust_hint(&SearchOutcome::failure(LAT, LON, true)),
            2100
        );
    }

    #[test]
    fn test_infrastructure_error_skipped_by_default() {
        let store = store();
        assert_eq!(
            store.adjust_hint(&SearchOutcome::failure(LAT, LON, true)),
            3000
        );
        // No record is created for a skipped outcome
        assert!(store.is_empty());
    }

    #[test]
    fn test_non_infrastructure_error_shrinks_by_default() {
        let store = store();
        assert_eq!(
            store.adjust_hint(&SearchOutcome::failure(LAT, LON, false)),
            2100
        );
    }

    #[test]
    fn test_first_feedback_starts_from_fuzzy_neighbour() {
        let store = store();
        let (lat, lon) = north_of(2_000.0);
        seed(&store, lat, lon, 800);

        assert_eq!(store.get_hint(LAT, LON), 800);
        assert_eq!(
            store.adjust_hint(&SearchOutcome::success(LAT, LON, 700, true)),
            400
        );
        // Neighbour untouched
        assert_eq!(store.get_hint(lat, lon), 800);
    }

    #[test]
    fn test_fuzzy_returns_nearest_within_range() {
        let store = store();
        let (lat_near, lon_near) = north_of(2_000.0);
        let (lat_far, lon_far) = north_of(13_000.0);
        seed(&store, lat_far, lon_far, 5000);
        seed(&store, lat_near, lon_near, 700);

        assert_eq!(store.get_hint(LAT, LON), 700);
    }

    #[test]
    fn test_fuzzy_range_widening_increases_hits() {
        let default = HintConfig::default().default_radius_m;
        let cases = [
            (2_000.0, true),
            (5_000.0, true),
            (13_000.0, true),
            (60_000.0, false),
        ];

        for (distance, hit_at_20km) in cases {
            let (lat, lon) = north_of(distance);

            let wide = store_with_range(20_000.0);
            seed(&wide, lat, lon, 1234);
            let expected = if hit_at_20km { 1234 } else { default };
            assert_eq!(wide.get_hint(LAT, LON), expected, "20km range, {}m", distance);

            let narrow = store_with_range(1_609.0);
            seed(&narrow, lat, lon, 1234);
            assert_eq!(narrow.get_hint(LAT, LON), default, "1mi range, {}m", distance);
        }
    }

    #[test]
    fn test_concurrent_capped_reports_all_apply() {
        use std::sync::Barrier;
        use std::thread;

        // 3000 halved four times: 1500, 750, 375, 188
        for _ in 0..200 {
            let store = Arc::new(store());
            let barrier = Arc::new(Barrier::new(4));
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let store = Arc::clone(&store);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        store.adjust_hint(&SearchOutcome::success(LAT, LON, 520, true));
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
            assert_eq!(store.get_hint(LAT, LON), 188);
        }
    }

    #[test]
    fn test_restart_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = RadiusHintStore::open_at(HintConfig::default(), dir.path(), Duration::ZERO);
        store.adjust_hint(&SearchOutcome::success(LAT, LON, 520, true));
        store.adjust_hint(&SearchOutcome::success(40.7128, -74.006, 1, false));

        let reopened =
            RadiusHintStore::open_at(HintConfig::default(), dir.path(), Duration::ZERO);
        assert_eq!(reopened.load(), 2);
        assert_eq!(reopened.get_hint(LAT, LON), 1500);
        assert_eq!(reopened.get_hint(40.7128, -74.006), 3900);
        assert_eq!(
            reopened.hint_for(&GridKey::from_coords(LAT, LON)),
            store.hint_for(&GridKey::from_coords(LAT, LON))
        );
    }

    #[test]
    fn test_snapshot_shape() {
        let dir = TempDir::new().unwrap();
        let store = RadiusHintStore::open_at(HintConfig::default(), dir.path(), Duration::ZERO);
        store.adjust_hint(&SearchOutcome::success(LAT, LON, 520, true));

        let raw = std::fs::read_to_string(dir.path().join(HINTS_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[0][0], "42.360,-71.059");
        assert_eq!(value[0][1]["gridKey"], "42.360,-71.059");
        assert_eq!(value[0][1]["radiusM"], 1500);
    }

    #[test]
    fn test_load_clamps_out_of_range_radius() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(HINTS_FILE),
            r#"[["1.000,2.000",{"gridKey":"1.000,2.000","radiusM":50000,"updatedAt":0}]]"#,
        )
        .unwrap();

        let store = RadiusHintStore::open_at(HintConfig::default(), dir.path(), Duration::ZERO);
        assert_eq!(store.load(), 1);
        assert_eq!(store.get_hint(1.0, 2.0), 15_000);
    }

    #[test]
    fn test_clear() {
        let dir = TempDir::new().unwrap();
        let store = RadiusHintStore::open_at(HintConfig::default(), dir.path(), Duration::ZERO);
        store.adjust_hint(&SearchOutcome::success(LAT, LON, 520, true));

        assert_eq!(store.clear(), 1);
        assert_eq!(store.get_hint(LAT, LON), 3000);
        assert!(!dir.path().join(HINTS_FILE).exists());
    }
}
