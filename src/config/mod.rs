//! Configuration management for Geogate

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::CacheTtl;
use crate::error::{CacheError, ConfigError, Result};
use crate::hints::ErrorFeedbackPolicy;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub hints: HintConfig,

    #[serde(default)]
    pub overpass: OverpassConfig,

    #[serde(default)]
    pub opensky: OpenSkyConfig,

    #[serde(default)]
    pub search: SearchConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address the proxy binds to
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Response cache and snapshot settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding cache.json and radius-hints.json
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    #[serde(default = "default_overpass_ttl")]
    pub overpass_ttl_secs: u64,

    #[serde(default = "default_aircraft_ttl")]
    pub aircraft_ttl_secs: u64,

    /// Debounce delay between the first dirty mutation and the disk write
    #[serde(default = "default_flush_delay")]
    pub flush_delay_ms: u64,
}

fn default_overpass_ttl() -> u64 {
    CacheTtl::OVERPASS.as_secs()
}

fn default_aircraft_ttl() -> u64 {
    CacheTtl::AIRCRAFT.as_secs()
}

fn default_flush_delay() -> u64 {
    2000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            overpass_ttl_secs: default_overpass_ttl(),
            aircraft_ttl_secs: default_aircraft_ttl(),
            flush_delay_ms: default_flush_delay(),
        }
    }
}

impl CacheConfig {
    /// Resolve the snapshot directory (~/.cache/geogate unless overridden)
    pub fn resolve_dir(&self) -> std::result::Result<PathBuf, CacheError> {
        if let Some(ref dir) = self.dir {
            return Ok(dir.clone());
        }
        let base = dirs::cache_dir().ok_or(CacheError::NoCacheDir)?;
        Ok(base.join("geogate"))
    }

    pub fn overpass_ttl(&self) -> Duration {
        Duration::from_secs(self.overpass_ttl_secs)
    }

    pub fn aircraft_ttl(&self) -> Duration {
        Duration::from_secs(self.aircraft_ttl_secs)
    }

    pub fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.flush_delay_ms)
    }
}

/// Radius controller tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HintConfig {
    #[serde(default = "default_radius")]
    pub default_radius_m: u32,

    #[serde(default = "default_min_radius")]
    pub min_radius_m: u32,

    #[serde(default = "default_max_radius")]
    pub max_radius_m: u32,

    /// Maximum distance at which a neighbouring cell's hint is borrowed
    #[serde(default = "default_fuzzy_range")]
    pub fuzzy_range_m: f64,

    /// Results below this count make the cell grow its radius
    #[serde(default = "default_min_useful")]
    pub min_useful: usize,

    #[serde(default)]
    pub error_policy: ErrorFeedbackPolicy,
}

fn default_radius() -> u32 {
    3000
}

fn default_min_radius() -> u32 {
    100
}

fn default_max_radius() -> u32 {
    15_000
}

fn default_fuzzy_range() -> f64 {
    20_000.0
}

fn default_min_useful() -> usize {
    5
}

impl Default for HintConfig {
    fn default() -> Self {
        Self {
            default_radius_m: default_radius(),
            min_radius_m: default_min_radius(),
            max_radius_m: default_max_radius(),
            fuzzy_range_m: default_fuzzy_range(),
            min_useful: default_min_useful(),
            error_policy: ErrorFeedbackPolicy::default(),
        }
    }
}

/// Overpass (POI query) upstream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverpassConfig {
    #[serde(default = "default_overpass_url")]
    pub url: String,

    /// Minimum spacing between two upstream dispatches
    #[serde(default = "default_min_interval")]
    pub min_interval_ms: u64,

    #[serde(default = "default_overpass_timeout")]
    pub timeout_secs: u64,
}

fn default_overpass_url() -> String {
    "https://overpass-api.de/api/interpreter".to_string()
}

fn default_min_interval() -> u64 {
    10_000
}

fn default_overpass_timeout() -> u64 {
    60
}

impl Default for OverpassConfig {
    fn default() -> Self {
        Self {
            url: default_overpass_url(),
            min_interval_ms: default_min_interval(),
            timeout_secs: default_overpass_timeout(),
        }
    }
}

impl OverpassConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

/// OpenSky (aircraft telemetry) upstream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenSkyConfig {
    #[serde(default = "default_opensky_url")]
    pub url: String,

    #[serde(default = "default_daily_quota")]
    pub daily_quota: u32,

    /// Fraction of the daily quota the limiter allows itself to spend
    #[serde(default = "default_safety_margin")]
    pub safety_margin: f64,

    #[serde(default = "default_opensky_timeout")]
    pub timeout_secs: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

fn default_opensky_url() -> String {
    "https://opensky-network.org/api".to_string()
}

fn default_daily_quota() -> u32 {
    4000
}

fn default_safety_margin() -> f64 {
    0.9
}

fn default_opensky_timeout() -> u64 {
    15
}

impl Default for OpenSkyConfig {
    fn default() -> Self {
        Self {
            url: default_opensky_url(),
            daily_quota: default_daily_quota(),
            safety_margin: default_safety_margin(),
            timeout_secs: default_opensky_timeout(),
            username: None,
            password: None,
        }
    }
}

/// Client-side search loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_proxy_url")]
    pub proxy_url: String,

    /// Raw element count at which the upstream is assumed to have truncated
    #[serde(default = "default_cap_threshold")]
    pub cap_threshold: usize,

    #[serde(default = "default_radius_floor")]
    pub radius_floor_m: u32,

    /// Politeness limit for requests sent to the proxy
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

fn default_proxy_url() -> String {
    "http://127.0.0.1:8787".to_string()
}

fn default_cap_threshold() -> usize {
    500
}

fn default_radius_floor() -> u32 {
    100
}

fn default_requests_per_second() -> u32 {
    4
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            proxy_url: default_proxy_url(),
            cap_threshold: default_cap_threshold(),
            radius_floor_m: default_radius_floor(),
            requests_per_second: default_requests_per_second(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::Invalid(
            "Could not determine home directory".to_string(),
        ))?;

        Ok(home.join(".geogate").join("config.yaml"))
    }

    /// Resolve an explicit path or fall back to the default location
    pub fn resolve_path(path: Option<&str>) -> Result<PathBuf> {
        match path {
            Some(p) => Ok(PathBuf::from(p)),
            None => Self::default_path(),
        }
    }

    /// Load configuration, falling back to defaults when no file exists.
    ///
    /// Environment overrides are applied last and the result is validated.
    pub fn load_at(path: Option<&str>) -> Result<Self> {
        let path = Self::resolve_path(path)?;
        let mut config = match Self::load_from(&path) {
            Ok(config) => config,
            Err(crate::error::Error::Config(ConfigError::NotFound)) => {
                log::debug!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => return Err(e),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound.into());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents).map_err(ConfigError::from)?;

        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents =
            serde_yaml::to_string(self).map_err(|e| ConfigError::SaveError(e.to_string()))?;

        std::fs::write(path, contents)?;

        // Credentials may be stored here
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(path, perms)?;
        }

        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(bind) = std::env::var("GEOGATE_BIND") {
            self.server.bind = bind;
        }
        if let Ok(dir) = std::env::var("GEOGATE_CACHE_DIR") {
            self.cache.dir = Some(PathBuf::from(dir));
        }
        if let Ok(url) = std::env::var("GEOGATE_PROXY_URL") {
            self.search.proxy_url = url;
        }
    }

    /// Check cross-field invariants
    pub fn validate(&self) -> Result<()> {
        let h = &self.hints;
        if h.min_radius_m == 0 || h.min_radius_m > h.max_radius_m {
            return Err(ConfigError::Invalid(format!(
                "hints.min_radius_m ({}) must be positive and <= max_radius_m ({})",
                h.min_radius_m, h.max_radius_m
            ))
            .into());
        }
        if h.default_radius_m < h.min_radius_m || h.default_radius_m > h.max_radius_m {
            return Err(ConfigError::Invalid(format!(
                "hints.default_radius_m ({}) must lie within [{}, {}]",
                h.default_radius_m, h.min_radius_m, h.max_radius_m
            ))
            .into());
        }
        if !(self.opensky.safety_margin > 0.0 && self.opensky.safety_margin <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "opensky.safety_margin ({}) must be in (0, 1]",
                self.opensky.safety_margin
            ))
            .into());
        }
        if self.opensky.daily_quota == 0 {
            return Err(
                ConfigError::Invalid("opensky.daily_quota must be positive".to_string()).into(),
            );
        }
        if self.search.requests_per_second == 0 {
            return Err(ConfigError::Invalid(
                "search.requests_per_second must be positive".to_string(),
            )
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.hints.default_radius_m, 3000);
        assert_eq!(config.hints.min_radius_m, 100);
        assert_eq!(config.hints.max_radius_m, 15_000);
        assert_eq!(config.search.cap_threshold, 500);
        assert_eq!(config.overpass.min_interval(), Duration::from_secs(10));
        assert_eq!(config.cache.flush_delay(), Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "hints:\n  fuzzy_range_m: 1609.0\nopensky:\n  daily_quota: 400\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.hints.fuzzy_range_m, 1609.0);
        assert_eq!(config.hints.default_radius_m, 3000);
        assert_eq!(config.opensky.daily_quota, 400);
        assert_eq!(config.opensky.safety_margin, 0.9);
        assert_eq!(config.server.bind, "127.0.0.1:8787");
    }

    #[test]
    fn test_error_policy_parses_kebab_case() {
        let yaml = "hints:\n  error_policy: shrink\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.hints.error_policy, ErrorFeedbackPolicy::Shrink);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let mut config = Config::default();
        config.server.bind = "0.0.0.0:9000".to_string();
        config.hints.min_useful = 8;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.server.bind, "0.0.0.0:9000");
        assert_eq!(loaded.hints.min_useful, 8);
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let result = Config::load_from(&dir.path().join("absent.yaml"));
        assert!(matches!(
            result,
            Err(crate::error::Error::Config(ConfigError::NotFound))
        ));
    }

    #[test]
    fn test_validate_rejects_default_outside_bounds() {
        let mut config = Config::default();
        config.hints.default_radius_m = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_safety_margin() {
        let mut config = Config::default();
        config.opensky.safety_margin = 1.5;
        assert!(config.validate().is_err());

        config.opensky.safety_margin = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_cache_dir_wins() {
        let mut cache = CacheConfig::default();
        cache.dir = Some(PathBuf::from("/tmp/geogate-test"));
        assert_eq!(
            cache.resolve_dir().unwrap(),
            PathBuf::from("/tmp/geogate-test")
        );
    }
}
