//! Command execution context
//!
//! Loads configuration once and builds the proxy client that the client-side
//! commands share.

use std::sync::Arc;

use geogate::client::ProxyClient;
use geogate::config::Config;
use geogate::error::Result;
use geogate::output::OutputFormat;

use crate::cli::args::GlobalOptions;

pub struct CommandContext {
    /// Loaded and validated configuration
    pub config: Config,
    /// Client for the running proxy (Arc-wrapped so it can back trait objects)
    pub proxy: Arc<ProxyClient>,
    pub format: OutputFormat,
}

impl CommandContext {
    /// Load config from `--config` (or the default location), apply the
    /// `--proxy-url` override and connect.
    pub fn new(opts: &GlobalOptions) -> Result<Self> {
        let config = load_config(opts)?;
        let proxy = Arc::new(ProxyClient::from_config(&config.search)?);
        log::debug!("Using proxy at {}", proxy.base_url());

        Ok(Self {
            config,
            proxy,
            format: opts.format,
        })
    }
}

/// Config with CLI overrides applied, without connecting anything
pub fn load_config(opts: &GlobalOptions) -> Result<Config> {
    let mut config = Config::load_at(opts.config_ref())?;
    if let Some(url) = opts.proxy_url_ref() {
        config.search.proxy_url = url.to_string();
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_proxy_url_override_wins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "search:\n  proxy_url: http://from-file:1\n").unwrap();

        let opts = GlobalOptions {
            format: OutputFormat::Json,
            config: Some(path.display().to_string()),
            proxy_url: Some("http://override:2/".to_string()),
        };

        let ctx = CommandContext::new(&opts).unwrap();
        assert_eq!(ctx.proxy.base_url(), "http://override:2");
        assert_eq!(ctx.format, OutputFormat::Json);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "opensky:\n  safety_margin: 2.0\n").unwrap();

        let opts = GlobalOptions {
            format: OutputFormat::Pretty,
            config: Some(path.display().to_string()),
            proxy_url: None,
        };

        assert!(load_config(&opts).is_err());
    }
}
