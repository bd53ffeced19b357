//! Init command implementation

use colored::Colorize;

use geogate::config::Config;
use geogate::error::{ConfigError, Result};

use crate::cli::args::GlobalOptions;

/// Write a default config file. Refuses to overwrite without `--force`.
pub fn run(opts: &GlobalOptions, force: bool) -> Result<()> {
    let path = Config::resolve_path(opts.config_ref())?;

    if path.exists() && !force {
        return Err(ConfigError::Invalid(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        ))
        .into());
    }

    Config::default().save_to(&path)?;

    println!("{}", "✓ Configuration written".green());
    println!("  {}", path.display());
    println!(
        "\nStart the proxy with {} and point clients at {}.",
        "geogate serve".bold(),
        Config::default().search.proxy_url.cyan()
    );
    Ok(())
}
