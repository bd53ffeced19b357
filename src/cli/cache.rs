//! Cache management commands

use colored::Colorize;
use dialoguer::Confirm;

use geogate::error::Result;
use geogate::output::formatters::format_percent;
use geogate::output::{OutputFormat, format_json_from, format_key_values};

use crate::cli::args::GlobalOptions;
use crate::cli::context::{CommandContext, load_config};

/// Show proxy counters
pub async fn stats(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let stats = ctx.proxy.stats().await?;

    match ctx.format {
        OutputFormat::Json => println!("{}", format_json_from(&stats, ctx.proxy.base_url())?),
        _ => {
            let quota = &stats.opensky;
            println!(
                "{}",
                format_key_values(&[
                    ("Proxy", ctx.proxy.base_url().to_string()),
                    ("Entries", stats.entries.to_string()),
                    ("Radius hints", stats.radius_hints.to_string()),
                    ("Hits", stats.hits.to_string()),
                    ("Misses", stats.misses.to_string()),
                    ("Hit rate", format_percent(stats.hit_rate)),
                    ("Queue depth", stats.queue_depth.to_string()),
                    ("Unique elements", stats.unique_elements.to_string()),
                    ("OpenSky (24h)", quota.requests_last_24h.to_string()),
                    ("OpenSky remaining", quota.remaining.to_string()),
                    ("OpenSky backoff", quota.backoff_level.to_string()),
                ])
            );
        }
    }

    Ok(())
}

/// Clear cached responses and radius hints on the proxy
pub async fn clear(opts: &GlobalOptions, yes: bool) -> Result<()> {
    let ctx = CommandContext::new(opts)?;

    if !yes {
        eprintln!(
            "{} Clear every cached response and learned radius hint on {}?",
            "⚠".yellow(),
            ctx.proxy.base_url()
        );

        let confirm = Confirm::new()
            .with_prompt("Confirm clear?")
            .default(false)
            .interact()?;

        if !confirm {
            eprintln!("Cancelled.");
            return Ok(());
        }
    }

    let cleared = ctx.proxy.clear().await?;

    match ctx.format {
        OutputFormat::Json => println!("{}", format_json_from(&cleared, ctx.proxy.base_url())?),
        _ => {
            if cleared.entries + cleared.radius_hints + cleared.unique_elements == 0 {
                println!("Cache was already empty");
            } else {
                println!(
                    "{} Cleared {} entries and {} radius hints",
                    "✓".green(),
                    cleared.entries,
                    cleared.radius_hints
                );
            }
        }
    }

    Ok(())
}

/// Print the snapshot directory from local config
pub fn path(opts: &GlobalOptions) -> Result<()> {
    let config = load_config(opts)?;
    let dir = config.cache.resolve_dir()?;
    println!("{}", dir.display());
    Ok(())
}
