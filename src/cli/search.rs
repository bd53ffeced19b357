//! Search command: the retry-to-fit loop against a running proxy

use std::sync::Arc;
use std::time::{Duration, Instant};

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tabled::Tabled;
use tokio_util::sync::CancellationToken;

use geogate::client::{HintSource, QuerySource, SearchClient, SearchResult, SearchSettings};
use geogate::error::Result;
use geogate::output::formatters::{format_duration, format_radius, format_size};
use geogate::output::{self, OutputFormat};

use crate::cli::SearchArgs;
use crate::cli::args::GlobalOptions;
use crate::cli::context::CommandContext;

#[derive(Debug, Serialize, Tabled)]
#[serde(rename_all = "camelCase")]
struct SearchRow {
    #[tabled(rename = "LAT")]
    lat: f64,
    #[tabled(rename = "LON")]
    lon: f64,
    #[tabled(rename = "START (m)")]
    initial_radius_m: u32,
    #[tabled(rename = "FINAL (m)")]
    radius_m: u32,
    #[tabled(rename = "ATTEMPTS")]
    attempts: u32,
    #[tabled(rename = "RESULTS")]
    result_count: usize,
    #[tabled(rename = "CAPPED")]
    capped: bool,
    #[tabled(rename = "NEXT HINT", display = "display_hint")]
    hint_after: Option<u32>,
}

fn display_hint(hint: &Option<u32>) -> String {
    hint.map(|h| h.to_string()).unwrap_or_else(|| "-".to_string())
}

impl From<&SearchResult> for SearchRow {
    fn from(r: &SearchResult) -> Self {
        Self {
            lat: r.lat,
            lon: r.lon,
            initial_radius_m: r.initial_radius_m,
            radius_m: r.radius_m,
            attempts: r.attempts,
            result_count: r.result_count,
            capped: r.capped,
            hint_after: r.hint_after,
        }
    }
}

pub async fn run(opts: &GlobalOptions, args: &SearchArgs) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let hints: Arc<dyn HintSource> = ctx.proxy.clone();
    let queries: Arc<dyn QuerySource> = ctx.proxy.clone();
    let client = SearchClient::new(hints, queries, SearchSettings::from(&ctx.config.search));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let spinner = (ctx.format == OutputFormat::Pretty).then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("Searching around {},{}", args.lat, args.lon));
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    let started = Instant::now();
    let result = client
        .search_with_cancel(args.lat, args.lon, &args.tags, &cancel)
        .await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let result = result?;

    if let Some(ref path) = args.save {
        std::fs::write(path, &result.body)?;
        log::info!("Saved {} to {}", format_size(result.body.len()), path);
    }

    match ctx.format {
        OutputFormat::Pretty => print_pretty(&result, started.elapsed()),
        format => println!("{}", output::render(&[SearchRow::from(&result)], format)?),
    }
    Ok(())
}

fn print_pretty(result: &SearchResult, elapsed: Duration) {
    let status = if result.capped {
        "⚠ still truncated at the radius floor".yellow()
    } else {
        "✓".green()
    };
    println!(
        "{} {} results within {} of {},{}",
        status,
        result.result_count.to_string().bold(),
        format_radius(result.radius_m),
        result.lat,
        result.lon
    );

    let attempts = if result.attempts == 1 {
        "1 attempt".to_string()
    } else {
        format!(
            "{} attempts, shrunk from {}",
            result.attempts,
            format_radius(result.initial_radius_m)
        )
    };
    println!("  {} in {}", attempts, format_duration(elapsed));

    match result.hint_after {
        Some(hint) => println!("  next search here starts at {}", format_radius(hint).cyan()),
        None => println!("  {}", "outcome could not be reported".dimmed()),
    }
}
