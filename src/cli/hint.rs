//! Radius hint commands

use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use geogate::error::Result;
use geogate::hints::{GridKey, SearchOutcome};
use geogate::output::formatters::format_radius;
use geogate::output::{self, OutputFormat};

use crate::cli::args::GlobalOptions;
use crate::cli::{CommandContext, ReportArgs};

#[derive(Debug, Serialize, Tabled)]
struct HintRow {
    #[tabled(rename = "CELL")]
    cell: String,
    #[tabled(rename = "RADIUS (m)")]
    radius: u32,
}

impl HintRow {
    fn new(lat: f64, lon: f64, radius: u32) -> Self {
        Self {
            cell: GridKey::from_coords(lat, lon).to_string(),
            radius,
        }
    }
}

/// `hint get`
pub async fn get(opts: &GlobalOptions, lat: f64, lon: f64) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let radius = ctx.proxy.get_hint(lat, lon).await?;
    print_hint(ctx.format, HintRow::new(lat, lon, radius), None)
}

/// `hint report`
pub async fn report(opts: &GlobalOptions, args: &ReportArgs) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let outcome = if args.error {
        SearchOutcome::failure(args.lat, args.lon, args.infrastructure)
    } else {
        SearchOutcome::success(args.lat, args.lon, args.count, args.capped)
    };

    let radius = ctx.proxy.report(args.lat, args.lon, &outcome).await?;
    print_hint(ctx.format, HintRow::new(args.lat, args.lon, radius), Some("updated"))
}

fn print_hint(format: OutputFormat, row: HintRow, verb: Option<&str>) -> Result<()> {
    match format {
        OutputFormat::Pretty => {
            let label = match verb {
                Some(v) => format!("Hint {} for cell", v),
                None => "Hint for cell".to_string(),
            };
            println!(
                "{} {}: {}",
                label,
                row.cell.bold(),
                format_radius(row.radius).cyan()
            );
        }
        _ => println!("{}", output::render(&[row], format)?),
    }
    Ok(())
}
