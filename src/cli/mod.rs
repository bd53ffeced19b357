//! CLI command definitions and handlers

use clap::{Args, Parser, Subcommand};
pub use clap_complete::Shell;

use geogate::client::TagFilter;
use geogate::output::OutputFormat;

pub mod args;
pub mod cache;
pub mod completions;
pub mod context;
pub mod hint;
pub mod init;
pub mod search;
pub mod serve;

pub use context::CommandContext;

/// Geogate - adaptive caching and rate-governance proxy for geospatial APIs
#[derive(Parser, Debug)]
#[command(name = "geogate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (pretty, table, json)
    #[arg(
        long,
        global = true,
        env = "GEOGATE_FORMAT",
        default_value = "pretty",
        hide_env = true,
        hide_possible_values = true
    )]
    pub format: OutputFormat,

    /// Override config file location
    #[arg(long, global = true, env = "GEOGATE_CONFIG", hide_env = true)]
    pub config: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true, env = "GEOGATE_DEBUG", hide_env = true)]
    pub debug: bool,

    /// Proxy base URL for client commands
    #[arg(long, global = true, env = "GEOGATE_PROXY_URL", hide_env = true)]
    pub proxy_url: Option<String>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the caching proxy
    Serve {
        /// Listen address (defaults to server.bind from config)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Search for tagged features around a point, shrinking on truncation
    Search(SearchArgs),

    /// Read or update learned radius hints
    #[command(subcommand)]
    Hint(HintCommands),

    /// Inspect or clear the proxy cache
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    #[arg(long, allow_negative_numbers = true)]
    pub lat: f64,

    #[arg(long, allow_negative_numbers = true)]
    pub lon: f64,

    /// Tag filter, `key` or `key=value` (repeatable)
    #[arg(long = "tag", short = 't')]
    pub tags: Vec<TagFilter>,

    /// Write the final Overpass body to this file
    #[arg(long)]
    pub save: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum HintCommands {
    /// Show the current hint for a point
    Get {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
    },

    /// Report a search outcome by hand
    Report(ReportArgs),
}

#[derive(Args, Debug)]
pub struct ReportArgs {
    #[arg(long, allow_negative_numbers = true)]
    pub lat: f64,

    #[arg(long, allow_negative_numbers = true)]
    pub lon: f64,

    /// Tagged results the search returned
    #[arg(long, default_value_t = 0)]
    pub count: usize,

    /// The upstream truncated the response
    #[arg(long)]
    pub capped: bool,

    /// The search failed
    #[arg(long)]
    pub error: bool,

    /// The failure was a gateway timeout or rate limit
    #[arg(long, requires = "error")]
    pub infrastructure: bool,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show proxy cache counters
    Stats,

    /// Drop every cached response and radius hint
    Clear {
        /// Skip confirmation
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Print the snapshot directory
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_search_with_negative_coords() {
        let cli = Cli::parse_from([
            "geogate", "search", "--lat", "-33.86", "--lon", "151.2", "-t", "amenity=cafe",
        ]);
        match cli.command {
            Commands::Search(args) => {
                assert_eq!(args.lat, -33.86);
                assert_eq!(args.tags.len(), 1);
                assert_eq!(args.tags[0].key, "amenity");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_infrastructure_requires_error() {
        let result = Cli::try_parse_from([
            "geogate", "hint", "report", "--lat", "1", "--lon", "1", "--infrastructure",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_format_flag() {
        let cli = Cli::parse_from(["geogate", "--format", "json", "cache", "stats"]);
        assert_eq!(cli.format, OutputFormat::Json);
    }
}
