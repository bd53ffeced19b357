//! Geogate CLI - proxy server and search companion

use clap::Parser;

mod cli;

use cli::args::GlobalOptions;
use cli::{CacheCommands, Cli, Commands, HintCommands};
use geogate::error::{Error, Result};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if let Err(err) = run(cli).await {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` with `--debug`.
fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp_millis()
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let opts = GlobalOptions::from_cli(&cli);

    match cli.command {
        Commands::Serve { bind } => cli::serve::run(&opts, bind.as_deref())
            .await
            .map_err(|e| Error::Other(format!("{:#}", e))),
        Commands::Search(args) => cli::search::run(&opts, &args).await,
        Commands::Hint(cmd) => match cmd {
            HintCommands::Get { lat, lon } => cli::hint::get(&opts, lat, lon).await,
            HintCommands::Report(args) => cli::hint::report(&opts, &args).await,
        },
        Commands::Cache(cmd) => match cmd {
            CacheCommands::Stats => cli::cache::stats(&opts).await,
            CacheCommands::Clear { yes } => cli::cache::clear(&opts, yes).await,
            CacheCommands::Path => cli::cache::path(&opts),
        },
        Commands::Init { force } => cli::init::run(&opts, force),
        Commands::Completion { shell } => {
            cli::completions::generate(shell);
            Ok(())
        }
    }
}
