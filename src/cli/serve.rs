//! Serve command

use std::net::SocketAddr;

use anyhow::Context;
use colored::Colorize;

use geogate::server::{self, AppState};

use crate::cli::args::GlobalOptions;
use crate::cli::context::load_config;

/// Run the proxy until Ctrl-C, then flush both stores.
pub async fn run(opts: &GlobalOptions, bind: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(opts).context("loading configuration")?;
    let bind = bind.unwrap_or(&config.server.bind);
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", bind))?;

    let state = AppState::from_config(&config).context("opening cache stores")?;
    let dir = config.cache.resolve_dir()?;

    println!(
        "{} http://{} (cache: {})",
        "geogate listening on".green().bold(),
        addr,
        dir.display()
    );

    server::serve(addr, state, shutdown_signal())
        .await
        .with_context(|| format!("serving on {}", addr))?;

    println!("{}", "Stopped.".dimmed());
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
