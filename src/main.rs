//! # Incident Monitor
//!
//! A conflict-incident tracker that scrapes news feeds and article pages from
//! a fixed set of outlets, extracts structured incidents (location, casualty
//! counts, date) with keyword and regex heuristics, and serves them through a
//! small JSON API.
//!
//! ## Features
//!
//! - Feed-first scraping with HTML listing fallback (Al Jazeera, BBC News, CNN),
//!   listing-only scraping (VG, Reuters, AP News) and a Google News aggregator
//! - Relevance gate requiring both a conflict term and a region term
//! - Gazetteer of known places with a rate-limited Nominatim fallback
//! - Cross-source deduplication by normalized title
//! - JSON file store, hourly refresh and a read API with source toggles
//!
//! ## Usage
//!
//! ```sh
//! incident_monitor serve --bind 0.0.0.0:8000 --data-file data/incidents.json
//! incident_monitor scrape --source aljazeera
//! incident_monitor sources
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Fan-out**: The gateway runs every enabled source concurrently
//! 2. **Indexing**: Each source reads its feed or listing page
//! 3. **Extraction**: Entries and articles pass the relevance gate and are
//!    turned into incidents with a resolved location
//! 4. **Merge**: Results are deduplicated and merged into the store

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod article;
mod classifier;
mod cli;
mod config;
mod extract;
mod feed;
mod fetch;
mod gateway;
mod gazetteer;
mod models;
mod monitor;
mod scrapers;
mod store;
mod utils;

use cli::{Cli, Command};
use config::MonitorConfig;
use monitor::{Monitor, spawn_refresh_loop};
use store::IncidentStore;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let config = MonitorConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Serve { bind, data_file } => serve(config, bind, data_file).await,
        Command::Scrape { source, data_file } => scrape(config, source, data_file).await,
        Command::Sources => {
            println!("{}", serde_json::to_string_pretty(&config.sources())?);
            Ok(())
        }
    }
}

async fn serve(
    config: MonitorConfig,
    bind: std::net::SocketAddr,
    data_file: std::path::PathBuf,
) -> Result<(), Box<dyn Error>> {
    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "incident_monitor starting up");

    // Early check: the store directory must be writable
    let data_dir = data_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
    if let Err(e) = ensure_writable_dir(data_dir).await {
        error!(
            path = %data_dir.display(),
            error = %e,
            "Data directory is not writable (fix perms or choose a different path)"
        );
        let e: Box<dyn Error> = e;
        return Err(e);
    }

    let gateway = config.build_gateway()?;
    let mut store = IncidentStore::load(&data_file).await;
    store.touch();
    info!(count = store.len(), path = %store.path().display(), "Incident store ready");
    if store.is_empty() {
        info!("Store is empty; the first cycle will populate it");
    }

    let monitor = Arc::new(Monitor::new(gateway, store));
    let shutdown = CancellationToken::new();

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C; shutting down"),
        }
        ctrl_c.cancel();
    });

    let refresh = spawn_refresh_loop(monitor.clone(), config.scrape_interval(), shutdown.clone());
    let served = api::serve(monitor, bind, shutdown.clone()).await;

    shutdown.cancel();
    if let Err(e) = refresh.await {
        warn!(error = %e, "Refresh loop ended abnormally");
    }
    served?;

    let elapsed = start_time.elapsed();
    info!(
        elapsed_secs = elapsed.as_secs_f64(),
        "incident_monitor shut down"
    );
    Ok(())
}

async fn scrape(
    config: MonitorConfig,
    source: Option<String>,
    data_file: Option<std::path::PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let gateway = config.build_gateway()?;

    let incidents = match source {
        Some(id) => gateway
            .scrape_one(&id)
            .await
            .ok_or_else(|| format!("unknown source: {id}"))?,
        None => gateway.scrape_all().await,
    };
    info!(count = incidents.len(), "Scrape finished");

    if let Some(path) = data_file {
        let mut store = IncidentStore::load(&path).await;
        let added = store.merge(incidents.clone()).await?;
        info!(added, total = store.len(), path = %path.display(), "Merged into store");
    }

    println!("{}", serde_json::to_string_pretty(&incidents)?);
    Ok(())
}
