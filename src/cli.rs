//! Command-line interface definitions for the incident monitor.
//!
//! This module defines the CLI arguments and subcommands using the `clap` crate.
//! Paths and the bind address can also be provided via environment variables.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Command-line arguments for the incident monitor.
///
/// # Examples
///
/// ```sh
/// # Serve the API with the built-in source list, refreshing hourly
/// incident_monitor serve
///
/// # Serve with a config file on a custom port
/// incident_monitor --config monitor.yaml serve --bind 127.0.0.1:9000
///
/// # One-off scrape of a single source, printed as JSON
/// incident_monitor scrape --source bbc
///
/// # One-off scrape of everything, merged into the data file
/// incident_monitor scrape --data-file data/incidents.json
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML config file
    #[arg(short, long, global = true, env = "INCIDENT_MONITOR_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Serve the read API and refresh incidents periodically
    Serve {
        /// Address to listen on
        #[arg(short, long, env = "INCIDENT_MONITOR_BIND", default_value = "0.0.0.0:8000")]
        bind: SocketAddr,

        /// Incident store file
        #[arg(short, long, env = "INCIDENT_MONITOR_DATA", default_value = "data/incidents.json")]
        data_file: PathBuf,
    },
    /// Run one scrape and print the incidents as JSON
    Scrape {
        /// Only run this source (runs even if disabled)
        #[arg(short, long)]
        source: Option<String>,

        /// Merge the results into this incident store file
        #[arg(short, long)]
        data_file: Option<PathBuf>,
    },
    /// Print the configured sources as JSON
    Sources,
}
