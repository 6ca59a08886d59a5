//! Command-line interface parsing
//!
//! Flags only override the environment configuration; secrets and
//! endpoints stay in the environment.

use clap::Parser;

use crate::config::Config;

/// Caching proxy serving spreadsheet-backed courier leaderboards
#[derive(Parser, Debug)]
#[command(name = "topboard")]
#[command(about = "Caching proxy for spreadsheet-backed leaderboards")]
#[command(version)]
pub struct Cli {
    /// Listen port, overriding the PORT environment variable
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Disable the fixed times-of-day job schedule
    #[arg(long)]
    pub no_schedule: bool,

    /// Disable the keep-alive timer (periodic refresh and self-ping)
    #[arg(long)]
    pub no_keepalive: bool,
}

/// Applies CLI overrides on top of the environment configuration.
pub fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(port) = cli.port {
        config.port = port;
    }
}
