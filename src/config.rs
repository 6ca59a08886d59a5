//! Environment-driven configuration
//!
//! Endpoints and credentials come from the environment; optional values
//! fall back to logged defaults. Missing required variables terminate
//! startup with a clear message.

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use tracing::{info, warn};

use crate::jobs::JobMode;

/// Runtime configuration assembled at startup
#[derive(Debug, Clone)]
pub struct Config {
    /// Listening port
    pub port: u16,
    /// Identifier of the source spreadsheet
    pub spreadsheet_id: String,
    /// API key for the spreadsheet service
    pub sheets_api_key: String,
    /// Remote report-generation endpoint; jobs fail when unset
    pub report_job_url: Option<String>,
    /// Externally reachable base URL for the keep-alive self-ping
    pub public_url: Option<String>,
    /// Max age before cached window data is refreshed
    pub cache_ttl: Duration,
    /// Interval of the keep-alive timer
    pub keepalive_interval: Duration,
    /// Fixed timezone the job schedule is expressed in
    pub schedule_offset: FixedOffset,
    /// Completion protocol of the remote job endpoint
    pub job_mode: JobMode,
}

impl Config {
    /// Loads configuration from the environment.
    pub fn load() -> Self {
        Self {
            port: try_load("PORT", "3000"),
            spreadsheet_id: require("SPREADSHEET_ID"),
            sheets_api_key: require("SHEETS_API_KEY"),
            report_job_url: optional("REPORT_JOB_URL"),
            public_url: optional("PUBLIC_URL"),
            cache_ttl: Duration::from_secs(try_load("CACHE_TTL_SECS", "120")),
            keepalive_interval: Duration::from_secs(try_load("KEEPALIVE_INTERVAL_SECS", "840")),
            schedule_offset: offset_from_hours(try_load("SCHEDULE_UTC_OFFSET_HOURS", "3")),
            job_mode: load_job_mode(),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| ())
}

/// Reads an env var, falling back to a default and logging the fallback.
fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}

/// Reads a required env var; startup fails without it.
fn require(key: &str) -> String {
    var(key)
        .map_err(|_| {
            warn!("Required environment variable {key} is not set");
        })
        .expect("Environment misconfigured!")
}

fn optional(key: &str) -> Option<String> {
    var(key).ok().filter(|value| !value.is_empty())
}

/// Converts a whole-hour UTC offset into a FixedOffset, falling back to
/// UTC on out-of-range values.
fn offset_from_hours(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| {
        warn!(hours, "UTC offset out of range, falling back to UTC");
        Utc.fix()
    })
}

fn load_job_mode() -> JobMode {
    let raw: String = try_load("JOB_MODE", "poll");
    JobMode::from_str(&raw).unwrap_or_else(|| {
        warn!(mode = %raw, "unknown job mode, falling back to poll");
        JobMode::WaitThenPoll
    })
}
