//! Topboard - caching HTTP proxy for courier leaderboard data
//!
//! Serves leaderboard and bonus figures for a set of time windows, reading
//! through an in-memory cache in front of a spreadsheet data source, and
//! triggers remote report-generation jobs on a schedule or on demand.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use topboard::cache::{CacheStore, Clock, SystemClock};
use topboard::cli::{self, Cli};
use topboard::config::Config;
use topboard::data::SheetsClient;
use topboard::jobs::{JobConfig, JobRunner, ScheduleConfig, SchedulerHandle};
use topboard::refresh::{KeepAliveConfig, KeepAliveHandle};
use topboard::server::{build_router, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::load();
    cli::apply_overrides(&mut config, &cli);

    info!(port = config.port, "starting leaderboard proxy");

    let source = Arc::new(SheetsClient::new(
        config.spreadsheet_id.clone(),
        config.sheets_api_key.clone(),
    ));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache = Arc::new(CacheStore::new(source, clock.clone(), config.cache_ttl));

    let runner = Arc::new(
        JobRunner::new(JobConfig {
            base_url: config.report_job_url.clone(),
            mode: config.job_mode,
            ..JobConfig::default()
        })
        .expect("failed to build job HTTP client"),
    );

    // Synchronous population before serving; failures only log.
    cache.initialize().await;

    let _scheduler = SchedulerHandle::spawn(
        ScheduleConfig {
            timezone: config.schedule_offset,
            enabled: !cli.no_schedule,
            ..ScheduleConfig::default()
        },
        runner.clone(),
        clock,
    );

    let _keepalive = KeepAliveHandle::spawn(
        KeepAliveConfig {
            interval: config.keepalive_interval,
            enabled: !cli.no_keepalive,
            self_ping_url: config.public_url.clone(),
        },
        cache.clone(),
    );

    let state = Arc::new(AppState {
        cache,
        runner,
        started_at: chrono::Utc::now(),
    });
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .expect("failed to bind listen port");
    info!(
        "listening on {}",
        listener.local_addr().expect("listener has a local address")
    );

    axum::serve(listener, app).await.expect("server error");
}
