//! HTTP surface of the caching proxy
//!
//! Builds the axum router and owns the shared state handed to handlers.

pub mod handlers;

use std::sync::Arc;

use axum::{routing::get, Router};
use chrono::{DateTime, Utc};

use crate::cache::CacheStore;
use crate::jobs::JobRunner;

/// State shared by every request handler
pub struct AppState {
    pub cache: Arc<CacheStore>,
    pub runner: Arc<JobRunner>,
    pub started_at: DateTime<Utc>,
}

/// Builds the service router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ping", get(handlers::ping))
        .route("/status", get(handlers::status))
        .route("/top/money/:window", get(handlers::top_money))
        .route("/monthlybonus", get(handlers::monthly_bonus))
        .route("/refresh", get(handlers::refresh))
        .route(
            "/runTransactionsForCurrentDate",
            get(handlers::run_summary_job),
        )
        .route(
            "/updatePreviousDayCashlessWithBonuses",
            get(handlers::run_bonus_job),
        )
        .with_state(state)
}
