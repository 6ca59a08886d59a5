//! Request handlers and HTTP error mapping

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use super::AppState;
use crate::cache::CacheError;
use crate::data::{Window, WindowSnapshot};
use crate::jobs::{JobKind, JobResult};

/// Errors surfaced to HTTP clients
///
/// Internal detail stays in the logs; clients only ever see a generic
/// message.
#[derive(Debug, Error)]
pub enum AppError {
    /// The requested window segment is not one of the known windows
    #[error("unknown window: {0}")]
    UnknownWindow(String),

    /// A cache read failed with no stale data to fall back on
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::UnknownWindow(window) => (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "status": "error",
                    "message": format!("unknown window: {window}"),
                })),
            )
                .into_response(),
            AppError::Cache(err) => {
                error!(error = %err, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal error" })),
                )
                    .into_response()
            }
        }
    }
}

/// Liveness probe.
pub async fn ping() -> &'static str {
    "pong"
}

/// Liveness plus last-update timestamps for every window.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds();

    let mut last_update = serde_json::Map::new();
    for (window, millis) in state.cache.last_updates().await {
        last_update.insert(window.as_str().to_string(), json!(millis));
    }

    Json(json!({
        "status": "ok",
        "uptimeSecs": uptime_secs,
        "lastUpdate": last_update,
    }))
}

/// Leaderboard snapshot for one window.
pub async fn top_money(
    State(state): State<Arc<AppState>>,
    Path(window): Path<String>,
) -> Result<Json<WindowSnapshot>, AppError> {
    let window = Window::from_str(&window).ok_or(AppError::UnknownWindow(window))?;
    let snapshot = state.cache.get_cached(window).await?;
    Ok(Json(snapshot))
}

/// The monthly bonus figure alone, read from the Month window.
pub async fn monthly_bonus(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let snapshot = state.cache.get_cached(Window::Month).await?;
    Ok(Json(json!({ "monthlyBonus": snapshot.bonus() })))
}

/// Forces a refresh of every window, then returns the fresh daily
/// snapshots.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.cache.force_refresh(Window::all()).await?;

    let today = state.cache.get_cached(Window::Today).await?;
    let yesterday = state.cache.get_cached(Window::Yesterday).await?;

    Ok(Json(json!({ "today": today, "yesterday": yesterday })))
}

/// Triggers the summary-update job and reports its result in-band.
pub async fn run_summary_job(State(state): State<Arc<AppState>>) -> Json<JobResult> {
    Json(state.runner.run(JobKind::SummaryUpdate).await)
}

/// Triggers the bonus-update job and reports its result in-band.
pub async fn run_bonus_job(State(state): State<Arc<AppState>>) -> Json<JobResult> {
    Json(state.runner.run(JobKind::BonusUpdate).await)
}
