//! Remote job invocation
//!
//! Runs a remote report-generation job by URL and classifies the outcome.
//! The remote endpoint answers over HTTP, possibly through redirects and
//! with a compressed body; depending on the protocol mode the job either
//! completes within the first response or asynchronously, in which case the
//! runner waits a fixed delay and polls a second time for the authoritative
//! result.

use std::time::{Duration, Instant};

use reqwest::{header::LOCATION, Client, Url};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

/// Substring marking a failed job in a response body
const ERROR_MARKER: &str = "Error";

/// The two jobs the remote report endpoint can run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Default summary update for the current date
    SummaryUpdate,
    /// Previous-day cashless update with bonuses
    BonusUpdate,
}

impl JobKind {
    /// Returns a log-friendly name for the job.
    pub fn label(&self) -> &'static str {
        match self {
            JobKind::SummaryUpdate => "summary-update",
            JobKind::BonusUpdate => "bonus-update",
        }
    }

    /// Returns the operation query parameter selecting this job, if the
    /// remote endpoint needs one (the summary update is its default
    /// operation).
    fn operation(&self) -> Option<(&'static str, &'static str)> {
        match self {
            JobKind::SummaryUpdate => None,
            JobKind::BonusUpdate => Some(("operation", "updateBonuses")),
        }
    }
}

/// Completion protocol spoken by the remote job endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobMode {
    /// First response only acknowledges the start; after a fixed delay a
    /// second request with `check=true` returns the authoritative result
    WaitThenPoll,
    /// The first successful response is the result
    SingleRequest,
}

impl JobMode {
    /// Parses a configuration value into a JobMode.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<JobMode> {
        match s.to_lowercase().trim() {
            "poll" => Some(JobMode::WaitThenPoll),
            "single" => Some(JobMode::SingleRequest),
            _ => None,
        }
    }
}

/// Configuration for remote job invocations
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Target endpoint; `None` makes every invocation fail without network
    /// traffic
    pub base_url: Option<String>,
    /// Completion protocol
    pub mode: JobMode,
    /// Redirects followed per request before giving up
    pub max_redirects: u32,
    /// Timeout of a single HTTP request
    pub leg_timeout: Duration,
    /// Ceiling for the whole invocation, waits included
    pub job_timeout: Duration,
    /// How long the remote job needs before the poll request is worth making
    pub completion_delay: Duration,
    /// Successful runs faster than this are flagged `fast`
    pub fast_threshold: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            mode: JobMode::WaitThenPoll,
            max_redirects: 5,
            leg_timeout: Duration::from_secs(30),
            job_timeout: Duration::from_secs(180),
            completion_delay: Duration::from_secs(120),
            fast_threshold: Duration::from_secs(60),
        }
    }
}

/// Structured outcome of one job invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status")]
pub enum JobResult {
    #[serde(rename = "success")]
    Success {
        message: String,
        /// Informational: the run finished below the fast threshold
        fast: bool,
        #[serde(rename = "elapsedMs")]
        elapsed_ms: u64,
    },
    #[serde(rename = "error")]
    Failure {
        #[serde(rename = "error")]
        reason: String,
        #[serde(rename = "elapsedMs")]
        elapsed_ms: u64,
    },
}

impl JobResult {
    fn failure(reason: impl Into<String>, elapsed: Duration) -> Self {
        JobResult::Failure {
            reason: reason.into(),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    /// Returns true for a successful run.
    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success { .. })
    }
}

/// Errors inside one invocation; all end up as a `JobResult::Failure` reason
#[derive(Debug, Error)]
enum JobError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("job endpoint returned status {0}")]
    Status(u16),

    #[error("redirect limit of {0} exceeded")]
    RedirectLimit(u32),

    #[error("redirect response carried no usable Location header")]
    BadRedirect,

    #[error("{0}")]
    Marker(String),
}

/// One resolved request leg
struct LegResponse {
    status: u16,
    body: String,
}

/// Finds the first body line containing the error marker.
fn error_marker(body: &str) -> Option<String> {
    body.lines()
        .find(|line| line.contains(ERROR_MARKER))
        .map(|line| line.trim().to_string())
}

/// Invokes remote report-generation jobs
///
/// Redirects are followed manually so the redirect limit is explicit;
/// compressed response bodies are decompressed by the client before the
/// runner looks at them.
pub struct JobRunner {
    http_client: Client,
    config: JobConfig,
}

impl JobRunner {
    /// Creates a runner with its own HTTP client.
    pub fn new(config: JobConfig) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .gzip(true)
            .deflate(true)
            .timeout(config.leg_timeout)
            .build()?;
        Ok(Self {
            http_client,
            config,
        })
    }

    /// Runs the job once and reports a structured result.
    ///
    /// Never returns an error: configuration problems, HTTP failures,
    /// timeouts, and error markers in the body all map to
    /// `JobResult::Failure`. There is no retry within an invocation.
    pub async fn run(&self, kind: JobKind) -> JobResult {
        let Some(base_url) = &self.config.base_url else {
            return JobResult::failure("job URL is not configured", Duration::ZERO);
        };

        let mut url = match Url::parse(base_url) {
            Ok(url) => url,
            Err(err) => {
                return JobResult::failure(format!("invalid job URL: {err}"), Duration::ZERO)
            }
        };
        if let Some((key, value)) = kind.operation() {
            url.query_pairs_mut().append_pair(key, value);
        }

        info!(job = kind.label(), "running remote job");
        let started = Instant::now();

        let outcome = tokio::time::timeout(self.config.job_timeout, self.execute(url)).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(Ok(message)) => {
                let fast = elapsed < self.config.fast_threshold;
                info!(job = kind.label(), fast, elapsed_ms = elapsed.as_millis() as u64, "job finished");
                JobResult::Success {
                    message,
                    fast,
                    elapsed_ms: elapsed.as_millis() as u64,
                }
            }
            Ok(Err(err)) => JobResult::failure(err.to_string(), elapsed),
            Err(_) => JobResult::failure(
                format!(
                    "job timed out after {} seconds",
                    self.config.job_timeout.as_secs()
                ),
                elapsed,
            ),
        }
    }

    /// Runs the configured completion protocol against the job URL.
    async fn execute(&self, url: Url) -> Result<String, JobError> {
        match self.config.mode {
            JobMode::WaitThenPoll => {
                let first = self.request_leg(url.clone(), false).await?;
                if let Some(line) = error_marker(&first.body) {
                    return Err(JobError::Marker(line));
                }

                // The remote job keeps running after the acknowledgement;
                // the poll must not be issued before the delay elapses.
                tokio::time::sleep(self.config.completion_delay).await;

                let mut poll_url = url;
                poll_url.query_pairs_mut().append_pair("check", "true");
                let poll = self.request_leg(poll_url, false).await?;
                if let Some(line) = error_marker(&poll.body) {
                    return Err(JobError::Marker(line));
                }
                Ok(poll.body)
            }
            JobMode::SingleRequest => {
                let response = self.request_leg(url, true).await?;
                debug!(status = response.status, body = %response.body, "job response");
                Ok(format!("job accepted with status {}", response.status))
            }
        }
    }

    /// Sends one GET, following 301/302 redirects up to the configured
    /// limit.
    ///
    /// With `accept_bare_redirect`, a redirect without a usable `Location`
    /// header resolves as a success with an empty body instead of failing
    /// (single-request protocol treats such an answer as acceptance).
    async fn request_leg(
        &self,
        mut url: Url,
        accept_bare_redirect: bool,
    ) -> Result<LegResponse, JobError> {
        let mut redirects = 0u32;
        loop {
            let response = self.http_client.get(url.clone()).send().await?;
            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| url.join(value).ok());
                match location {
                    Some(next) => {
                        if redirects >= self.config.max_redirects {
                            return Err(JobError::RedirectLimit(self.config.max_redirects));
                        }
                        redirects += 1;
                        url = next;
                        continue;
                    }
                    None if accept_bare_redirect => {
                        return Ok(LegResponse {
                            status: status.as_u16(),
                            body: String::new(),
                        })
                    }
                    None => return Err(JobError::BadRedirect),
                }
            }

            if !status.is_success() {
                return Err(JobError::Status(status.as_u16()));
            }

            let body = response.text().await?;
            return Ok(LegResponse {
                status: status.as_u16(),
                body,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::{header, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Binds a fixture router on an ephemeral local port.
    async fn spawn_fixture(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn config(base_url: Option<String>, mode: JobMode) -> JobConfig {
        JobConfig {
            base_url,
            mode,
            completion_delay: Duration::from_millis(20),
            ..JobConfig::default()
        }
    }

    #[tokio::test]
    async fn test_missing_url_fails_without_network() {
        let runner = JobRunner::new(config(None, JobMode::SingleRequest)).unwrap();

        let result = runner.run(JobKind::SummaryUpdate).await;

        match result {
            JobResult::Failure { reason, .. } => {
                assert!(reason.contains("not configured"), "got: {reason}")
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_single_request_follows_redirect_to_success() {
        let app = Router::new()
            .route(
                "/job",
                get(|| async { (StatusCode::FOUND, [(header::LOCATION, "/done")], "") }),
            )
            .route("/done", get(|| async { "report ready" }));
        let base = spawn_fixture(app).await;

        let runner =
            JobRunner::new(config(Some(format!("{base}/job")), JobMode::SingleRequest)).unwrap();
        let result = runner.run(JobKind::SummaryUpdate).await;

        assert!(result.is_success(), "got: {result:?}");
    }

    #[tokio::test]
    async fn test_redirect_limit_is_terminal() {
        let app = Router::new().route(
            "/job",
            get(|| async { (StatusCode::FOUND, [(header::LOCATION, "/job")], "") }),
        );
        let base = spawn_fixture(app).await;

        let runner =
            JobRunner::new(config(Some(format!("{base}/job")), JobMode::SingleRequest)).unwrap();
        let result = runner.run(JobKind::SummaryUpdate).await;

        match result {
            JobResult::Failure { reason, .. } => {
                assert!(reason.contains("redirect limit"), "got: {reason}")
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wait_then_poll_takes_poll_body_as_authoritative() {
        let app = Router::new().route(
            "/job",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                if params.get("check").map(String::as_str) == Some("true") {
                    "Summary updated for 10 couriers"
                } else {
                    "started"
                }
            }),
        );
        let base = spawn_fixture(app).await;

        let runner =
            JobRunner::new(config(Some(format!("{base}/job")), JobMode::WaitThenPoll)).unwrap();
        let result = runner.run(JobKind::SummaryUpdate).await;

        match result {
            JobResult::Success { message, fast, .. } => {
                assert_eq!(message, "Summary updated for 10 couriers");
                assert!(fast, "a sub-second run is below the fast threshold");
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wait_then_poll_fails_on_error_marker_in_poll_body() {
        let app = Router::new().route(
            "/job",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                if params.get("check").map(String::as_str) == Some("true") {
                    "Error: x"
                } else {
                    "started"
                }
            }),
        );
        let base = spawn_fixture(app).await;

        let runner =
            JobRunner::new(config(Some(format!("{base}/job")), JobMode::WaitThenPoll)).unwrap();
        let result = runner.run(JobKind::SummaryUpdate).await;

        match result {
            JobResult::Failure { reason, .. } => assert_eq!(reason, "Error: x"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_error_marker_in_first_body_skips_the_poll() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/job",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    "Error: quota exceeded"
                }
            }),
        );
        let base = spawn_fixture(app).await;

        let runner =
            JobRunner::new(config(Some(format!("{base}/job")), JobMode::WaitThenPoll)).unwrap();
        let result = runner.run(JobKind::SummaryUpdate).await;

        match result {
            JobResult::Failure { reason, .. } => assert_eq!(reason, "Error: quota exceeded"),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1, "no poll after a failed start");
    }

    #[tokio::test]
    async fn test_bonus_job_selects_the_bonus_operation() {
        let app = Router::new().route(
            "/job",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                if params.get("operation").map(String::as_str) == Some("updateBonuses") {
                    "bonuses updated"
                } else {
                    "Error: wrong operation"
                }
            }),
        );
        let base = spawn_fixture(app).await;

        let runner =
            JobRunner::new(config(Some(format!("{base}/job")), JobMode::SingleRequest)).unwrap();
        let result = runner.run(JobKind::BonusUpdate).await;

        assert!(result.is_success(), "got: {result:?}");
    }

    #[tokio::test]
    async fn test_job_timeout_fails_the_invocation() {
        let app = Router::new().route(
            "/job",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                "too late"
            }),
        );
        let base = spawn_fixture(app).await;

        let mut cfg = config(Some(format!("{base}/job")), JobMode::SingleRequest);
        cfg.job_timeout = Duration::from_millis(100);
        let runner = JobRunner::new(cfg).unwrap();

        let result = runner.run(JobKind::SummaryUpdate).await;

        match result {
            JobResult::Failure { reason, .. } => {
                assert!(reason.contains("timed out"), "got: {reason}")
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_success_status_is_a_failure() {
        let app = Router::new().route(
            "/job",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let base = spawn_fixture(app).await;

        let runner =
            JobRunner::new(config(Some(format!("{base}/job")), JobMode::SingleRequest)).unwrap();
        let result = runner.run(JobKind::SummaryUpdate).await;

        match result {
            JobResult::Failure { reason, .. } => {
                assert!(reason.contains("status 500"), "got: {reason}")
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_error_marker_extracts_the_marker_line() {
        let body = "job log\n  Error: spreadsheet locked  \ntrailing";
        assert_eq!(error_marker(body), Some("Error: spreadsheet locked".to_string()));
    }

    #[test]
    fn test_error_marker_ignores_clean_bodies() {
        assert_eq!(error_marker("all rows updated"), None);
        assert_eq!(error_marker(""), None);
    }
}
