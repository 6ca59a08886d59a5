//! Background keep-alive system
//!
//! Periodically refreshes every cache window so entries stay warm between
//! requests, and optionally pings the service's own public address as a
//! liveness signal for the hosting platform.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::data::Window;

/// Configuration for the keep-alive timer
#[derive(Debug, Clone)]
pub struct KeepAliveConfig {
    /// Interval between keep-alive ticks
    pub interval: Duration,
    /// Whether the keep-alive loop runs at all
    pub enabled: bool,
    /// Externally reachable base URL to self-ping, if any
    pub self_ping_url: Option<String>,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(840), // 14 minutes
            enabled: true,
            self_ping_url: None,
        }
    }
}

/// Handle for controlling the background keep-alive loop
pub struct KeepAliveHandle {
    /// Flag to signal shutdown
    shutdown_tx: mpsc::Sender<()>,
}

impl KeepAliveHandle {
    /// Spawns the keep-alive loop.
    ///
    /// Each tick refreshes every cache window and then performs the
    /// self-ping when a URL is configured. Refresh failures are logged per
    /// window; the loop itself never dies.
    pub fn spawn(config: KeepAliveConfig, cache: Arc<CacheStore>) -> Self {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        if config.enabled {
            let http_client = reqwest::Client::new();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(config.interval);
                // Skip the first tick (immediate)
                interval.tick().await;

                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            refresh_all(&cache).await;
                            if let Some(base) = &config.self_ping_url {
                                self_ping(&http_client, base).await;
                            }
                        }
                        _ = shutdown_rx.recv() => {
                            break;
                        }
                    }
                }
            });
        }

        Self { shutdown_tx }
    }

    /// Shuts down the background keep-alive loop.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Refreshes every window through the normal read path.
async fn refresh_all(cache: &CacheStore) {
    let results = futures::future::join_all(
        Window::all()
            .iter()
            .map(|w| async move { (*w, cache.get_cached(*w).await) }),
    )
    .await;

    for (window, result) in results {
        if let Err(err) = result {
            warn!(window = window.as_str(), error = %err, "keep-alive refresh failed");
        }
    }
    debug!("keep-alive refresh cycle complete");
}

/// Sends the liveness ping to the service's own `/ping` route.
async fn self_ping(client: &reqwest::Client, base: &str) {
    let url = format!("{}/ping", base.trim_end_matches('/'));
    match client.get(&url).send().await {
        Ok(response) if response.status().is_success() => {
            debug!("self ping ok");
        }
        Ok(response) => {
            warn!(status = response.status().as_u16(), "self ping answered with an error status");
        }
        Err(err) => {
            warn!(error = %err, "self ping failed");
        }
    }
}
