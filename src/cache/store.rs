//! In-memory cache store with refresh-on-stale and fallback-on-failure
//!
//! Provides a `CacheStore` holding one entry per `Window`. A read refreshes
//! the entry from the spreadsheet source when it is stale, replaces the
//! snapshot atomically on success, and falls back to the previous snapshot
//! when the fetch fails.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::data::{parse_leaderboard, RangeSource, SheetsError, Window, WindowSnapshot};

/// Source of the current time
///
/// Injected into the store so tests can move time explicitly instead of
/// sleeping through TTLs.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Errors that can occur when reading through the cache
#[derive(Debug, Error)]
pub enum CacheError {
    /// The refresh fetch failed and no prior snapshot exists to fall back on
    #[error("failed to refresh window data: {0}")]
    Fetch(#[from] SheetsError),
}

/// One cached window
///
/// `last_update_ms` is 0 until the first successful refresh. The snapshot
/// and timestamp only change together, under the entry's lock.
#[derive(Debug, Default)]
struct CacheEntry {
    snapshot: Option<WindowSnapshot>,
    last_update_ms: i64,
}

/// Index of a window's slot in the entry table
fn slot(window: Window) -> usize {
    match window {
        Window::Today => 0,
        Window::Yesterday => 1,
        Window::Week => 2,
        Window::Month => 3,
        Window::LastWeek => 4,
        Window::LastMonth => 5,
    }
}

/// In-memory cache over the spreadsheet source
///
/// Entries are created empty at construction and live for the process
/// lifetime. Each entry sits behind its own async mutex, held across the
/// whole check-and-refresh: refreshes of the same window are serialized
/// while distinct windows refresh concurrently.
pub struct CacheStore {
    /// The spreadsheet fetch capability
    source: Arc<dyn RangeSource>,
    /// Time source for staleness checks
    clock: Arc<dyn Clock>,
    /// Max age before a snapshot is considered stale
    ttl: Duration,
    /// One entry per window, indexed by `slot`
    entries: [Mutex<CacheEntry>; 6],
}

impl CacheStore {
    /// Creates a store with empty entries for every window.
    pub fn new(source: Arc<dyn RangeSource>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            source,
            clock,
            ttl,
            entries: std::array::from_fn(|_| Mutex::new(CacheEntry::default())),
        }
    }

    fn entry(&self, window: Window) -> &Mutex<CacheEntry> {
        &self.entries[slot(window)]
    }

    /// Runs one complete fetch cycle for a window: leaderboard rows and the
    /// bonus scalar, assembled into a single snapshot.
    async fn fetch_window(&self, window: Window) -> Result<WindowSnapshot, SheetsError> {
        let sheet = window.sheet();
        let rows = self.source.fetch_range(sheet, window.range()).await?;
        let bonus = self.source.fetch_scalar(sheet, window.bonus_cell()).await?;
        Ok(WindowSnapshot::assemble(
            window.category(),
            parse_leaderboard(&rows),
            bonus,
        ))
    }

    /// Returns the window's snapshot, refreshing it first when stale.
    ///
    /// # Behavior
    /// - Fresh entry: returns the cached snapshot without any fetch
    /// - Stale or empty entry: runs exactly one fetch cycle and, on success,
    ///   replaces the snapshot and timestamp in one step
    /// - Fetch failure with a prior snapshot: logs a warning and returns the
    ///   stale snapshot unchanged
    /// - Fetch failure with no prior snapshot: propagates the error
    pub async fn get_cached(&self, window: Window) -> Result<WindowSnapshot, CacheError> {
        let mut entry = self.entry(window).lock().await;

        let now_ms = self.clock.now().timestamp_millis();
        let ttl_ms = self.ttl.as_millis() as i64;

        if let Some(snapshot) = &entry.snapshot {
            if now_ms - entry.last_update_ms <= ttl_ms {
                return Ok(snapshot.clone());
            }
        }

        match self.fetch_window(window).await {
            Ok(snapshot) => {
                entry.snapshot = Some(snapshot.clone());
                entry.last_update_ms = self.clock.now().timestamp_millis();
                info!(window = window.as_str(), "cache refreshed");
                Ok(snapshot)
            }
            Err(err) => match &entry.snapshot {
                Some(snapshot) => {
                    warn!(
                        window = window.as_str(),
                        error = %err,
                        "refresh failed, serving stale data"
                    );
                    Ok(snapshot.clone())
                }
                None => Err(CacheError::Fetch(err)),
            },
        }
    }

    /// Forces a refresh of the given windows regardless of TTL.
    ///
    /// Resets each window's timestamp before refreshing, so the subsequent
    /// reads always fetch. All windows are attempted; the first error is
    /// returned.
    pub async fn force_refresh(&self, windows: &[Window]) -> Result<(), CacheError> {
        for window in windows {
            let mut entry = self.entry(*window).lock().await;
            entry.last_update_ms = 0;
        }

        let results = join_all(windows.iter().map(|w| self.get_cached(*w))).await;
        for result in results {
            result?;
        }
        Ok(())
    }

    /// Populates every window at startup.
    ///
    /// Failures are logged and swallowed: the process serves with empty
    /// entries until the first successful refresh.
    pub async fn initialize(&self) {
        let results = join_all(
            Window::all()
                .iter()
                .map(|w| async move { (*w, self.get_cached(*w).await) }),
        )
        .await;

        let mut failed = 0;
        for (window, result) in results {
            if let Err(err) = result {
                failed += 1;
                error!(window = window.as_str(), error = %err, "initial cache load failed");
            }
        }
        if failed == 0 {
            info!("cache initialized");
        } else {
            warn!(failed, "cache initialized with failures");
        }
    }

    /// Returns each window's last successful update, in epoch millis
    /// (0 = never populated). For the status endpoint.
    pub async fn last_updates(&self) -> Vec<(Window, i64)> {
        let mut updates = Vec::with_capacity(Window::all().len());
        for window in Window::all() {
            let entry = self.entry(*window).lock().await;
            updates.push((*window, entry.last_update_ms));
        }
        updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    /// A programmable spreadsheet source counting fetch cycles.
    struct FakeSource {
        rows: StdMutex<Vec<Vec<String>>>,
        bonus: StdMutex<String>,
        fail: AtomicBool,
        delay: Option<Duration>,
        range_calls: AtomicUsize,
    }

    impl FakeSource {
        fn new(rows: Vec<Vec<String>>, bonus: &str) -> Self {
            Self {
                rows: StdMutex::new(rows),
                bonus: StdMutex::new(bonus.to_string()),
                fail: AtomicBool::new(false),
                delay: None,
                range_calls: AtomicUsize::new(0),
            }
        }

        fn set_fail(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        fn set_data(&self, rows: Vec<Vec<String>>, bonus: &str) {
            *self.rows.lock().unwrap() = rows;
            *self.bonus.lock().unwrap() = bonus.to_string();
        }

        fn fetches(&self) -> usize {
            self.range_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RangeSource for FakeSource {
        async fn fetch_range(
            &self,
            _sheet: &str,
            _range: &str,
        ) -> Result<Vec<Vec<String>>, SheetsError> {
            self.range_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(SheetsError::Status(500));
            }
            Ok(self.rows.lock().unwrap().clone())
        }

        async fn fetch_scalar(&self, _sheet: &str, _cell: &str) -> Result<String, SheetsError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(SheetsError::Status(500));
            }
            Ok(self.bonus.lock().unwrap().clone())
        }
    }

    /// A clock that only moves when told to.
    struct FakeClock {
        now: StdMutex<DateTime<Utc>>,
    }

    impl FakeClock {
        fn new() -> Self {
            Self {
                now: StdMutex::new(Utc::now()),
            }
        }

        fn advance(&self, duration: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += chrono::Duration::from_std(duration).unwrap();
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    fn five_rows() -> Vec<Vec<String>> {
        (1..=5)
            .map(|i| vec![i.to_string(), format!("555-010{i}")])
            .collect()
    }

    fn store_with(
        source: Arc<FakeSource>,
        clock: Arc<FakeClock>,
        ttl: Duration,
    ) -> CacheStore {
        CacheStore::new(source, clock, ttl)
    }

    const TTL: Duration = Duration::from_secs(120);

    #[tokio::test]
    async fn test_fresh_entry_is_served_without_fetch() {
        let source = Arc::new(FakeSource::new(five_rows(), "1000"));
        let clock = Arc::new(FakeClock::new());
        let store = store_with(source.clone(), clock, TTL);

        store.get_cached(Window::Today).await.unwrap();
        assert_eq!(source.fetches(), 1);

        store.get_cached(Window::Today).await.unwrap();
        assert_eq!(source.fetches(), 1, "fresh read must not fetch");
    }

    #[tokio::test]
    async fn test_stale_entry_triggers_exactly_one_fetch() {
        let source = Arc::new(FakeSource::new(five_rows(), "1000"));
        let clock = Arc::new(FakeClock::new());
        let store = store_with(source.clone(), clock.clone(), TTL);

        store.get_cached(Window::Today).await.unwrap();
        clock.advance(Duration::from_secs(180));

        store.get_cached(Window::Today).await.unwrap();
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test]
    async fn test_stale_refresh_returns_new_data_and_advances_timestamp() {
        let source = Arc::new(FakeSource::new(five_rows(), "1000"));
        let clock = Arc::new(FakeClock::new());
        let store = store_with(source.clone(), clock.clone(), TTL);

        store.get_cached(Window::Today).await.unwrap();
        clock.advance(Duration::from_secs(180));

        let snapshot = store.get_cached(Window::Today).await.unwrap();

        assert_eq!(snapshot.top_list().len(), 5);
        assert_eq!(snapshot.bonus(), "1000");

        let now_ms = clock.now().timestamp_millis();
        let (_, last_update) = store
            .last_updates()
            .await
            .into_iter()
            .find(|(w, _)| *w == Window::Today)
            .unwrap();
        assert_eq!(last_update, now_ms);
    }

    #[tokio::test]
    async fn test_failed_refresh_serves_stale_data() {
        let source = Arc::new(FakeSource::new(five_rows(), "900"));
        let clock = Arc::new(FakeClock::new());
        let store = store_with(source.clone(), clock.clone(), TTL);

        let original = store.get_cached(Window::Today).await.unwrap();

        clock.advance(Duration::from_secs(180));
        source.set_fail(true);

        let degraded = store.get_cached(Window::Today).await.unwrap();

        assert_eq!(degraded, original, "stale snapshot must be unchanged");
        assert_eq!(degraded.bonus(), "900");
    }

    #[tokio::test]
    async fn test_cold_start_failure_propagates() {
        let source = Arc::new(FakeSource::new(five_rows(), "1000"));
        source.set_fail(true);
        let clock = Arc::new(FakeClock::new());
        let store = store_with(source, clock, TTL);

        let result = store.get_cached(Window::Today).await;

        assert!(matches!(result, Err(CacheError::Fetch(_))));
    }

    #[tokio::test]
    async fn test_refresh_replaces_rows_and_bonus_together() {
        let source = Arc::new(FakeSource::new(five_rows(), "1000"));
        let clock = Arc::new(FakeClock::new());
        let store = store_with(source.clone(), clock.clone(), TTL);

        store.get_cached(Window::Today).await.unwrap();

        source.set_data(vec![vec!["1".to_string(), "555-0199".to_string()]], "2000");
        clock.advance(Duration::from_secs(180));

        let snapshot = store.get_cached(Window::Today).await.unwrap();

        assert_eq!(snapshot.top_list().len(), 1);
        assert_eq!(snapshot.top_list()[0].phone, "555-0199");
        assert_eq!(snapshot.bonus(), "2000");
    }

    #[tokio::test]
    async fn test_force_refresh_fetches_regardless_of_ttl() {
        let source = Arc::new(FakeSource::new(five_rows(), "1000"));
        let clock = Arc::new(FakeClock::new());
        let store = store_with(source.clone(), clock, TTL);

        store.get_cached(Window::Today).await.unwrap();
        assert_eq!(source.fetches(), 1);

        store.force_refresh(&[Window::Today]).await.unwrap();
        assert_eq!(source.fetches(), 2, "force refresh must bypass TTL");

        store.get_cached(Window::Today).await.unwrap();
        assert_eq!(source.fetches(), 2, "entry is fresh again after the forced fetch");
    }

    #[tokio::test]
    async fn test_concurrent_reads_of_same_stale_window_fetch_once() {
        let mut source = FakeSource::new(five_rows(), "1000");
        source.delay = Some(Duration::from_millis(50));
        let source = Arc::new(source);
        let clock = Arc::new(FakeClock::new());
        let store = Arc::new(store_with(source.clone(), clock, TTL));

        let (a, b) = tokio::join!(store.get_cached(Window::Today), store.get_cached(Window::Today));

        a.unwrap();
        b.unwrap();
        assert_eq!(source.fetches(), 1, "same-window refreshes are serialized");
    }

    #[tokio::test]
    async fn test_distinct_windows_are_independent() {
        let source = Arc::new(FakeSource::new(five_rows(), "1000"));
        let clock = Arc::new(FakeClock::new());
        let store = store_with(source.clone(), clock, TTL);

        let today = store.get_cached(Window::Today).await.unwrap();
        let month = store.get_cached(Window::Month).await.unwrap();

        assert_eq!(source.fetches(), 2);
        assert!(matches!(today, WindowSnapshot::Daily { .. }));
        assert!(matches!(month, WindowSnapshot::Monthly { .. }));
    }

    #[tokio::test]
    async fn test_initialize_populates_every_window() {
        let source = Arc::new(FakeSource::new(five_rows(), "1000"));
        let clock = Arc::new(FakeClock::new());
        let store = store_with(source.clone(), clock, TTL);

        store.initialize().await;

        assert_eq!(source.fetches(), Window::all().len());
        for (_, last_update) in store.last_updates().await {
            assert!(last_update > 0);
        }
    }

    #[tokio::test]
    async fn test_initialize_survives_total_fetch_failure() {
        let source = Arc::new(FakeSource::new(five_rows(), "1000"));
        source.set_fail(true);
        let clock = Arc::new(FakeClock::new());
        let store = store_with(source, clock, TTL);

        store.initialize().await;

        for (_, last_update) in store.last_updates().await {
            assert_eq!(last_update, 0);
        }
    }
}
