//! Cache module for the time-windowed leaderboard snapshots
//!
//! This module provides an in-memory cache keyed by time window, refreshed
//! from the spreadsheet source on demand. It supports graceful degradation
//! by serving the previous snapshot when a refresh fails, so the service
//! keeps answering while the data source is unavailable.

mod store;

pub use store::{CacheError, CacheStore, Clock, SystemClock};
