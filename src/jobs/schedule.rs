//! Fixed times-of-day job schedule
//!
//! Fires remote jobs at configured wall-clock times in a single fixed
//! timezone. The schedule is static configuration; runs log their outcome
//! and nothing else, so a failed run simply waits for its next slot.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveTime, Offset, TimeZone, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::{JobKind, JobResult, JobRunner};
use crate::cache::Clock;

/// Default timezone offset of the schedule (UTC+3)
const DEFAULT_UTC_OFFSET_HOURS: i32 = 3;

/// One schedule slot: a wall-clock time of day and the job it triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub hour: u32,
    pub minute: u32,
    pub kind: JobKind,
}

impl ScheduleEntry {
    /// Creates a schedule entry.
    pub fn at(hour: u32, minute: u32, kind: JobKind) -> Self {
        Self { hour, minute, kind }
    }
}

/// Configuration for the job schedule
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// All schedule slots, both job kinds mixed
    pub entries: Vec<ScheduleEntry>,
    /// The fixed timezone the times of day are expressed in
    pub timezone: FixedOffset,
    /// Whether the schedule loop runs at all
    pub enabled: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            entries: vec![
                ScheduleEntry::at(10, 0, JobKind::SummaryUpdate),
                ScheduleEntry::at(14, 0, JobKind::SummaryUpdate),
                ScheduleEntry::at(18, 0, JobKind::SummaryUpdate),
                ScheduleEntry::at(22, 0, JobKind::SummaryUpdate),
                ScheduleEntry::at(9, 30, JobKind::BonusUpdate),
            ],
            timezone: FixedOffset::east_opt(DEFAULT_UTC_OFFSET_HOURS * 3600)
                .unwrap_or_else(|| Utc.fix()),
            enabled: true,
        }
    }
}

/// Finds the earliest entry occurrence strictly after `now`.
///
/// Today's slot is used when its time has not passed yet, otherwise the
/// slot rolls over to tomorrow. Entries with an invalid hour/minute are
/// skipped. Returns `None` for an empty (or entirely invalid) schedule.
pub fn next_occurrence(
    now: DateTime<FixedOffset>,
    entries: &[ScheduleEntry],
) -> Option<(DateTime<FixedOffset>, JobKind)> {
    let tz = now.timezone();
    let mut best: Option<(DateTime<FixedOffset>, JobKind)> = None;

    for entry in entries {
        let Some(time) = NaiveTime::from_hms_opt(entry.hour, entry.minute, 0) else {
            continue;
        };
        let Some(mut candidate) = tz
            .from_local_datetime(&now.date_naive().and_time(time))
            .single()
        else {
            continue;
        };
        if candidate <= now {
            candidate += chrono::Duration::days(1);
        }
        match best {
            Some((when, _)) if when <= candidate => {}
            _ => best = Some((candidate, entry.kind)),
        }
    }

    best
}

/// Handle for the background schedule loop
pub struct SchedulerHandle {
    /// Flag to signal shutdown
    shutdown_tx: mpsc::Sender<()>,
}

impl SchedulerHandle {
    /// Spawns the schedule loop.
    ///
    /// The loop sleeps until the next slot, runs the job, logs the
    /// structured outcome, and repeats. The clock is injected so tests can
    /// drive the slot math deterministically through `next_occurrence`.
    pub fn spawn(config: ScheduleConfig, runner: Arc<JobRunner>, clock: Arc<dyn Clock>) -> Self {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        if config.enabled && !config.entries.is_empty() {
            tokio::spawn(async move {
                loop {
                    let now = clock.now().with_timezone(&config.timezone);
                    let Some((when, kind)) = next_occurrence(now, &config.entries) else {
                        break;
                    };
                    let wait = (when - now).to_std().unwrap_or(Duration::ZERO);
                    debug!(job = kind.label(), at = %when, "next scheduled job");

                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {
                            match runner.run(kind).await {
                                JobResult::Success { message, fast, .. } => {
                                    info!(job = kind.label(), fast, message = %message, "scheduled job succeeded");
                                }
                                JobResult::Failure { reason, .. } => {
                                    error!(job = kind.label(), error = %reason, "scheduled job failed");
                                }
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

    /// Shuts down the schedule loop.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}
