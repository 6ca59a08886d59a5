//! Remote report-generation jobs
//!
//! This module triggers long-running remote jobs over HTTP and observes
//! their completion: `runner` performs a single invocation with bounded
//! wait-and-poll semantics, `schedule` fires invocations at fixed times of
//! day.

mod runner;
mod schedule;

pub use runner::{JobConfig, JobKind, JobMode, JobResult, JobRunner};
pub use schedule::{next_occurrence, ScheduleConfig, ScheduleEntry, SchedulerHandle};
