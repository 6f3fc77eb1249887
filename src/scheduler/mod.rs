//! Phase-aware task scheduler.
//!
//! A single cooperative tick loop evaluates registered [`TaskDefinition`]s
//! against the [`PhaseWindow`](crate::phase::PhaseWindow) and the durable
//! [`TaskStateStore`], then runs the due tasks one at a time.

pub mod clock;
pub mod runner;
pub mod state;
pub mod tasks;

pub use clock::{Clock, ManualClock, SystemClock};
pub use runner::{
    Scheduler, SchedulerSnapshot, TaskBody, TaskRun, TaskRunOutcome, TaskRunReport, TaskStatus,
};
pub use state::TaskStateStore;
pub use tasks::{Cadence, DailyAnchor, DueStatus, RequiredPhase, TaskDefinition};
