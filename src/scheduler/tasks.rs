//! Task definitions and due-ness rules.
//!
//! Defines [`TaskDefinition`], the [`Cadence`] enum for timing and the
//! [`RequiredPhase`] gate, plus the pure `should_run` predicates the runner
//! evaluates every tick.

use crate::error::{PodError, Result};
use crate::phase::Phase;
use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// How often a task should run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Cadence {
    /// Run every N minutes.
    Interval {
        /// Minutes between successful runs.
        minutes: u32,
    },
    /// Run once per UTC calendar day.
    Daily {
        /// Optional target time with a tolerance window.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        anchor: Option<DailyAnchor>,
    },
}

/// Target time of day for a daily task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyAnchor {
    /// Hour of day (0-23, UTC).
    pub hour: u8,
    /// Minute of hour (0-59).
    pub min: u8,
    /// Minutes after the target during which the task may still start.
    #[serde(default)]
    pub tolerance_mins: u32,
}

impl DailyAnchor {
    fn target(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(u32::from(self.hour), u32::from(self.min), 0)
    }

    /// `[target, target + tolerance]` for the day of `now`.
    fn window_on(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = now.date_naive().and_time(self.target()?).and_utc();
        let end = start + Duration::minutes(i64::from(self.tolerance_mins));
        Some((start, end))
    }
}

impl Cadence {
    /// # Errors
    /// Returns `PodError::Config` for a zero interval or an impossible
    /// target time, and `PodError::Unsupported` for a daily window running
    /// past midnight UTC.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Interval { minutes } if *minutes == 0 => Err(PodError::Config(
                "interval cadence must be at least one minute".to_owned(),
            )),
            Self::Interval { .. } | Self::Daily { anchor: None } => Ok(()),
            Self::Daily {
                anchor: Some(anchor),
            } => {
                let target = anchor.target().ok_or_else(|| {
                    PodError::Config(format!(
                        "daily target {:02}:{:02} is not a valid UTC time",
                        anchor.hour, anchor.min
                    ))
                })?;
                let secs_left = 86_400 - i64::from(target.num_seconds_from_midnight());
                if i64::from(anchor.tolerance_mins) * 60 >= secs_left {
                    return Err(PodError::Unsupported(format!(
                        "daily window {target} + {} min crosses midnight UTC",
                        anchor.tolerance_mins
                    )));
                }
                Ok(())
            }
        }
    }
}

impl std::fmt::Display for Cadence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interval { minutes } => {
                if *minutes >= 60 && minutes % 60 == 0 {
                    write!(f, "every {} hours", minutes / 60)
                } else {
                    write!(f, "every {minutes} minutes")
                }
            }
            Self::Daily { anchor: None } => write!(f, "once daily (UTC)"),
            Self::Daily {
                anchor: Some(a),
            } => write!(
                f,
                "daily at {:02}:{:02} UTC (+{} min)",
                a.hour, a.min, a.tolerance_mins
            ),
        }
    }
}

/// Phase a task is allowed to run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredPhase {
    Decision,
    Maintenance,
    Any,
}

impl RequiredPhase {
    pub fn admits(self, phase: Phase) -> bool {
        match self {
            Self::Any => true,
            Self::Decision => phase == Phase::Decision,
            Self::Maintenance => phase == Phase::Maintenance,
        }
    }
}

/// Why a task is or is not due right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueStatus {
    /// Run it.
    Due,
    /// Current phase does not admit the task.
    PhaseMismatch,
    /// Cadence has not elapsed, or the daily window has not opened yet.
    NotYetDue,
    /// Daily task has already succeeded today.
    AlreadyRanToday,
    /// Daily window for today has closed without a run.
    MissedWindow,
}

impl DueStatus {
    pub fn is_due(self) -> bool {
        self == Self::Due
    }
}

/// An immutable scheduled task definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Unique task name; also the key in the task-state file.
    pub name: String,
    pub cadence: Cadence,
    pub phase: RequiredPhase,
}

impl TaskDefinition {
    pub fn new(name: impl Into<String>, cadence: Cadence, phase: RequiredPhase) -> Self {
        Self {
            name: name.into(),
            cadence,
            phase,
        }
    }

    /// # Errors
    /// Returns a configuration error for an empty name or invalid cadence.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PodError::Config("task name must not be empty".to_owned()));
        }
        self.cadence.validate().map_err(|e| match e {
            PodError::Config(msg) => PodError::Config(format!("task '{}': {msg}", self.name)),
            PodError::Unsupported(msg) => {
                PodError::Unsupported(format!("task '{}': {msg}", self.name))
            }
            other => other,
        })
    }

    /// Evaluate due-ness given the last successful run.
    pub fn due_status(
        &self,
        last_run: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        phase: Phase,
    ) -> DueStatus {
        if !self.phase.admits(phase) {
            return DueStatus::PhaseMismatch;
        }
        match &self.cadence {
            Cadence::Interval { minutes } => {
                if should_run_interval(last_run, now, *minutes) {
                    DueStatus::Due
                } else {
                    DueStatus::NotYetDue
                }
            }
            Cadence::Daily { anchor } => daily_status(last_run, now, anchor.as_ref()),
        }
    }

    /// Whether the task should run at `now` in `phase`.
    pub fn should_run(
        &self,
        last_run: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        phase: Phase,
    ) -> bool {
        self.due_status(last_run, now, phase).is_due()
    }
}

/// Interval rule: due when never run or `now - last >= interval`.
pub fn should_run_interval(last_run: Option<DateTime<Utc>>, now: DateTime<Utc>, minutes: u32) -> bool {
    match last_run {
        None => true,
        Some(last) => now.signed_duration_since(last) >= Duration::minutes(i64::from(minutes)),
    }
}

/// Daily rule: due once per UTC calendar day, inside the anchor window when
/// one is configured.
pub fn should_run_daily(
    last_run: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    anchor: Option<&DailyAnchor>,
) -> bool {
    daily_status(last_run, now, anchor).is_due()
}

fn daily_status(
    last_run: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    anchor: Option<&DailyAnchor>,
) -> DueStatus {
    if last_run.is_some_and(|last| last.date_naive() == now.date_naive()) {
        return DueStatus::AlreadyRanToday;
    }
    let Some(anchor) = anchor else {
        return DueStatus::Due;
    };
    match anchor.window_on(now) {
        Some((start, _)) if now < start => DueStatus::NotYetDue,
        Some((_, end)) if now > end => DueStatus::MissedWindow,
        Some(_) => DueStatus::Due,
        None => DueStatus::NotYetDue,
    }
}
