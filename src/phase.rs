//! Decision / maintenance phase window.
//!
//! A daily UTC window `[start, end)` is maintenance; every other instant is
//! decision time. Windows that cross midnight are not supported and are
//! rejected when the window is built.

use crate::config::PhaseConfig;
use crate::error::{PodError, Result};
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Pod phase at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Live decision-making.
    Decision,
    /// Offline maintenance; no live decisions.
    Maintenance,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decision => write!(f, "decision"),
            Self::Maintenance => write!(f, "maintenance"),
        }
    }
}

/// Validated maintenance window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl PhaseWindow {
    /// Build a window from UTC times of day.
    ///
    /// # Errors
    /// Returns `PodError::Config` unless `start < end`.
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self> {
        if start >= end {
            return Err(PodError::Config(format!(
                "maintenance window start {start} must be earlier than end {end} \
                 (windows crossing midnight UTC are not supported)"
            )));
        }
        Ok(Self { start, end })
    }

    /// Build a window from the `[phase]` config section.
    ///
    /// # Errors
    /// Returns `PodError::Config` for unparseable times or a reversed window.
    pub fn from_config(config: &PhaseConfig) -> Result<Self> {
        let start = parse_time_of_day("phase.maintenance_start", &config.maintenance_start)?;
        let end = parse_time_of_day("phase.maintenance_end", &config.maintenance_end)?;
        Self::new(start, end)
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    /// Phase at `now`.
    pub fn phase_at(&self, now: DateTime<Utc>) -> Phase {
        if self.is_maintenance(now) {
            Phase::Maintenance
        } else {
            Phase::Decision
        }
    }

    /// Whether `now` falls inside `[start, end)`.
    pub fn is_maintenance(&self, now: DateTime<Utc>) -> bool {
        let t = now.time();
        self.start <= t && t < self.end
    }
}

/// Parse `HH:MM` or `HH:MM:SS`.
pub(crate) fn parse_time_of_day(field: &str, value: &str) -> Result<NaiveTime> {
    let trimmed = value.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .map_err(|e| PodError::Config(format!("{field} '{trimmed}' is not a UTC time of day: {e}")))
}
