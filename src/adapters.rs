//! File-backed collaborators for the decision cycle.
//!
//! The metrics producer drops a JSON object of `name → number` on disk and
//! downstream signal generation picks up the latest allocations from another
//! JSON file. Both files are plain text for operational inspection.

use crate::cycle::{AllocationSink, CycleOutcome, MetricsSource};
use crate::error::{PodError, Result};
use crate::persist::write_json_atomic;
use crate::regime::MetricsSnapshot;
use std::path::{Path, PathBuf};
use tracing::info;

/// Reads the metrics snapshot from a JSON file on every cycle.
#[derive(Debug, Clone)]
pub struct JsonFileMetricsSource {
    path: PathBuf,
}

impl JsonFileMetricsSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricsSource for JsonFileMetricsSource {
    fn snapshot(&mut self) -> Result<MetricsSnapshot> {
        let bytes = std::fs::read(&self.path).map_err(|e| {
            PodError::Task(format!(
                "cannot read metrics '{}': {e}",
                self.path.display()
            ))
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            PodError::Task(format!(
                "cannot parse metrics '{}': {e}",
                self.path.display()
            ))
        })
    }
}

/// Publishes each cycle outcome by atomically replacing a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileAllocationSink {
    path: PathBuf,
}

impl JsonFileAllocationSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AllocationSink for JsonFileAllocationSink {
    fn publish(&mut self, outcome: &CycleOutcome) -> Result<()> {
        write_json_atomic(&self.path, outcome)
    }
}

/// Logs allocations instead of handing them to anyone.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAllocationSink;

impl AllocationSink for LogAllocationSink {
    fn publish(&mut self, outcome: &CycleOutcome) -> Result<()> {
        for alloc in &outcome.allocations {
            info!(
                cycle = %outcome.cycle_id,
                workload = %alloc.workload,
                regime = %alloc.regime,
                capital = alloc.capital,
                max_positions = alloc.caps.max_positions,
                "allocation"
            );
        }
        if outcome.allocations.is_empty() {
            info!(cycle = %outcome.cycle_id, regime = %outcome.regime, "no active workloads");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::regime::Regime;
    use uuid::Uuid;

    #[test]
    fn reads_metrics_object() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("metrics.json");
        std::fs::write(
            &path,
            r#"{"volatility": 0.12, "trend_slope": 0.004, "drawdown": -0.03, "breadth": 0.6}"#,
        )
        .unwrap();

        let snapshot = JsonFileMetricsSource::new(&path).snapshot().unwrap();
        assert_eq!(snapshot.volatility(), Some(0.12));
        assert_eq!(snapshot.drawdown(), Some(0.03));
        assert_eq!(snapshot.get("breadth"), Some(0.6));
    }

    #[test]
    fn missing_or_malformed_metrics_fail_the_task() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("metrics.json");
        let mut source = JsonFileMetricsSource::new(&path);
        assert!(matches!(source.snapshot(), Err(PodError::Task(_))));

        std::fs::write(&path, r#"{"volatility": "high"}"#).unwrap();
        assert!(matches!(source.snapshot(), Err(PodError::Task(_))));
    }

    #[test]
    fn sink_replaces_file_with_latest_outcome() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out").join("allocations.json");
        let mut sink = JsonFileAllocationSink::new(&path);
        let outcome = CycleOutcome {
            cycle_id: Uuid::new_v4(),
            regime: Regime::Neutral,
            transitioned: false,
            previous: Some(Regime::Neutral),
            capital: 1_000.0,
            allocations: Vec::new(),
            deactivated: Vec::new(),
        };
        sink.publish(&outcome).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["regime"], "NEUTRAL");
        assert!(raw["allocations"].as_array().unwrap().is_empty());
    }
}
