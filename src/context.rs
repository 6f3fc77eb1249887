//! Explicit pod scope passed into every component constructor.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where the pod's decisions go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PodEnvironment {
    /// Live capital.
    Live,
    /// Paper trading against live data (default).
    #[default]
    Paper,
    /// Offline replay. Nothing is written to disk.
    Backtest,
}

impl PodEnvironment {
    /// Whether task state and regime checkpoints are written to disk.
    pub fn persists_state(self) -> bool {
        !matches!(self, Self::Backtest)
    }
}

impl std::fmt::Display for PodEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Paper => write!(f, "paper"),
            Self::Backtest => write!(f, "backtest"),
        }
    }
}

/// Pod identity and storage scope.
///
/// Built once at startup and handed to the classifier, selector and
/// scheduler; nothing reads it from global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodContext {
    pod_id: String,
    environment: PodEnvironment,
    state_dir: PathBuf,
}

impl PodContext {
    /// Create a context for `pod_id` storing state under `state_dir`.
    pub fn new(
        pod_id: impl Into<String>,
        environment: PodEnvironment,
        state_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pod_id: pod_id.into(),
            environment,
            state_dir: state_dir.into(),
        }
    }

    /// In-memory context for replays and tests.
    pub fn backtest(pod_id: impl Into<String>) -> Self {
        Self::new(pod_id, PodEnvironment::Backtest, PathBuf::new())
    }

    pub fn pod_id(&self) -> &str {
        &self.pod_id
    }

    pub fn environment(&self) -> PodEnvironment {
        self.environment
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Path of the task-state file, or `None` when the environment keeps
    /// state in memory only.
    pub fn task_state_path(&self) -> Option<PathBuf> {
        self.state_file("tasks.json")
    }

    /// Path of the regime checkpoint, or `None` in backtests.
    pub fn regime_checkpoint_path(&self) -> Option<PathBuf> {
        self.state_file("regime.json")
    }

    fn state_file(&self, name: &str) -> Option<PathBuf> {
        self.environment
            .persists_state()
            .then(|| self.state_dir.join(&self.pod_id).join(name))
    }
}
