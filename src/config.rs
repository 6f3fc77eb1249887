//! Configuration types for the pod control plane.
//!
//! Loaded once at startup from TOML. Every section validates at
//! construction time so a misconfigured pod fails before its loop starts.

use crate::context::{PodContext, PodEnvironment};
use crate::error::{PodError, Result};
use crate::phase::PhaseWindow;
use crate::regime::Regime;
use crate::scheduler::tasks::Cadence;
use crate::selector::WorkloadSelector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PodConfig {
    /// Pod identity, environment and capital.
    pub pod: PodSection,
    /// Regime classifier thresholds and hysteresis.
    pub regime: RegimeConfig,
    /// Workload selection limits.
    pub selector: SelectorConfig,
    /// Closed catalog of workloads this pod knows about.
    pub workloads: Vec<WorkloadSpec>,
    /// Classification label → eligible workload ids.
    pub eligibility: BTreeMap<String, Vec<String>>,
    /// Daily maintenance window.
    pub phase: PhaseConfig,
    /// Tick loop settings and built-in task cadences.
    pub scheduler: SchedulerConfig,
    /// File locations of the external collaborators used by the host binary.
    pub io: IoConfig,
    /// Log filtering and optional file output.
    pub logging: LoggingConfig,
}

/// Pod identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PodSection {
    /// Identifier used in log fields and state paths.
    pub id: String,
    /// Live, paper or backtest.
    pub environment: PodEnvironment,
    /// Root directory for persisted state (None = platform data dir).
    pub state_dir: Option<PathBuf>,
    /// Capital available to the selector each decision cycle.
    pub capital: f64,
}

impl Default for PodSection {
    fn default() -> Self {
        Self {
            id: "default".to_owned(),
            environment: PodEnvironment::default(),
            state_dir: None,
            capital: 100_000.0,
        }
    }
}

/// Regime classifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    /// Consecutive identical dissenting classifications needed to flip.
    pub hysteresis_count: u32,
    /// Raw classifications kept in the rolling history.
    pub history_len: usize,
    /// Classification thresholds.
    pub thresholds: RegimeThresholds,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            hysteresis_count: 3,
            history_len: 32,
            thresholds: RegimeThresholds::default(),
        }
    }
}

impl RegimeConfig {
    /// Check hysteresis and threshold sanity.
    ///
    /// # Errors
    /// Returns `PodError::Config` when hysteresis is below two or the
    /// thresholds are malformed.
    pub fn validate(&self) -> Result<()> {
        if self.hysteresis_count < 2 {
            return Err(PodError::Config(format!(
                "regime.hysteresis_count must be at least 2, got {}",
                self.hysteresis_count
            )));
        }
        if self.history_len == 0 {
            return Err(PodError::Config(
                "regime.history_len must be at least 1".to_owned(),
            ));
        }
        self.thresholds.validate()
    }
}

/// Metric thresholds for raw classification.
///
/// Drawdown and volatility cross a threshold when `>=` it; trend crosses a
/// negative threshold when `<=` it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeThresholds {
    /// Drawdown that alone forces PANIC.
    pub panic_drawdown: f64,
    /// Volatility that, with a strongly negative trend, forces PANIC.
    pub panic_volatility: f64,
    /// Strongly negative trend paired with `panic_volatility`.
    pub panic_trend: f64,
    /// Moderate drawdown for STRESSED.
    pub stressed_drawdown: f64,
    /// Moderate volatility for STRESSED.
    pub stressed_volatility: f64,
    /// Moderately negative trend for STRESSED.
    pub stressed_trend: f64,
    /// CALM requires volatility at or below this.
    pub calm_volatility: f64,
    /// CALM requires trend strictly above this.
    pub calm_trend: f64,
    /// CALM requires drawdown at or below this.
    pub calm_drawdown: f64,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            panic_drawdown: 0.20,
            panic_volatility: 0.45,
            panic_trend: -0.02,
            stressed_drawdown: 0.10,
            stressed_volatility: 0.30,
            stressed_trend: -0.01,
            calm_volatility: 0.15,
            calm_trend: 0.0,
            calm_drawdown: 0.05,
        }
    }
}

impl RegimeThresholds {
    /// Reject non-finite values and mis-ordered bands.
    ///
    /// # Errors
    /// Returns `PodError::Config` describing the first offending threshold.
    pub fn validate(&self) -> Result<()> {
        let named = [
            ("panic_drawdown", self.panic_drawdown),
            ("panic_volatility", self.panic_volatility),
            ("panic_trend", self.panic_trend),
            ("stressed_drawdown", self.stressed_drawdown),
            ("stressed_volatility", self.stressed_volatility),
            ("stressed_trend", self.stressed_trend),
            ("calm_volatility", self.calm_volatility),
            ("calm_trend", self.calm_trend),
            ("calm_drawdown", self.calm_drawdown),
        ];
        if let Some((name, value)) = named.iter().find(|(_, v)| !v.is_finite()) {
            return Err(PodError::Config(format!(
                "regime.thresholds.{name} must be finite, got {value}"
            )));
        }

        let ordered = [
            (
                "calm_drawdown < stressed_drawdown < panic_drawdown",
                0.0 <= self.calm_drawdown
                    && self.calm_drawdown < self.stressed_drawdown
                    && self.stressed_drawdown < self.panic_drawdown,
            ),
            (
                "calm_volatility < stressed_volatility < panic_volatility",
                0.0 <= self.calm_volatility
                    && self.calm_volatility < self.stressed_volatility
                    && self.stressed_volatility < self.panic_volatility,
            ),
            (
                "panic_trend < stressed_trend <= calm_trend",
                self.panic_trend < self.stressed_trend && self.stressed_trend <= self.calm_trend,
            ),
        ];
        match ordered.iter().find(|(_, ok)| !ok) {
            Some((rule, _)) => Err(PodError::Config(format!(
                "regime.thresholds must satisfy {rule}"
            ))),
            None => Ok(()),
        }
    }
}

/// Workload selection limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Maximum workloads active in one cycle.
    pub max_concurrent: usize,
    /// Largest share of available capital one workload may receive.
    pub allocation_cap_pct: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            allocation_cap_pct: 0.4,
        }
    }
}

impl SelectorConfig {
    /// # Errors
    /// Returns `PodError::Config` for a zero concurrency limit or a cap
    /// outside `(0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(PodError::Config(
                "selector.max_concurrent must be at least 1".to_owned(),
            ));
        }
        if !(self.allocation_cap_pct > 0.0 && self.allocation_cap_pct <= 1.0) {
            return Err(PodError::Config(format!(
                "selector.allocation_cap_pct must be in (0, 1], got {}",
                self.allocation_cap_pct
            )));
        }
        Ok(())
    }
}

/// One entry of the workload catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    /// Unique workload id.
    pub id: String,
    /// Disabled workloads are never selected.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Maximum simultaneous open positions.
    #[serde(default = "default_max_positions")]
    pub max_positions: u32,
    /// Largest single position as a share of the workload's allocation.
    #[serde(default = "default_max_position_pct")]
    pub max_position_pct: f64,
}

fn default_enabled() -> bool {
    true
}

fn default_max_positions() -> u32 {
    5
}

fn default_max_position_pct() -> f64 {
    0.25
}

impl WorkloadSpec {
    /// Enabled workload with default risk caps.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            max_positions: default_max_positions(),
            max_position_pct: default_max_position_pct(),
        }
    }
}

/// Daily UTC maintenance window; everything outside it is decision time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseConfig {
    /// Window start, `HH:MM` or `HH:MM:SS` UTC (inclusive).
    pub maintenance_start: String,
    /// Window end, `HH:MM` or `HH:MM:SS` UTC (exclusive).
    pub maintenance_end: String,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            maintenance_start: "21:00".to_owned(),
            maintenance_end: "23:30".to_owned(),
        }
    }
}

/// Scheduler loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between ticks.
    pub tick_interval_secs: u64,
    /// Run reports kept in memory.
    pub history_limit: usize,
    /// Cadence of the classify → select cycle.
    pub decision_cycle: Cadence,
    /// Cadence of the exit review.
    pub exit_review: Cadence,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            history_limit: 400,
            decision_cycle: Cadence::Interval { minutes: 5 },
            exit_review: Cadence::Interval { minutes: 15 },
        }
    }
}

impl SchedulerConfig {
    /// # Errors
    /// Returns `PodError::Config` for a zero tick interval or invalid cadence.
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_secs == 0 {
            return Err(PodError::Config(
                "scheduler.tick_interval_secs must be at least 1".to_owned(),
            ));
        }
        self.decision_cycle.validate()?;
        self.exit_review.validate()
    }
}

/// File-backed collaborator locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// JSON metrics snapshot written by the metrics producer.
    pub metrics_path: Option<PathBuf>,
    /// Where the latest allocations are published for signal generation.
    pub allocations_path: Option<PathBuf>,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub filter: String,
    /// Directory for daily rolling log files (None = stderr only).
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "podwarden=info".to_owned(),
            directory: None,
        }
    }
}

impl PodConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| PodError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| PodError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/podwarden/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("podwarden").join("config.toml")
        } else if let Some(dir) = dirs::config_dir() {
            dir.join("podwarden").join("config.toml")
        } else {
            PathBuf::from("/tmp/podwarden-config/config.toml")
        }
    }

    /// Build the pod context described by the `[pod]` section.
    pub fn context(&self) -> PodContext {
        let state_dir = self.pod.state_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .map(|d| d.join("podwarden"))
                .unwrap_or_else(|| PathBuf::from("podwarden-state"))
        });
        PodContext::new(self.pod.id.clone(), self.pod.environment, state_dir)
    }

    /// Parsed eligibility table; unknown labels are rejected.
    ///
    /// # Errors
    /// Returns `PodError::Config` naming the first unknown label.
    pub fn eligibility_by_regime(&self) -> Result<BTreeMap<Regime, Vec<String>>> {
        let mut table = BTreeMap::new();
        for (label, ids) in &self.eligibility {
            let regime: Regime = label.parse()?;
            if table.insert(regime, ids.clone()).is_some() {
                return Err(PodError::Config(format!(
                    "classification '{regime}' listed more than once in eligibility"
                )));
            }
        }
        Ok(table)
    }

    /// Run every construction-time check without starting anything.
    ///
    /// # Errors
    /// Returns the first configuration error found.
    pub fn validate(&self) -> Result<()> {
        if self.pod.id.trim().is_empty() {
            return Err(PodError::Config("pod.id must not be empty".to_owned()));
        }
        if !(self.pod.capital.is_finite() && self.pod.capital >= 0.0) {
            return Err(PodError::Config(format!(
                "pod.capital must be a non-negative number, got {}",
                self.pod.capital
            )));
        }
        self.regime.validate()?;
        self.scheduler.validate()?;
        PhaseWindow::from_config(&self.phase)?;
        WorkloadSelector::from_config(&self.context(), self)?;
        Ok(())
    }
}
