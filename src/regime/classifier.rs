//! Regime classifier with pending-candidate hysteresis.

use super::{MetricsSnapshot, Regime};
use crate::config::{RegimeConfig, RegimeThresholds};
use crate::context::PodContext;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info};

/// Mutable classifier state. Serializable so it can be checkpointed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegimeState {
    /// Confirmed regime; `None` until the first analysis.
    pub current: Option<Regime>,
    /// Candidate collecting consecutive confirmations.
    pub pending: Option<Regime>,
    /// Consecutive raw classifications matching `pending`.
    pub confirmations: u32,
    /// Most recent raw classifications, oldest first.
    #[serde(default)]
    pub history: VecDeque<Regime>,
}

/// Result of one [`RegimeClassifier::analyze`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegimeUpdate {
    /// Raw classification of this snapshot.
    pub raw: Regime,
    /// Confirmed regime after this snapshot.
    pub current: Regime,
    /// Confirmed regime before this snapshot (`None` on the first call).
    pub previous: Option<Regime>,
    /// Whether `current` changed away from an earlier confirmed regime.
    pub transitioned: bool,
    /// State after this snapshot.
    pub state: RegimeState,
}

/// Converts metrics snapshots into a stable regime.
///
/// Deterministic and I/O free: the same snapshot sequence always yields the
/// same update sequence.
#[derive(Debug, Clone)]
pub struct RegimeClassifier {
    pod_id: String,
    thresholds: RegimeThresholds,
    hysteresis_count: u32,
    history_len: usize,
    state: RegimeState,
}

impl RegimeClassifier {
    /// Create a classifier for the pod in `ctx`.
    ///
    /// # Errors
    /// Returns `PodError::Config` when `config` fails validation.
    pub fn new(ctx: &PodContext, config: &RegimeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pod_id: ctx.pod_id().to_owned(),
            thresholds: config.thresholds.clone(),
            hysteresis_count: config.hysteresis_count,
            history_len: config.history_len,
            state: RegimeState::default(),
        })
    }

    /// Resume from a checkpointed state.
    pub fn restore(&mut self, mut state: RegimeState) {
        if state.pending.is_some() && state.pending == state.current {
            state.pending = None;
        }
        if state.pending.is_none() {
            state.confirmations = 0;
        }
        while state.history.len() > self.history_len {
            state.history.pop_front();
        }
        self.state = state;
    }

    pub fn state(&self) -> &RegimeState {
        &self.state
    }

    /// Confirmed regime, if any snapshot has been analysed.
    pub fn current(&self) -> Option<Regime> {
        self.state.current
    }

    pub fn hysteresis_count(&self) -> u32 {
        self.hysteresis_count
    }

    /// Classify one snapshot without touching state.
    ///
    /// Priority order is PANIC, STRESSED, CALM, then NEUTRAL. A missing
    /// metric never satisfies a condition.
    pub fn classify_raw(&self, metrics: &MetricsSnapshot) -> Regime {
        let t = &self.thresholds;
        let vol = metrics.volatility();
        let trend = metrics.trend_slope();
        let drawdown = metrics.drawdown();

        let at_least = |value: Option<f64>, threshold: f64| value.is_some_and(|v| v >= threshold);
        let at_most = |value: Option<f64>, threshold: f64| value.is_some_and(|v| v <= threshold);

        if at_least(drawdown, t.panic_drawdown)
            || (at_least(vol, t.panic_volatility) && at_most(trend, t.panic_trend))
        {
            return Regime::Panic;
        }

        if at_least(drawdown, t.stressed_drawdown)
            || at_least(vol, t.stressed_volatility)
            || at_most(trend, t.stressed_trend)
        {
            return Regime::Stressed;
        }

        if at_most(vol, t.calm_volatility)
            && trend.is_some_and(|v| v > t.calm_trend)
            && at_most(drawdown, t.calm_drawdown)
        {
            return Regime::Calm;
        }

        Regime::Neutral
    }

    /// Classify `metrics` and advance the hysteresis state machine.
    pub fn analyze(&mut self, metrics: &MetricsSnapshot) -> RegimeUpdate {
        let raw = self.classify_raw(metrics);
        debug!(
            pod = %self.pod_id,
            raw = %raw,
            volatility = ?metrics.volatility(),
            trend_slope = ?metrics.trend_slope(),
            drawdown = ?metrics.drawdown(),
            "raw regime classification"
        );
        self.observe(raw)
    }

    /// Advance the state machine with an already-classified label.
    ///
    /// A raw label equal to `current` clears the pending candidate. A label
    /// matching the candidate adds a confirmation. Any other label replaces
    /// the candidate with a fresh count of one, so votes for two different
    /// challengers never add up.
    pub fn observe(&mut self, raw: Regime) -> RegimeUpdate {
        self.push_history(raw);
        let previous = self.state.current;

        let Some(current) = previous else {
            info!(pod = %self.pod_id, regime = %raw, "initial regime adopted");
            self.state.current = Some(raw);
            self.state.pending = None;
            self.state.confirmations = 0;
            return self.update(raw, raw, None, false);
        };

        if raw == current {
            if self.state.pending.take().is_some() {
                debug!(pod = %self.pod_id, regime = %current, "pending regime candidate dropped");
            }
            self.state.confirmations = 0;
            return self.update(raw, current, previous, false);
        }

        if self.state.pending == Some(raw) {
            self.state.confirmations = self.state.confirmations.saturating_add(1);
        } else {
            self.state.pending = Some(raw);
            self.state.confirmations = 1;
        }

        if self.state.confirmations >= self.hysteresis_count {
            info!(
                pod = %self.pod_id,
                from = %current,
                to = %raw,
                confirmations = self.state.confirmations,
                "regime transition"
            );
            self.state.current = Some(raw);
            self.state.pending = None;
            self.state.confirmations = 0;
            return self.update(raw, raw, previous, true);
        }

        debug!(
            pod = %self.pod_id,
            current = %current,
            candidate = %raw,
            confirmations = self.state.confirmations,
            required = self.hysteresis_count,
            "regime candidate pending"
        );
        self.update(raw, current, previous, false)
    }

    fn push_history(&mut self, raw: Regime) {
        self.state.history.push_back(raw);
        while self.state.history.len() > self.history_len {
            self.state.history.pop_front();
        }
    }

    fn update(
        &self,
        raw: Regime,
        current: Regime,
        previous: Option<Regime>,
        transitioned: bool,
    ) -> RegimeUpdate {
        RegimeUpdate {
            raw,
            current,
            previous,
            transitioned,
            state: self.state.clone(),
        }
    }
}
