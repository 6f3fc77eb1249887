//! Regime classification.
//!
//! Turns noisy periodic metrics into a coarse, stable [`Regime`] label.
//! [`RegimeClassifier::classify_raw`] maps one snapshot to a label;
//! [`RegimeClassifier::analyze`] feeds that label through a pending-candidate
//! hysteresis so a single dissenting snapshot never flips the pod.

pub mod classifier;
pub mod metrics;

pub use classifier::{RegimeClassifier, RegimeState, RegimeUpdate};
pub use metrics::MetricsSnapshot;

use crate::error::PodError;
use serde::{Deserialize, Serialize};

/// Coarse market regime, in classification priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    /// Severe drawdown, or extreme volatility with a collapsing trend.
    Panic,
    /// At least one metric past its moderate threshold.
    Stressed,
    /// Low volatility, rising trend and shallow drawdown together.
    Calm,
    /// Everything else, including missing or contradictory metrics.
    Neutral,
}

impl Regime {
    /// All regimes in priority order.
    pub const ALL: [Regime; 4] = [Self::Panic, Self::Stressed, Self::Calm, Self::Neutral];

    /// Configuration label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Panic => "PANIC",
            Self::Stressed => "STRESSED",
            Self::Calm => "CALM",
            Self::Neutral => "NEUTRAL",
        }
    }
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Regime {
    type Err = PodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|r| r.label().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| PodError::Config(format!("unknown classification label '{trimmed}'")))
    }
}
