//! Periodic metrics snapshot consumed by the classifier.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Realised volatility metric name.
pub const VOLATILITY: &str = "volatility";
/// Trend slope metric name (negative = falling).
pub const TREND_SLOPE: &str = "trend_slope";
/// Drawdown metric name, as a fraction of peak (0.12 = 12% off the high).
pub const DRAWDOWN: &str = "drawdown";

/// Mapping from metric name to value, as supplied by the metrics producer.
///
/// Lookups ignore NaN and infinite values so that a broken feed reads the
/// same as a missing one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsSnapshot(BTreeMap<String, f64>);

impl MetricsSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    /// Finite value for `name`, if present.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied().filter(|v| v.is_finite())
    }

    pub fn volatility(&self) -> Option<f64> {
        self.get(VOLATILITY)
    }

    pub fn trend_slope(&self) -> Option<f64> {
        self.get(TREND_SLOPE)
    }

    /// Drawdown magnitude. Feeds that report drawdown as a negative return
    /// are accepted.
    pub fn drawdown(&self) -> Option<f64> {
        self.get(DRAWDOWN).map(f64::abs)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for MetricsSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
