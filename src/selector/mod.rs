//! Workload selection.
//!
//! Maps the confirmed regime and the capital on hand to a bounded,
//! deterministic list of [`WorkloadAllocation`]s for downstream signal
//! generation.

pub mod catalog;

pub use catalog::{WorkloadCatalog, WorkloadId};

use crate::config::{PodConfig, SelectorConfig};
use crate::context::PodContext;
use crate::error::Result;
use crate::regime::Regime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Position and risk limits attached to one allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskCaps {
    /// Maximum simultaneous open positions.
    pub max_positions: u32,
    /// Largest capital committed to one position.
    pub max_position_capital: f64,
}

/// Capital and limits granted to one workload for one decision cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadAllocation {
    pub workload: WorkloadId,
    /// Regime the workload was selected under.
    pub regime: Regime,
    pub capital: f64,
    pub caps: RiskCaps,
}

/// Chooses active workloads per regime.
#[derive(Debug, Clone)]
pub struct WorkloadSelector {
    pod_id: String,
    catalog: WorkloadCatalog,
    eligibility: BTreeMap<Regime, BTreeSet<WorkloadId>>,
    max_concurrent: usize,
    allocation_cap_pct: f64,
}

impl WorkloadSelector {
    /// Build a selector from an explicit catalog and eligibility table.
    ///
    /// # Errors
    /// Returns `PodError::Config` for invalid limits or eligibility entries
    /// naming undeclared workloads.
    pub fn new(
        ctx: &PodContext,
        config: &SelectorConfig,
        catalog: WorkloadCatalog,
        eligibility: &BTreeMap<Regime, Vec<String>>,
    ) -> Result<Self> {
        config.validate()?;

        let mut table = BTreeMap::new();
        for (regime, ids) in eligibility {
            let resolved = ids
                .iter()
                .map(|id| catalog.resolve(id))
                .collect::<Result<BTreeSet<_>>>()?;
            table.insert(*regime, resolved);
        }

        Ok(Self {
            pod_id: ctx.pod_id().to_owned(),
            catalog,
            eligibility: table,
            max_concurrent: config.max_concurrent,
            allocation_cap_pct: config.allocation_cap_pct,
        })
    }

    /// Build a selector from the full pod configuration.
    ///
    /// # Errors
    /// Returns the first configuration error in `[selector]`, `[[workloads]]`
    /// or `[eligibility]`.
    pub fn from_config(ctx: &PodContext, config: &PodConfig) -> Result<Self> {
        let catalog = WorkloadCatalog::new(&config.workloads)?;
        let eligibility = config.eligibility_by_regime()?;
        Self::new(ctx, &config.selector, catalog, &eligibility)
    }

    pub fn catalog(&self) -> &WorkloadCatalog {
        &self.catalog
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn allocation_cap_pct(&self) -> f64 {
        self.allocation_cap_pct
    }

    /// Enabled workloads eligible under `regime`, in id order, before the
    /// concurrency cap.
    pub fn eligible(&self, regime: Regime) -> Vec<&WorkloadId> {
        self.eligibility
            .get(&regime)
            .into_iter()
            .flatten()
            .filter(|id| self.catalog.is_enabled(id))
            .collect()
    }

    /// Select and size the active workloads for one cycle.
    ///
    /// Each selected workload receives `min(capital / n, capital × cap)`,
    /// rounded down to the cent. An empty result means no workload is
    /// active this cycle. Negative or non-finite capital is treated as zero.
    pub fn select(&self, regime: Regime, capital: f64) -> Vec<WorkloadAllocation> {
        let capital = if capital.is_finite() {
            capital.max(0.0)
        } else {
            0.0
        };

        let chosen: Vec<&WorkloadId> = self
            .eligible(regime)
            .into_iter()
            .take(self.max_concurrent)
            .collect();

        if chosen.is_empty() {
            debug!(pod = %self.pod_id, regime = %regime, "no eligible workloads");
            return Vec::new();
        }

        let per_workload = allocation_per_workload(capital, chosen.len(), self.allocation_cap_pct);

        let allocations: Vec<WorkloadAllocation> = chosen
            .into_iter()
            .map(|id| {
                let (max_positions, max_position_pct) = self
                    .catalog
                    .spec(id)
                    .map(|s| (s.max_positions, s.max_position_pct))
                    .unwrap_or((0, 0.0));
                WorkloadAllocation {
                    workload: id.clone(),
                    regime,
                    capital: per_workload,
                    caps: RiskCaps {
                        max_positions,
                        max_position_capital: per_workload * max_position_pct,
                    },
                }
            })
            .collect();

        debug!(
            pod = %self.pod_id,
            regime = %regime,
            selected = allocations.len(),
            per_workload,
            "workloads selected"
        );
        allocations
    }
}

fn allocation_per_workload(capital: f64, count: usize, cap_pct: f64) -> f64 {
    let exact = (capital / count as f64).min(capital * cap_pct);
    let mut per_workload = ((exact * 100.0).floor() / 100.0).min(exact).max(0.0);
    // A cent value is rarely exact in f64; step down until the summed
    // allocations fit.
    while per_workload > 0.0 && summed(per_workload, count) > capital {
        per_workload = f64::from_bits(per_workload.to_bits() - 1);
    }
    per_workload
}

fn summed(per_workload: f64, count: usize) -> f64 {
    (0..count).fold(0.0, |total, _| total + per_workload)
}
