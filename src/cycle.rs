//! Classify → select decision cycle.
//!
//! One [`DecisionCycle::run_once`] pulls a metrics snapshot, advances the
//! regime classifier, sizes the active workloads and hands them to an
//! [`AllocationSink`]. Classification always completes before selection,
//! and a failing collaborator fails the whole cycle so the scheduler can
//! retry it.

use crate::context::PodContext;
use crate::error::{PodError, Result};
use crate::persist::{read_json, write_json_atomic};
use crate::regime::{MetricsSnapshot, Regime, RegimeClassifier, RegimeState};
use crate::scheduler::TaskBody;
use crate::selector::{WorkloadAllocation, WorkloadId, WorkloadSelector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Supplies the metrics snapshot for one cycle.
pub trait MetricsSource: Send {
    /// # Errors
    /// Any error fails the cycle; it is retried on a later tick.
    fn snapshot(&mut self) -> Result<MetricsSnapshot>;
}

/// Supplies the capital available for allocation.
pub trait CapitalSource: Send {
    /// # Errors
    /// Any error fails the cycle.
    fn available_capital(&mut self) -> Result<f64>;
}

/// Receives each cycle's allocations for downstream signal generation.
pub trait AllocationSink: Send {
    /// # Errors
    /// Any error fails the cycle; the active set is left unchanged.
    fn publish(&mut self, outcome: &CycleOutcome) -> Result<()>;
}

/// Constant capital figure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedCapital(pub f64);

impl CapitalSource for FixedCapital {
    fn available_capital(&mut self) -> Result<f64> {
        Ok(self.0)
    }
}

/// Result of one decision cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleOutcome {
    pub cycle_id: Uuid,
    /// Confirmed regime used for selection.
    pub regime: Regime,
    pub transitioned: bool,
    /// Confirmed regime before this cycle.
    pub previous: Option<Regime>,
    pub capital: f64,
    pub allocations: Vec<WorkloadAllocation>,
    /// Workloads active in the previous cycle but not in this one.
    pub deactivated: Vec<WorkloadId>,
}

impl CycleOutcome {
    pub fn active(&self) -> impl Iterator<Item = &WorkloadId> {
        self.allocations.iter().map(|a| &a.workload)
    }

    pub fn summary(&self) -> String {
        let ids: Vec<&str> = self.active().map(WorkloadId::as_str).collect();
        let mut text = format!("regime {}: ", self.regime);
        if ids.is_empty() {
            text.push_str("no active workloads");
        } else {
            text.push_str(&ids.join(", "));
        }
        if !self.deactivated.is_empty() {
            let off: Vec<&str> = self.deactivated.iter().map(WorkloadId::as_str).collect();
            text.push_str(&format!("; winding down {}", off.join(", ")));
        }
        text
    }
}

/// Workloads that lost their allocation and still need positions closed.
///
/// Shared between the decision cycle, which fills it, and the exit review,
/// which drains it once a workload has no open trades left.
#[derive(Debug, Clone, Default)]
pub struct WindDownQueue {
    inner: Arc<Mutex<BTreeSet<WorkloadId>>>,
}

impl WindDownQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend<'a>(&self, ids: impl IntoIterator<Item = &'a WorkloadId>) {
        let mut set = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        set.extend(ids.into_iter().cloned());
    }

    /// Drop `id`, e.g. when it has been reactivated or fully closed.
    pub fn remove(&self, id: &WorkloadId) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
    }

    pub fn contains(&self, id: &WorkloadId) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(id)
    }

    /// Current members in id order.
    pub fn members(&self) -> Vec<WorkloadId> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }
}

/// Regime classification followed by workload selection.
pub struct DecisionCycle {
    pod_id: String,
    classifier: RegimeClassifier,
    selector: WorkloadSelector,
    metrics: Box<dyn MetricsSource>,
    capital: Box<dyn CapitalSource>,
    sink: Box<dyn AllocationSink>,
    checkpoint_path: Option<PathBuf>,
    active: BTreeSet<WorkloadId>,
    wind_down: Option<WindDownQueue>,
}

impl std::fmt::Debug for DecisionCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionCycle")
            .field("pod_id", &self.pod_id)
            .field("regime", &self.classifier.current())
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl DecisionCycle {
    /// Build a cycle and resume the classifier from its checkpoint, if any.
    ///
    /// A missing or unreadable checkpoint starts the classifier fresh.
    pub fn new(
        ctx: &PodContext,
        mut classifier: RegimeClassifier,
        selector: WorkloadSelector,
        metrics: Box<dyn MetricsSource>,
        capital: Box<dyn CapitalSource>,
        sink: Box<dyn AllocationSink>,
    ) -> Self {
        let checkpoint_path = ctx.regime_checkpoint_path();
        if let Some(path) = &checkpoint_path {
            match read_json::<RegimeState>(path) {
                Ok(Some(state)) => {
                    info!(
                        pod = %ctx.pod_id(),
                        regime = ?state.current,
                        "resuming regime from checkpoint"
                    );
                    classifier.restore(state);
                }
                Ok(None) => {}
                Err(e) => warn!(pod = %ctx.pod_id(), "regime checkpoint ignored: {e}"),
            }
        }

        Self {
            pod_id: ctx.pod_id().to_owned(),
            classifier,
            selector,
            metrics,
            capital,
            sink,
            checkpoint_path,
            active: BTreeSet::new(),
            wind_down: None,
        }
    }

    /// Record deactivated workloads in `queue` for the exit review.
    pub fn with_wind_down(mut self, queue: WindDownQueue) -> Self {
        self.wind_down = Some(queue);
        self
    }

    pub fn classifier(&self) -> &RegimeClassifier {
        &self.classifier
    }

    /// Workloads allocated by the last published cycle.
    pub fn active(&self) -> &BTreeSet<WorkloadId> {
        &self.active
    }

    /// Run one full cycle.
    ///
    /// # Errors
    /// Propagates metrics, capital and sink failures. A failed cycle leaves
    /// the regime state and active set untouched, so the retry casts the
    /// same hysteresis vote again rather than a second one.
    pub fn run_once(&mut self) -> Result<CycleOutcome> {
        let metrics = self.metrics.snapshot()?;
        let capital = self.capital.available_capital()?;

        let mut classifier = self.classifier.clone();
        let update = classifier.analyze(&metrics);

        let allocations = self.selector.select(update.current, capital);
        let selected: BTreeSet<WorkloadId> =
            allocations.iter().map(|a| a.workload.clone()).collect();
        let deactivated: Vec<WorkloadId> = self.active.difference(&selected).cloned().collect();

        let outcome = CycleOutcome {
            cycle_id: Uuid::new_v4(),
            regime: update.current,
            transitioned: update.transitioned,
            previous: update.previous,
            capital,
            allocations,
            deactivated,
        };

        self.sink.publish(&outcome)?;

        self.classifier = classifier;
        self.checkpoint();
        if let Some(queue) = &self.wind_down {
            queue.extend(&outcome.deactivated);
            for id in &selected {
                queue.remove(id);
            }
        }
        self.active = selected;

        debug!(
            pod = %self.pod_id,
            cycle = %outcome.cycle_id,
            regime = %outcome.regime,
            active = outcome.allocations.len(),
            deactivated = outcome.deactivated.len(),
            "decision cycle published"
        );
        Ok(outcome)
    }

    fn checkpoint(&self) {
        let Some(path) = &self.checkpoint_path else {
            return;
        };
        if let Err(e) = write_json_atomic(path, self.classifier.state()) {
            warn!(pod = %self.pod_id, "regime checkpoint failed: {e}");
        }
    }

    /// Wrap the cycle as a scheduler task body.
    pub fn into_task_body(mut self) -> TaskBody {
        Box::new(move |_run| self.run_once().map(|outcome| outcome.summary()))
    }
}

/// Metrics source that always fails; stands in until a feed is configured.
#[derive(Debug, Clone, Default)]
pub struct NoMetrics;

impl MetricsSource for NoMetrics {
    fn snapshot(&mut self) -> Result<MetricsSnapshot> {
        Err(PodError::Task("no metrics source configured".to_owned()))
    }
}
