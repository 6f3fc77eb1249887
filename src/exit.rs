//! Exit review for wound-down workloads.
//!
//! When the decision cycle drops a workload, its open trades are offered to
//! an external [`ExitPolicy`]. Allowed exits go to an [`ExitSink`]; denied
//! ones are logged with the policy's reason and reconsidered on the next
//! review. A trade is submitted at most once while its workload stays in
//! wind-down, including across reviews that failed part-way. A workload
//! leaves the wind-down queue once it has no open trades.

use crate::cycle::WindDownQueue;
use crate::error::Result;
use crate::scheduler::TaskBody;
use crate::selector::WorkloadId;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// An open trade owned by one workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub workload: WorkloadId,
    pub symbol: String,
    pub opened_at: DateTime<Utc>,
    pub quantity: f64,
}

/// Account the pod trades through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
}

/// Why the pod wants to close a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// The owning workload lost its allocation.
    WorkloadDeactivated,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WorkloadDeactivated => write!(f, "workload deactivated"),
        }
    }
}

/// Verdict of an [`ExitPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitDecision {
    pub allowed: bool,
    pub reason: String,
}

impl ExitDecision {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Opaque exit-permission rules (hold periods, same-day exits, ...).
pub trait ExitPolicy: Send {
    fn can_exit(
        &self,
        trade: &Trade,
        exit_date: NaiveDate,
        reason: ExitReason,
        account: &Account,
    ) -> ExitDecision;
}

/// Policy that permits every exit.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllExits;

impl ExitPolicy for AllowAllExits {
    fn can_exit(&self, _: &Trade, _: NaiveDate, _: ExitReason, _: &Account) -> ExitDecision {
        ExitDecision::allow("no exit restrictions")
    }
}

/// Source of currently open trades.
pub trait TradeBook: Send {
    /// # Errors
    /// Any error fails the review; it is retried on a later tick.
    fn open_trades(&mut self) -> Result<Vec<Trade>>;
}

/// Receives approved exits.
pub trait ExitSink: Send {
    /// # Errors
    /// Any error fails the review.
    fn submit_exit(&mut self, trade: &Trade, reason: ExitReason) -> Result<()>;
}

/// Outcome of one review pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitReviewSummary {
    /// Trade ids submitted for exit.
    pub submitted: Vec<String>,
    /// `(trade id, policy reason)` for refused exits.
    pub denied: Vec<(String, String)>,
    /// Workloads with no open trades left, removed from the queue.
    pub released: Vec<WorkloadId>,
    /// Trade ids submitted by an earlier review and still open.
    pub awaiting: Vec<String>,
}

impl std::fmt::Display for ExitReviewSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} exits submitted, {} denied, {} workloads released",
            self.submitted.len(),
            self.denied.len(),
            self.released.len()
        )
    }
}

/// Periodic exit review over the wind-down queue.
pub struct ExitReview {
    account: Account,
    queue: WindDownQueue,
    policy: Box<dyn ExitPolicy>,
    book: Box<dyn TradeBook>,
    sink: Box<dyn ExitSink>,
    submitted: BTreeMap<WorkloadId, BTreeSet<String>>,
}

impl std::fmt::Debug for ExitReview {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitReview")
            .field("account", &self.account)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl ExitReview {
    pub fn new(
        account: Account,
        queue: WindDownQueue,
        policy: Box<dyn ExitPolicy>,
        book: Box<dyn TradeBook>,
        sink: Box<dyn ExitSink>,
    ) -> Self {
        Self {
            account,
            queue,
            policy,
            book,
            sink,
            submitted: BTreeMap::new(),
        }
    }

    /// Review open trades of every queued workload as of `now`.
    ///
    /// # Errors
    /// Propagates trade book and exit sink failures.
    pub fn run_once(&mut self, now: DateTime<Utc>) -> Result<ExitReviewSummary> {
        let mut summary = ExitReviewSummary::default();
        let queued = self.queue.members();
        // Reactivated workloads start over if they wind down again.
        self.submitted.retain(|workload, _| queued.contains(workload));
        if queued.is_empty() {
            return Ok(summary);
        }

        let trades = self.book.open_trades()?;
        let exit_date = now.date_naive();
        let reason = ExitReason::WorkloadDeactivated;

        for workload in queued {
            let owned: Vec<&Trade> = trades.iter().filter(|t| t.workload == workload).collect();
            if owned.is_empty() {
                debug!(workload = %workload, "no open trades, leaving wind-down");
                self.queue.remove(&workload);
                self.submitted.remove(&workload);
                summary.released.push(workload);
                continue;
            }

            for trade in owned {
                if self
                    .submitted
                    .get(&workload)
                    .is_some_and(|ids| ids.contains(&trade.id))
                {
                    debug!(trade = %trade.id, "exit already submitted, awaiting fill");
                    summary.awaiting.push(trade.id.clone());
                    continue;
                }
                let decision = self.policy.can_exit(trade, exit_date, reason, &self.account);
                if decision.allowed {
                    self.sink.submit_exit(trade, reason)?;
                    self.submitted
                        .entry(workload.clone())
                        .or_default()
                        .insert(trade.id.clone());
                    summary.submitted.push(trade.id.clone());
                } else {
                    info!(
                        trade = %trade.id,
                        workload = %workload,
                        "exit deferred: {}",
                        decision.reason
                    );
                    summary.denied.push((trade.id.clone(), decision.reason));
                }
            }
        }
        Ok(summary)
    }

    /// Wrap the review as a scheduler task body.
    pub fn into_task_body(mut self) -> TaskBody {
        Box::new(move |run| self.run_once(run.now).map(|summary| summary.to_string()))
    }
}
