//! Pod assembly.
//!
//! Wires a [`PodConfig`] and its external collaborators into a ready
//! [`Scheduler`]: the decision cycle is registered as a DECISION-phase task,
//! and callers may add the exit review or their own maintenance tasks before
//! starting the loop.

use crate::config::PodConfig;
use crate::context::PodContext;
use crate::cycle::{
    AllocationSink, CapitalSource, DecisionCycle, FixedCapital, MetricsSource, WindDownQueue,
};
use crate::error::{PodError, Result};
use crate::exit::{Account, ExitPolicy, ExitReview, ExitSink, TradeBook};
use crate::phase::PhaseWindow;
use crate::regime::RegimeClassifier;
use crate::scheduler::{
    Cadence, RequiredPhase, Scheduler, SchedulerSnapshot, TaskBody, TaskDefinition,
};
use crate::selector::WorkloadSelector;
use tokio_util::sync::CancellationToken;
use std::future::Future;
use tracing::{error, info};

/// Task name of the classify → select cycle.
pub const DECISION_CYCLE_TASK: &str = "decision_cycle";
/// Task name of the wind-down exit review.
pub const EXIT_REVIEW_TASK: &str = "exit_review";

/// A configured pod ready to run.
#[derive(Debug)]
pub struct Pod {
    ctx: PodContext,
    scheduler: Scheduler,
    wind_down: WindDownQueue,
    exit_review_cadence: Cadence,
}

impl Pod {
    /// Build a pod whose capital is the fixed `pod.capital` figure.
    ///
    /// # Errors
    /// Returns the first configuration error; nothing is started.
    pub fn build(
        config: &PodConfig,
        metrics: Box<dyn MetricsSource>,
        sink: Box<dyn AllocationSink>,
    ) -> Result<Self> {
        Self::build_with_capital(
            config,
            metrics,
            Box::new(FixedCapital(config.pod.capital)),
            sink,
        )
    }

    /// Build a pod with an explicit capital source.
    ///
    /// # Errors
    /// Returns the first configuration error; nothing is started.
    pub fn build_with_capital(
        config: &PodConfig,
        metrics: Box<dyn MetricsSource>,
        capital: Box<dyn CapitalSource>,
        sink: Box<dyn AllocationSink>,
    ) -> Result<Self> {
        config.validate()?;
        let ctx = config.context();
        let window = PhaseWindow::from_config(&config.phase)?;
        let classifier = RegimeClassifier::new(&ctx, &config.regime)?;
        let selector = WorkloadSelector::from_config(&ctx, config)?;

        let wind_down = WindDownQueue::new();
        let cycle = DecisionCycle::new(&ctx, classifier, selector, metrics, capital, sink)
            .with_wind_down(wind_down.clone());

        let mut scheduler = Scheduler::new(&ctx, window, &config.scheduler)?;
        scheduler.register(
            TaskDefinition::new(
                DECISION_CYCLE_TASK,
                config.scheduler.decision_cycle.clone(),
                RequiredPhase::Decision,
            ),
            cycle.into_task_body(),
        )?;

        info!(
            pod = %ctx.pod_id(),
            environment = %ctx.environment(),
            workloads = config.workloads.len(),
            "pod assembled"
        );

        Ok(Self {
            ctx,
            scheduler,
            wind_down,
            exit_review_cadence: config.scheduler.exit_review.clone(),
        })
    }

    /// Register the exit review over workloads the decision cycle drops.
    ///
    /// Exits are live actions, so the review runs in the DECISION phase.
    ///
    /// # Errors
    /// Returns `PodError::Config` if the review is already registered.
    pub fn enable_exit_review(
        &mut self,
        account: Account,
        policy: Box<dyn ExitPolicy>,
        book: Box<dyn TradeBook>,
        sink: Box<dyn ExitSink>,
    ) -> Result<()> {
        let review = ExitReview::new(account, self.wind_down.clone(), policy, book, sink);
        self.scheduler.register(
            TaskDefinition::new(
                EXIT_REVIEW_TASK,
                self.exit_review_cadence.clone(),
                RequiredPhase::Decision,
            ),
            review.into_task_body(),
        )
    }

    /// Register an additional task, e.g. an offline retrain in MAINTENANCE.
    ///
    /// # Errors
    /// Returns a configuration error for invalid or duplicate definitions.
    pub fn register_task(&mut self, definition: TaskDefinition, body: TaskBody) -> Result<()> {
        self.scheduler.register(definition, body)
    }

    pub fn context(&self) -> &PodContext {
        &self.ctx
    }

    pub fn wind_down(&self) -> &WindDownQueue {
        &self.wind_down
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub fn into_scheduler(self) -> Scheduler {
        self.scheduler
    }

    /// Start the scheduler loop; see [`Scheduler::run`].
    pub fn run(self, cancel: CancellationToken) -> tokio::task::JoinHandle<SchedulerSnapshot> {
        self.scheduler.run(cancel)
    }

    /// Run until `shutdown` resolves, then let the in-flight tick finish and
    /// return the flushed final snapshot.
    ///
    /// # Errors
    /// Returns `PodError::Task` if the scheduler task panicked.
    pub async fn run_until<F>(self, shutdown: F) -> Result<SchedulerSnapshot>
    where
        F: Future<Output = ()>,
    {
        let pod_id = self.ctx.pod_id().to_owned();
        let cancel = CancellationToken::new();
        let handle = self.run(cancel.clone());

        shutdown.await;
        info!(pod = %pod_id, "shutdown requested, finishing current tick");
        cancel.cancel();

        handle
            .await
            .map_err(|e| PodError::Task(format!("scheduler task failed: {e}")))
    }
}

/// Resolves on Ctrl-C or, on unix, SIGTERM from the pod manager.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "cannot install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl-C"),
        () = terminate => info!("received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::adapters::LogAllocationSink;
    use crate::config::WorkloadSpec;
    use crate::context::PodEnvironment;
    use crate::cycle::NoMetrics;
    use crate::exit::AllowAllExits;

    struct NoTrades;

    impl TradeBook for NoTrades {
        fn open_trades(&mut self) -> Result<Vec<crate::exit::Trade>> {
            Ok(Vec::new())
        }
    }

    struct NoExits;

    impl ExitSink for NoExits {
        fn submit_exit(
            &mut self,
            _trade: &crate::exit::Trade,
            _reason: crate::exit::ExitReason,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn config() -> PodConfig {
        let mut config = PodConfig::default();
        config.pod.environment = PodEnvironment::Backtest;
        config.workloads = vec![WorkloadSpec::new("momentum")];
        config
            .eligibility
            .insert("CALM".to_owned(), vec!["momentum".to_owned()]);
        config
    }

    #[test]
    fn registers_decision_cycle_and_exit_review() {
        let mut pod = Pod::build(&config(), Box::new(NoMetrics), Box::new(LogAllocationSink))
            .unwrap();
        pod.enable_exit_review(
            Account {
                id: "acct".to_owned(),
            },
            Box::new(AllowAllExits),
            Box::new(NoTrades),
            Box::new(NoExits),
        )
        .unwrap();

        let names: Vec<&str> = pod.scheduler().tasks().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec![DECISION_CYCLE_TASK, EXIT_REVIEW_TASK]);
        assert!(
            pod.scheduler()
                .tasks()
                .all(|t| t.phase == RequiredPhase::Decision)
        );
    }

    #[tokio::test]
    async fn run_until_stops_when_shutdown_resolves() {
        let pod = Pod::build(&config(), Box::new(NoMetrics), Box::new(LogAllocationSink))
            .unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let running = tokio::spawn(pod.run_until(async {
            let _ = rx.await;
        }));

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!running.is_finished());
        tx.send(()).unwrap();

        let snapshot = running.await.unwrap().unwrap();
        assert_eq!(snapshot.pod_id, "default");
        assert!(snapshot.tasks.iter().any(|t| t.name == DECISION_CYCLE_TASK));
    }

    #[test]
    fn invalid_config_fails_before_start() {
        let mut bad = config();
        bad.phase.maintenance_start = "23:00".to_owned();
        bad.phase.maintenance_end = "01:00".to_owned();
        let err = Pod::build(&bad, Box::new(NoMetrics), Box::new(LogAllocationSink)).unwrap_err();
        assert!(err.is_config());

        let mut typo = config();
        typo.eligibility
            .insert("EUPHORIC".to_owned(), vec!["momentum".to_owned()]);
        assert!(Pod::build(&typo, Box::new(NoMetrics), Box::new(LogAllocationSink)).is_err());
    }
}
