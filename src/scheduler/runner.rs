//! Scheduler tick loop.
//!
//! Each tick evaluates every registered task against the phase window and
//! the persisted last-run state, then executes the due ones one after
//! another. A task's timestamp is persisted only after its body returns
//! `Ok`; failures and panics are logged and retried on a later tick.

use crate::config::SchedulerConfig;
use crate::context::PodContext;
use crate::error::{PodError, Result};
use crate::phase::{Phase, PhaseWindow};
use crate::scheduler::clock::{Clock, SystemClock};
use crate::scheduler::state::TaskStateStore;
use crate::scheduler::tasks::{Cadence, DueStatus, RequiredPhase, TaskDefinition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Body of a scheduled task.
///
/// Returns a short human-readable summary on success.
pub type TaskBody = Box<dyn FnMut(&TaskRun) -> Result<String> + Send>;

/// Invocation details handed to a task body.
#[derive(Debug, Clone)]
pub struct TaskRun {
    pub run_id: Uuid,
    pub task: String,
    pub phase: Phase,
    pub now: DateTime<Utc>,
    /// Previous successful run, if any.
    pub last_run: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskRunOutcome {
    Success,
    Failed,
}

/// One executed task run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRunReport {
    pub run_id: Uuid,
    pub task: String,
    pub phase: Phase,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: TaskRunOutcome,
    pub summary: String,
}

/// Status of one registered task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub name: String,
    pub cadence: Cadence,
    pub phase: RequiredPhase,
    pub enabled: bool,
    pub last_run: Option<DateTime<Utc>>,
}

/// Point-in-time view for operators and tests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    pub pod_id: String,
    pub tasks: Vec<TaskStatus>,
    /// Most recent runs, oldest first.
    #[serde(default)]
    pub history: Vec<TaskRunReport>,
}

struct RegisteredTask {
    definition: TaskDefinition,
    body: TaskBody,
    enabled: bool,
    /// Cadence bypass requested by an operator. Phase gating still applies.
    forced: bool,
}

/// Single-process task scheduler.
pub struct Scheduler {
    pod_id: String,
    window: PhaseWindow,
    tasks: Vec<RegisteredTask>,
    store: TaskStateStore,
    clock: Box<dyn Clock>,
    history: VecDeque<TaskRunReport>,
    history_limit: usize,
    report_tx: Option<mpsc::UnboundedSender<TaskRunReport>>,
    tick_interval: Duration,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("pod_id", &self.pod_id)
            .field("window", &self.window)
            .field("tasks", &self.tasks.len())
            .field("tick_interval", &self.tick_interval)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Create a scheduler whose task state lives under the pod context.
    ///
    /// # Errors
    /// Returns `PodError::Config` if the scheduler settings are invalid.
    pub fn new(ctx: &PodContext, window: PhaseWindow, config: &SchedulerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pod_id: ctx.pod_id().to_owned(),
            window,
            tasks: Vec::new(),
            store: TaskStateStore::open(ctx.task_state_path()),
            clock: Box::new(SystemClock),
            history: VecDeque::new(),
            history_limit: config.history_limit.max(1),
            report_tx: None,
            tick_interval: Duration::from_secs(config.tick_interval_secs),
        })
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Replace the task state store opened from the context.
    pub fn with_state_store(mut self, store: TaskStateStore) -> Self {
        self.store = store;
        self
    }

    /// Send a copy of every run report to `tx`.
    pub fn with_report_channel(mut self, tx: mpsc::UnboundedSender<TaskRunReport>) -> Self {
        self.report_tx = Some(tx);
        self
    }

    pub fn with_history_limit(mut self, max_entries: usize) -> Self {
        self.history_limit = max_entries.max(1);
        self.trim_history();
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Register a task. Tasks run in registration order within a tick.
    ///
    /// # Errors
    /// Returns a configuration error for an invalid definition or a name
    /// that is already registered.
    pub fn register(&mut self, definition: TaskDefinition, body: TaskBody) -> Result<()> {
        definition.validate()?;
        if self.tasks.iter().any(|t| t.definition.name == definition.name) {
            return Err(PodError::Config(format!(
                "task '{}' registered twice",
                definition.name
            )));
        }
        debug!(
            task = %definition.name,
            cadence = %definition.cadence,
            "registered task"
        );
        self.tasks.push(RegisteredTask {
            definition,
            body,
            enabled: true,
            forced: false,
        });
        Ok(())
    }

    /// Enables or disables a task by name. Returns `true` when found.
    pub fn set_task_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.tasks.iter_mut().find(|t| t.definition.name == name) {
            Some(task) => {
                task.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Run a task on the next tick whose phase admits it, ignoring cadence.
    /// Returns `true` when found.
    pub fn mark_due_now(&mut self, name: &str) -> bool {
        match self.tasks.iter_mut().find(|t| t.definition.name == name) {
            Some(task) => {
                task.forced = true;
                true
            }
            None => false,
        }
    }

    pub fn phase_at(&self, now: DateTime<Utc>) -> Phase {
        self.window.phase_at(now)
    }

    pub fn window(&self) -> &PhaseWindow {
        &self.window
    }

    pub fn state(&self) -> &TaskStateStore {
        &self.store
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskDefinition> {
        self.tasks.iter().map(|t| &t.definition)
    }

    /// Recent run reports, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &TaskRunReport> {
        self.history.iter()
    }

    /// Names of tasks that would run if a tick happened at `now`.
    pub fn due_tasks(&self, now: DateTime<Utc>) -> Vec<&str> {
        let phase = self.window.phase_at(now);
        self.tasks
            .iter()
            .filter(|t| self.evaluate(t, now, phase).is_due())
            .map(|t| t.definition.name.as_str())
            .collect()
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            pod_id: self.pod_id.clone(),
            tasks: self
                .tasks
                .iter()
                .map(|t| TaskStatus {
                    name: t.definition.name.clone(),
                    cadence: t.definition.cadence.clone(),
                    phase: t.definition.phase,
                    enabled: t.enabled,
                    last_run: self.store.last_run(&t.definition.name),
                })
                .collect(),
            history: self.history.iter().cloned().collect(),
        }
    }

    fn evaluate(&self, task: &RegisteredTask, now: DateTime<Utc>, phase: Phase) -> DueStatus {
        if !task.enabled {
            return DueStatus::NotYetDue;
        }
        if task.forced && task.definition.phase.admits(phase) {
            return DueStatus::Due;
        }
        task.definition
            .due_status(self.store.last_run(&task.definition.name), now, phase)
    }

    /// Execute one tick: check every task and run the due ones in order.
    ///
    /// Returns the reports for runs performed during this tick.
    pub fn tick(&mut self) -> Vec<TaskRunReport> {
        if self.store.is_dirty() {
            if let Err(e) = self.store.flush() {
                warn!(pod = %self.pod_id, "task state still not persisted: {e}");
            }
        }

        let tick_phase = self.window.phase_at(self.clock.now());
        debug!(pod = %self.pod_id, phase = %tick_phase, "scheduler tick");

        let mut reports = Vec::new();
        for index in 0..self.tasks.len() {
            // A long task can carry the clock across a window edge, so the
            // phase is recomputed for every task.
            let now = self.clock.now();
            let phase = self.window.phase_at(now);
            let status = self.evaluate(&self.tasks[index], now, phase);
            if !status.is_due() {
                if status == DueStatus::MissedWindow {
                    debug!(task = %self.tasks[index].definition.name, "daily window missed");
                }
                continue;
            }
            let report = self.execute(index, now, phase);
            reports.push(report);
        }
        reports
    }

    fn execute(&mut self, index: usize, now: DateTime<Utc>, phase: Phase) -> TaskRunReport {
        let name = self.tasks[index].definition.name.clone();
        let run = TaskRun {
            run_id: Uuid::new_v4(),
            task: name.clone(),
            phase,
            now,
            last_run: self.store.last_run(&name),
        };
        debug!(task = %name, run_id = %run.run_id, "executing task");

        let task = &mut self.tasks[index];
        let result = catch_unwind(AssertUnwindSafe(|| (task.body)(&run)))
            .unwrap_or_else(|payload| Err(PodError::Task(panic_message(payload.as_ref()))));
        let finished_at = self.clock.now();

        let (outcome, summary) = match result {
            Ok(summary) => {
                self.tasks[index].forced = false;
                if let Err(e) = self.store.update(&name, now) {
                    error!(task = %name, "cannot persist task state: {e}");
                }
                info!(task = %name, phase = %phase, "{summary}");
                (TaskRunOutcome::Success, summary)
            }
            Err(e) => {
                warn!(task = %name, phase = %phase, "task failed, will retry: {e}");
                (TaskRunOutcome::Failed, e.to_string())
            }
        };

        let report = TaskRunReport {
            run_id: run.run_id,
            task: name,
            phase,
            started_at: now,
            finished_at,
            outcome,
            summary,
        };
        self.push_history(report.clone());
        let closed = self
            .report_tx
            .as_ref()
            .is_some_and(|tx| tx.send(report.clone()).is_err());
        if closed {
            debug!("run report channel closed, dropping sender");
            self.report_tx = None;
        }
        report
    }

    fn push_history(&mut self, report: TaskRunReport) {
        self.history.push_back(report);
        self.trim_history();
    }

    fn trim_history(&mut self) {
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }

    /// Start the background loop.
    ///
    /// Cancellation is observed only between ticks, so an in-flight tick
    /// always completes. Pending state is flushed before the task exits and
    /// the final snapshot is returned through the join handle.
    pub fn run(mut self, cancel: CancellationToken) -> tokio::task::JoinHandle<SchedulerSnapshot> {
        tokio::spawn(async move {
            info!(
                pod = %self.pod_id,
                tasks = self.tasks.len(),
                "scheduler started ({} - {} UTC maintenance)",
                self.window.start(),
                self.window.end()
            );
            let mut interval = tokio::time::interval(self.tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        self.tick();
                    }
                }
            }

            if let Err(e) = self.store.flush() {
                error!(pod = %self.pod_id, "task state not flushed on shutdown: {e}");
            }
            info!(pod = %self.pod_id, "scheduler stopped");
            self.snapshot()
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("task panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("task panicked: {s}")
    } else {
        "task panicked".to_owned()
    }
}
