//! Podwarden: decision and timing control plane for a trading pod.
//!
//! Decides, on a fixed cadence, which workloads may run, how much capital
//! each receives, and when the pod pauses live decisions for maintenance.
//!
//! # Architecture
//!
//! Components, leaf to root:
//! - **Task state**: durable task name → last successful run, written atomically
//! - **Phase window**: splits every UTC instant into DECISION or MAINTENANCE
//! - **Regime classifier**: metrics → stable regime with pending-candidate hysteresis
//! - **Workload selector**: regime + capital → bounded, deterministic allocations
//! - **Scheduler**: tick loop running due tasks, including the decision cycle

pub mod adapters;
pub mod config;
pub mod context;
pub mod cycle;
pub mod error;
pub mod exit;
pub mod persist;
pub mod phase;
pub mod pod;
pub mod regime;
pub mod scheduler;
pub mod selector;

pub use config::PodConfig;
pub use context::{PodContext, PodEnvironment};
pub use cycle::{CycleOutcome, DecisionCycle};
pub use error::{PodError, Result};
pub use phase::{Phase, PhaseWindow};
pub use pod::Pod;
pub use regime::{Regime, RegimeClassifier};
pub use scheduler::Scheduler;
pub use selector::{WorkloadAllocation, WorkloadSelector};
