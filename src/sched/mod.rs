// src/sched/mod.rs

//! Task scheduling under global thread and memory budgets.
//!
//! - [`task`] defines the unit of work and its outcome.
//! - [`ledger`] tracks available resources and hands out permits.
//! - [`scheduler`] admits tasks in priority order and collects outcomes.

pub mod ledger;
pub mod scheduler;
pub mod task;

pub use ledger::{LedgerPermit, LedgerSnapshot, ResourceLedger, ResourceLimits};
pub use scheduler::{SchedulerReport, TaskScheduler};
pub use task::{Task, TaskFailure, TaskOutcome};
