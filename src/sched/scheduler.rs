// src/sched/scheduler.rs

//! Resource-constrained batch scheduler.
//!
//! `submit` takes a batch of tasks, orders them by descending priority
//! (ties keep submission order) and admits them strictly from the head of
//! that queue. When the head does not fit, nothing behind it starts; the
//! dispatcher sleeps until a running task releases its resources and then
//! retries the head. Dispatch order is therefore exactly priority then
//! submission order.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{Result, SnpflowError};
use crate::exec::{CommandOutput, CommandRequest, CommandRunner};
use crate::sched::ledger::{LedgerPermit, ResourceLedger, ResourceLimits};
use crate::sched::task::{Task, TaskFailure, TaskOutcome};

/// Per-task results of one `submit` call.
#[derive(Debug, Clone, Default)]
pub struct SchedulerReport {
    pub outcomes: BTreeMap<String, TaskOutcome>,
    /// Task names in the order they were admitted.
    pub dispatch_order: Vec<String>,
}

impl SchedulerReport {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.values().all(TaskOutcome::is_success)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &TaskFailure)> {
        self.outcomes.iter().filter_map(|(name, outcome)| match outcome {
            TaskOutcome::Failed(failure) => Some((name.as_str(), failure)),
            TaskOutcome::Succeeded => None,
        })
    }
}

pub struct TaskScheduler {
    ledger: Arc<ResourceLedger>,
    runner: Arc<dyn CommandRunner>,
    task_timeout: Option<Duration>,
}

impl TaskScheduler {
    /// Build a scheduler. Every ceiling must be at least one.
    pub fn new(
        limits: ResourceLimits,
        runner: Arc<dyn CommandRunner>,
        task_timeout: Option<Duration>,
    ) -> Result<Self> {
        if limits.max_parallel_tasks == 0 || limits.max_threads == 0 || limits.max_memory_gb == 0
        {
            return Err(SnpflowError::ConfigError(format!(
                "scheduler ceilings must be >= 1 (got {} tasks, {} threads, {} GB)",
                limits.max_parallel_tasks, limits.max_threads, limits.max_memory_gb
            )));
        }

        Ok(Self {
            ledger: ResourceLedger::new(limits),
            runner,
            task_timeout,
        })
    }

    pub fn limits(&self) -> ResourceLimits {
        self.ledger.limits()
    }

    pub fn ledger(&self) -> Arc<ResourceLedger> {
        Arc::clone(&self.ledger)
    }

    /// Run every task and wait for all of them.
    ///
    /// Returns an error without starting anything if a task can never be
    /// admitted or if the batch is malformed. Individual task failures are
    /// reported in the returned map; they never cancel siblings.
    pub async fn submit(&self, tasks: Vec<Task>) -> Result<SchedulerReport> {
        self.check_batch(&tasks)?;

        let mut sorted = tasks;
        // Stable sort keeps submission order among equal priorities.
        sorted.sort_by(|a, b| b.priority.cmp(&a.priority));
        let mut pending: VecDeque<Task> = sorted.into();

        info!(tasks = pending.len(), "submitting task batch");

        let mut report = SchedulerReport::default();
        let mut handles: Vec<(String, JoinHandle<TaskOutcome>)> = Vec::with_capacity(pending.len());

        loop {
            // The head always fits an empty ledger (see `check_batch`), so
            // waiting on it cannot stall forever.
            while let Some(head) = pending.front() {
                let Some(permit) = self.ledger.try_acquire(head.threads, head.memory_gb) else {
                    break;
                };
                if let Some(task) = pending.pop_front() {
                    report.dispatch_order.push(task.name.clone());
                    let name = task.name.clone();
                    handles.push((name, self.spawn_task(task, permit)));
                }
            }

            if pending.is_empty() {
                break;
            }

            debug!(
                pending = pending.len(),
                next = %pending[0].name,
                "waiting for resources"
            );
            self.ledger.released().await;
        }

        for (name, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(task = %name, error = %err, "task unit aborted");
                    TaskOutcome::Failed(TaskFailure {
                        exit_code: None,
                        reason: format!("task unit aborted: {err}"),
                        output: String::new(),
                    })
                }
            };
            report.outcomes.insert(name, outcome);
        }

        Ok(report)
    }

    fn check_batch(&self, tasks: &[Task]) -> Result<()> {
        let limits = self.ledger.limits();
        let mut seen = HashSet::with_capacity(tasks.len());

        for task in tasks {
            if !seen.insert(task.name.as_str()) {
                return Err(SnpflowError::DuplicateTask(task.name.clone()));
            }
            if task.threads == 0 || task.memory_gb == 0 {
                return Err(SnpflowError::ConfigError(format!(
                    "task '{}' must request at least 1 thread and 1 GB (got {} / {})",
                    task.name, task.threads, task.memory_gb
                )));
            }
            if !limits.admits(task.threads, task.memory_gb) {
                return Err(SnpflowError::ResourceExceeded {
                    task: task.name.clone(),
                    threads: task.threads,
                    memory_gb: task.memory_gb,
                    max_threads: limits.max_threads,
                    max_memory_gb: limits.max_memory_gb,
                });
            }
        }
        Ok(())
    }

    fn spawn_task(&self, task: Task, permit: LedgerPermit) -> JoinHandle<TaskOutcome> {
        let runner = Arc::clone(&self.runner);
        let timeout = self.task_timeout;

        info!(
            task = %task.name,
            threads = task.threads,
            memory_gb = task.memory_gb,
            priority = task.priority,
            "dispatching task"
        );

        tokio::spawn(async move {
            // Held until the unit finishes, including on panic.
            let _permit = permit;
            run_one(runner.as_ref(), task, timeout).await
        })
    }
}

async fn run_one(runner: &dyn CommandRunner, task: Task, timeout: Option<Duration>) -> TaskOutcome {
    let request = CommandRequest {
        command: task.command.clone(),
        log_path: task.log_path.clone(),
        threads: task.threads,
    };

    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, runner.execute(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(task = %task.name, ?limit, "task timed out; process killed");
                return TaskOutcome::Failed(TaskFailure {
                    exit_code: None,
                    reason: format!("timed out after {limit:?}"),
                    output: log_pointer(&task),
                });
            }
        },
        None => runner.execute(request).await,
    };

    match result {
        Ok(output) if output.success() => {
            debug!(task = %task.name, "task succeeded");
            TaskOutcome::Succeeded
        }
        Ok(output) => {
            let reason = match output.exit_code {
                Some(code) => format!("exited with status {code}"),
                None => "terminated by signal".to_string(),
            };
            warn!(task = %task.name, exit_code = output.exit_code.unwrap_or(-1), "task failed");
            TaskOutcome::Failed(TaskFailure {
                exit_code: output.exit_code,
                reason,
                output: failure_output(&task, &output),
            })
        }
        Err(err) => {
            warn!(task = %task.name, error = %err, "task could not be run");
            TaskOutcome::Failed(TaskFailure {
                exit_code: None,
                reason: format!("{err:#}"),
                output: String::new(),
            })
        }
    }
}

fn failure_output(task: &Task, output: &CommandOutput) -> String {
    if task.log_path.is_some() {
        return log_pointer(task);
    }
    let mut text = output.stdout.trim_end().to_string();
    let stderr = output.stderr.trim_end();
    if !stderr.is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(stderr);
    }
    text
}

fn log_pointer(task: &Task) -> String {
    match &task.log_path {
        Some(path) => format!("see log {}", path.display()),
        None => String::new(),
    }
}
