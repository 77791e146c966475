// src/sched/task.rs

use std::fmt;
use std::path::PathBuf;

/// One external command to execute, with its resource demands.
///
/// Built by a stage and consumed once by [`crate::sched::TaskScheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Unique within one `submit` batch, e.g. `bwa_map:S1`.
    pub name: String,
    pub command: String,
    /// When set, stdout and stderr are written here instead of captured.
    pub log_path: Option<PathBuf>,
    pub threads: u32,
    pub memory_gb: u32,
    /// Higher values are dispatched first.
    pub priority: i32,
}

impl Task {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            log_path: None,
            threads: 1,
            memory_gb: 1,
            priority: 0,
        }
    }

    pub fn with_threads(mut self, threads: u32) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_memory_gb(mut self, memory_gb: u32) -> Self {
        self.memory_gb = memory_gb;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }
}

/// Final result of a single task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed(TaskFailure),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded)
    }
}

/// Why a task failed, with whatever output the tool produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    /// `None` when the process never ran, was killed, or timed out.
    pub exit_code: Option<i32>,
    pub reason: String,
    /// Captured stdout/stderr, or a pointer to the log file.
    pub output: String,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)?;
        let output = self.output.trim();
        if !output.is_empty() {
            write!(f, "\n{output}")?;
        }
        Ok(())
    }
}
