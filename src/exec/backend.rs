// src/exec/backend.rs

//! Pluggable command runner abstraction.
//!
//! The scheduler talks to a `CommandRunner` instead of spawning processes
//! itself. Production code uses [`super::RealCommandRunner`]; tests provide
//! a scripted runner that never touches the OS.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use anyhow::Result;

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    /// Shell command line.
    pub command: String,
    /// When set, stdout and stderr both go to this file.
    pub log_path: Option<PathBuf>,
    /// Thread hint; exported as `OMP_NUM_THREADS` when greater than one.
    pub threads: u32,
}

/// What came back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Empty when output was redirected to a log file.
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Trait abstracting how a single external command is executed.
///
/// `Err` means the command could not be run at all (spawn failure, log file
/// not writable); a non-zero exit is reported through
/// [`CommandOutput::exit_code`].
pub trait CommandRunner: Send + Sync {
    fn execute(
        &self,
        request: CommandRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutput>> + Send + '_>>;
}
