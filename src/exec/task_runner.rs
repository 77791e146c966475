// src/exec/task_runner.rs

//! Real process runner.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::{debug, info};

use super::backend::{CommandOutput, CommandRequest, CommandRunner};

/// Runs commands through the platform shell with `tokio::process`.
///
/// On unix each command runs in its own process group. If the returned
/// future is dropped the whole group is killed, which is how the scheduler
/// enforces task timeouts.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealCommandRunner;

impl RealCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for RealCommandRunner {
    fn execute(
        &self,
        request: CommandRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutput>> + Send + '_>> {
        Box::pin(run_command(request))
    }
}

async fn run_command(request: CommandRequest) -> Result<CommandOutput> {
    debug!(cmd = %request.command, threads = request.threads, "starting process");

    // Build a shell command appropriate for the platform.
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&request.command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&request.command);
        c
    };

    if request.threads > 1 {
        cmd.env("OMP_NUM_THREADS", request.threads.to_string());
    }

    match &request.log_path {
        Some(log_path) => {
            if let Some(parent) = log_path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await.with_context(|| {
                        format!("creating log directory {}", parent.display())
                    })?;
                }
            }
            let log_file = tokio::fs::File::create(log_path)
                .await
                .with_context(|| format!("creating log file {}", log_path.display()))?
                .into_std()
                .await;
            let err_file = log_file
                .try_clone()
                .with_context(|| format!("duplicating handle for {}", log_path.display()))?;
            cmd.stdout(Stdio::from(log_file)).stderr(Stdio::from(err_file));
        }
        None => {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }
    }

    cmd.stdin(Stdio::null()).kill_on_drop(true);
    // Compound commands fork the real tool below the shell. A fresh group
    // lets a timeout reach all of them.
    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd
        .spawn()
        .with_context(|| format!("spawning process for '{}'", request.command))?;

    #[cfg(unix)]
    let mut group = ProcessGroupGuard::new(child.id());

    let output = child
        .wait_with_output()
        .await
        .with_context(|| format!("waiting for process of '{}'", request.command))?;

    #[cfg(unix)]
    group.disarm();

    let exit_code = output.status.code();
    info!(
        cmd = %request.command,
        exit_code = exit_code.unwrap_or(-1),
        success = output.status.success(),
        "process exited"
    );

    Ok(CommandOutput {
        exit_code,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Sends `SIGKILL` to a process group when dropped while still armed.
#[cfg(unix)]
struct ProcessGroupGuard {
    pgid: Option<libc::pid_t>,
}

#[cfg(unix)]
impl ProcessGroupGuard {
    fn new(leader: Option<u32>) -> Self {
        Self {
            pgid: leader.and_then(|pid| libc::pid_t::try_from(pid).ok()),
        }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

#[cfg(unix)]
impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            debug!(pgid, "killing process group");
            // SAFETY: kill(2) has no memory-safety preconditions. A negative
            // pid addresses the group created by `process_group(0)`.
            let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
            if rc != 0 {
                debug!(pgid, error = %std::io::Error::last_os_error(), "process group already gone");
            }
        }
    }
}
