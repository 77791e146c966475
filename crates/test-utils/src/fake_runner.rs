use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use snpflow::exec::{CommandOutput, CommandRequest, CommandRunner};

#[derive(Debug, Clone)]
enum Behaviour {
    Exit { code: i32, stderr: String },
    Delay(Duration),
    SpawnError,
}

#[derive(Debug, Default)]
struct State {
    /// (substring of command, behaviour); first match wins per kind.
    rules: Mutex<Vec<(String, Behaviour)>>,
    default_delay: Mutex<Duration>,
    executed: Mutex<Vec<CommandRequest>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

/// A scripted command runner that:
/// - records every request in start order
/// - succeeds unless a rule says otherwise
/// - tracks how many commands were in flight at once.
///
/// Clones share state, so a test can keep one handle and give another to
/// the scheduler.
#[derive(Debug, Clone, Default)]
pub struct FakeRunner {
    state: Arc<State>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command sleeps this long before completing.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.state.default_delay.lock().unwrap() = delay;
        self
    }

    /// Commands containing `pattern` exit with `code`.
    pub fn fail_when(self, pattern: &str, code: i32) -> Self {
        self.push_rule(
            pattern,
            Behaviour::Exit {
                code,
                stderr: format!("simulated failure of '{pattern}'"),
            },
        )
    }

    /// Commands containing `pattern` sleep for `delay` instead of the default.
    pub fn delay_when(self, pattern: &str, delay: Duration) -> Self {
        self.push_rule(pattern, Behaviour::Delay(delay))
    }

    /// Commands containing `pattern` cannot be spawned.
    pub fn spawn_error_when(self, pattern: &str) -> Self {
        self.push_rule(pattern, Behaviour::SpawnError)
    }

    fn push_rule(self, pattern: &str, behaviour: Behaviour) -> Self {
        self.state
            .rules
            .lock()
            .unwrap()
            .push((pattern.to_string(), behaviour));
        self
    }

    /// Commands in the order they started.
    pub fn executed(&self) -> Vec<String> {
        self.state
            .executed
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.command.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<CommandRequest> {
        self.state.executed.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.executed.lock().unwrap().len()
    }

    /// Highest number of commands observed running simultaneously.
    pub fn max_concurrency(&self) -> usize {
        self.state.max_running.load(Ordering::SeqCst)
    }

    fn plan_for(&self, command: &str) -> (Duration, Option<Behaviour>) {
        let rules = self.state.rules.lock().unwrap();
        let mut delay = *self.state.default_delay.lock().unwrap();
        let mut outcome = None;
        for (pattern, behaviour) in rules.iter() {
            if !command.contains(pattern.as_str()) {
                continue;
            }
            match behaviour {
                Behaviour::Delay(d) => delay = *d,
                other if outcome.is_none() => outcome = Some(other.clone()),
                _ => {}
            }
        }
        (delay, outcome)
    }
}

impl CommandRunner for FakeRunner {
    fn execute(
        &self,
        request: CommandRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutput>> + Send + '_>> {
        Box::pin(async move {
            let (delay, outcome) = self.plan_for(&request.command);
            let command = request.command.clone();
            self.state.executed.lock().unwrap().push(request);

            if let Some(Behaviour::SpawnError) = outcome {
                return Err(anyhow!("simulated spawn failure for '{command}'"));
            }

            let now = self.state.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.state.max_running.fetch_max(now, Ordering::SeqCst);

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            } else {
                tokio::task::yield_now().await;
            }

            self.state.running.fetch_sub(1, Ordering::SeqCst);

            match outcome {
                Some(Behaviour::Exit { code, stderr }) => Ok(CommandOutput {
                    exit_code: Some(code),
                    stdout: String::new(),
                    stderr,
                }),
                _ => Ok(CommandOutput {
                    exit_code: Some(0),
                    stdout: format!("ran: {command}"),
                    stderr: String::new(),
                }),
            }
        })
    }
}
