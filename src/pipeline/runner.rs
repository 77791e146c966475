// src/pipeline/runner.rs

//! Stage sequencing.
//!
//! Each stage moves `Pending -> Running -> Completed | Failed`. Stages run
//! strictly one after another: a stage's tasks are only submitted once the
//! previous stage's batch has fully finished. A failed stage halts the
//! invocation; nothing after it runs and it is not recorded as complete.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, info, warn};

use crate::config::ConfigFile;
use crate::errors::{Result, SnpflowError};
use crate::fs::FileSystem;
use crate::pipeline::catalog::StageCatalog;
use crate::pipeline::progress::{PipelineRunState, ProgressStore};
use crate::pipeline::stage::{Stage, StageContext};
use crate::sched::{Task, TaskFailure, TaskScheduler};
use crate::tools::ToolChecker;
use crate::types::{ExecutionMode, StageStatus};

/// Behaviour switches for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Skip stages already recorded as complete.
    pub resume: bool,
    /// Consult the tool checker before a stage first runs.
    pub check_tools: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            resume: false,
            check_tools: true,
        }
    }
}

/// Cooperative stop request, honoured at the next stage boundary.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: &'static str,
    pub status: StageStatus,
    pub tasks: usize,
}

/// The stage that halted the run and why each of its failed tasks failed.
#[derive(Debug, Clone)]
pub struct StageFailure {
    pub stage: &'static str,
    pub tasks: Vec<(String, TaskFailure)>,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub stages: Vec<StageReport>,
    pub failure: Option<StageFailure>,
    /// A stop was requested before every selected stage ran.
    pub stopped: bool,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && !self.stopped
    }

    pub fn status_of(&self, stage: &str) -> Option<StageStatus> {
        self.stages
            .iter()
            .find(|r| r.stage == stage)
            .map(|r| r.status)
    }
}

/// Dry-run view of one stage.
#[derive(Debug, Clone)]
pub struct StagePlan {
    pub stage: &'static str,
    pub description: &'static str,
    pub already_completed: bool,
    pub tasks: Vec<Task>,
}

pub struct Pipeline {
    config: ConfigFile,
    catalog: StageCatalog,
    scheduler: TaskScheduler,
    fs: Arc<dyn FileSystem>,
    tools: Arc<dyn ToolChecker>,
    store: ProgressStore,
    state: PipelineRunState,
    options: PipelineOptions,
    stop: StopHandle,
    tools_checked: HashSet<&'static str>,
}

impl Pipeline {
    pub fn new(
        config: ConfigFile,
        catalog: StageCatalog,
        scheduler: TaskScheduler,
        fs: Arc<dyn FileSystem>,
        tools: Arc<dyn ToolChecker>,
        options: PipelineOptions,
    ) -> Self {
        let store = ProgressStore::new(config.progress_path(), Arc::clone(&fs));
        Self {
            config,
            catalog,
            scheduler,
            fs,
            tools,
            store,
            state: PipelineRunState::new(),
            options,
            stop: StopHandle::default(),
            tools_checked: HashSet::new(),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self) -> &PipelineRunState {
        &self.state
    }

    pub fn catalog(&self) -> &StageCatalog {
        &self.catalog
    }

    pub async fn run(&mut self, mode: &ExecutionMode) -> Result<RunSummary> {
        match mode {
            ExecutionMode::All => self.run_all().await,
            ExecutionMode::Single(id) => self.run_single(id).await,
            ExecutionMode::From(id) => self.run_from(id).await,
        }
    }

    /// Every stage in order.
    ///
    /// Without resume this is a fresh run: persisted progress is ignored and
    /// overwritten by the first completion. With resume, the leading run of
    /// completed stages is skipped and everything after the first gap
    /// re-runs.
    pub async fn run_all(&mut self) -> Result<RunSummary> {
        if self.options.resume {
            self.state = self.store.load(&self.catalog)?;
        } else {
            self.state = PipelineRunState::new();
        }
        self.run_range(0).await
    }

    /// The named stage and every stage after it.
    ///
    /// Completions of earlier stages are kept; only the starting stage's
    /// inputs are checked up front.
    pub async fn run_from(&mut self, stage_id: &str) -> Result<RunSummary> {
        let start = self.catalog.require(stage_id)?;
        self.state = self.store.load(&self.catalog)?;
        self.run_range(start).await
    }

    /// Exactly one stage, regardless of what came before it.
    pub async fn run_single(&mut self, stage_id: &str) -> Result<RunSummary> {
        let idx = self.catalog.require(stage_id)?;
        self.state = self.store.load(&self.catalog)?;

        let mut summary = RunSummary::default();
        if self.stop.is_stop_requested() {
            warn!(stage = stage_id, "stop requested; not starting stage");
            summary.stopped = true;
            return Ok(summary);
        }

        self.check_inputs(idx)?;
        self.execute_stage(idx, &mut summary).await?;
        Ok(summary)
    }

    async fn run_range(&mut self, start: usize) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        let first_to_run = if self.options.resume {
            self.resume_point(start)
        } else {
            start
        };
        self.state.forget_from(&self.catalog, first_to_run);

        for idx in start..first_to_run {
            let id = self.catalog.stages()[idx].id();
            info!(stage = id, "stage already completed; skipping");
            summary.stages.push(StageReport {
                stage: id,
                status: StageStatus::Skipped,
                tasks: 0,
            });
        }

        if first_to_run == self.catalog.len() {
            info!("all selected stages already completed");
            return Ok(summary);
        }

        self.check_inputs(first_to_run)?;

        for idx in first_to_run..self.catalog.len() {
            if self.stop.is_stop_requested() {
                warn!(
                    next_stage = self.catalog.stages()[idx].id(),
                    "stop requested; halting before next stage"
                );
                summary.stopped = true;
                break;
            }

            if !self.execute_stage(idx, &mut summary).await? {
                break;
            }
        }

        Ok(summary)
    }

    /// First ordinal at or after `start` that is not complete.
    fn resume_point(&self, start: usize) -> usize {
        self.catalog
            .stages()
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, stage)| !self.state.is_completed(stage.id()))
            .map(|(idx, _)| idx)
            .unwrap_or(self.catalog.len())
    }

    /// Run the stage at `idx`. Returns whether it completed.
    async fn execute_stage(&mut self, idx: usize, summary: &mut RunSummary) -> Result<bool> {
        let stage = self.catalog.stages()[idx].as_ref();
        let id = stage.id();

        if self.options.check_tools && !self.tools_checked.contains(id) {
            let missing = self.tools.missing_tools(stage.required_tools());
            if !missing.is_empty() {
                error!(stage = id, missing = ?missing, "required tools not found");
                return Err(SnpflowError::MissingTools {
                    stage: id.to_string(),
                    tools: missing,
                });
            }
            self.tools_checked.insert(id);
        }

        let ctx = StageContext::new(&self.config, self.fs.as_ref());
        prepare_outputs(stage, &ctx)?;
        let tasks = stage.build_tasks(&ctx)?;
        let task_count = tasks.len();

        self.state.set_current(Some(id));
        info!(
            stage = id,
            ordinal = idx + 1,
            total = self.catalog.len(),
            tasks = task_count,
            "stage running"
        );

        let report = self.scheduler.submit(tasks).await;
        self.state.set_current(None);
        let report = report?;

        if report.all_succeeded() {
            self.state.mark_completed(id);
            self.store.persist(&self.state, &self.catalog)?;
            info!(stage = id, "stage completed");
            summary.stages.push(StageReport {
                stage: id,
                status: StageStatus::Completed,
                tasks: task_count,
            });
            return Ok(true);
        }

        let failed: Vec<(String, TaskFailure)> = report
            .failures()
            .map(|(name, failure)| (name.to_string(), failure.clone()))
            .collect();
        for (task, failure) in failed.iter() {
            error!(stage = id, task = %task, reason = %failure.reason, "task failed");
        }
        error!(
            stage = id,
            failed = failed.len(),
            tasks = task_count,
            "stage failed; halting"
        );

        summary.stages.push(StageReport {
            stage: id,
            status: StageStatus::Failed,
            tasks: task_count,
        });
        summary.failure = Some(StageFailure {
            stage: id,
            tasks: failed,
        });
        Ok(false)
    }

    fn check_inputs(&self, idx: usize) -> Result<()> {
        let stage = self.catalog.stages()[idx].as_ref();
        let ctx = StageContext::new(&self.config, self.fs.as_ref());

        let missing: Vec<_> = stage
            .input_files(&ctx)?
            .into_iter()
            .filter(|path| !self.fs.exists(path))
            .collect();

        if missing.is_empty() {
            return Ok(());
        }

        error!(stage = stage.id(), missing = missing.len(), "input files missing");
        Err(SnpflowError::MissingInputs {
            stage: stage.id().to_string(),
            paths: missing,
        })
    }

    /// Task plan for every stage `mode` selects, without running anything.
    pub fn plan(&self, mode: &ExecutionMode) -> Result<Vec<StagePlan>> {
        let persisted = self.store.load(&self.catalog)?;
        let range = match mode {
            ExecutionMode::All => 0..self.catalog.len(),
            ExecutionMode::Single(id) => {
                let idx = self.catalog.require(id)?;
                idx..idx + 1
            }
            ExecutionMode::From(id) => self.catalog.require(id)?..self.catalog.len(),
        };

        let ctx = StageContext::new(&self.config, self.fs.as_ref());
        self.catalog.stages()[range]
            .iter()
            .map(|stage| {
                Ok(StagePlan {
                    stage: stage.id(),
                    description: stage.description(),
                    already_completed: persisted.is_completed(stage.id()),
                    tasks: stage.build_tasks(&ctx)?,
                })
            })
            .collect()
    }
}

/// Create output directories and remove outputs left by an earlier attempt.
fn prepare_outputs(stage: &dyn Stage, ctx: &StageContext<'_>) -> Result<()> {
    for output in stage.output_files(ctx)? {
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                ctx.fs.create_dir_all(parent)?;
            }
        }
        if ctx.fs.is_file(&output) {
            info!(stage = stage.id(), path = %output.display(), "removing stale output");
            ctx.fs.remove_file(&output)?;
        }
    }
    Ok(())
}
