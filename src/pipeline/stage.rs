// src/pipeline/stage.rs

use std::fmt::Debug;
use std::path::{Path, PathBuf};

use crate::config::ConfigFile;
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::sched::Task;
use crate::stages::samples::{Sample, discover_samples};

/// Everything a stage needs to describe its work.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub config: &'a ConfigFile,
    pub fs: &'a dyn FileSystem,
}

impl<'a> StageContext<'a> {
    pub fn new(config: &'a ConfigFile, fs: &'a dyn FileSystem) -> Self {
        Self { config, fs }
    }

    pub fn samples(&self) -> Result<Vec<Sample>> {
        discover_samples(self.fs, &self.config.pipeline.samples_dir, &self.config.samples)
    }

    pub fn reference(&self) -> &Path {
        &self.config.pipeline.reference
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.pipeline.output_dir
    }

    /// `output_dir/<parts...>`.
    pub fn out(&self, parts: &[&str]) -> PathBuf {
        parts
            .iter()
            .fold(self.output_dir().to_path_buf(), |acc, part| acc.join(part))
    }

    /// Executable for `tool`, honouring `[software]` overrides.
    pub fn tool(&self, tool: &str) -> String {
        self.config.tool_path(tool)
    }

    /// A task carrying the stage's resource hints and its log path.
    ///
    /// Hints come from `[stage.<id>]`, falling back to the `[resources]`
    /// per-task defaults.
    pub fn task(&self, stage_id: &str, name: impl Into<String>, command: impl Into<String>) -> Task {
        let name = name.into();
        let overrides = self.config.stage_overrides(stage_id);
        let log_path = self
            .config
            .logs_dir()
            .join(stage_id)
            .join(format!("{}.log", name.replace(':', "_")));

        Task::new(name, command)
            .with_threads(self.threads(stage_id))
            .with_memory_gb(self.config.stage_memory_gb(stage_id))
            .with_priority(overrides.priority.unwrap_or(0))
            .with_log_path(log_path)
    }

    /// Thread hint for each task of `stage_id`.
    pub fn threads(&self, stage_id: &str) -> u32 {
        self.config.stage_threads(stage_id)
    }

    /// `[stage.<id>].extra_args` with a leading space, or nothing.
    pub fn extra_args(&self, stage_id: &str) -> String {
        match self.config.stage_overrides(stage_id).extra_args {
            Some(args) if !args.trim().is_empty() => format!(" {}", args.trim()),
            _ => String::new(),
        }
    }

    /// `mkdir -p <tmp> && gatk --java-options "<opts> -Djava.io.tmpdir=<tmp>"`.
    pub fn gatk(&self, tmp_dir: &Path) -> String {
        format!(
            "mkdir -p {tmp} && {} --java-options \"{} -Djava.io.tmpdir={tmp}\"",
            self.tool("gatk"),
            self.config.gatk.java_options,
            tmp = tmp_dir.display()
        )
    }
}

/// A named step of the pipeline.
///
/// Stages are statically defined; the catalog fixes their order.
pub trait Stage: Send + Sync + Debug {
    /// Stable identifier used on the CLI and in the progress file.
    fn id(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// External programs the stage's commands invoke.
    fn required_tools(&self) -> &'static [&'static str];

    /// Stages whose outputs this stage reads.
    fn upstream(&self) -> &'static [&'static str] {
        &[]
    }

    /// Files that must exist before the stage may start.
    fn input_files(&self, ctx: &StageContext<'_>) -> Result<Vec<PathBuf>>;

    /// Files the stage produces; removed before a re-run.
    fn output_files(&self, ctx: &StageContext<'_>) -> Result<Vec<PathBuf>>;

    /// The commands to run.
    fn build_tasks(&self, ctx: &StageContext<'_>) -> Result<Vec<Task>>;
}
