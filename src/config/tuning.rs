// src/config/tuning.rs

//! Host-derived resource defaults.
//!
//! Missing `[resources]` ceilings are filled in once at startup from the
//! detected CPU count and system memory. After [`ResourceSection::auto_tune`]
//! every optional ceiling is `Some`.

use std::time::Duration;

use sysinfo::System;
use tracing::{debug, info};

use crate::config::model::{ConfigFile, ResourceSection};
use crate::sched::ResourceLimits;

/// Per-task hint used when neither the stage nor `[resources]` sets one.
const DEFAULT_TASK_THREADS: u32 = 4;
const DEFAULT_TASK_MEMORY_GB: u32 = 4;

const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// What the host offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostResources {
    pub cpus: usize,
    pub total_memory_gb: u64,
}

impl HostResources {
    /// Read CPU count and total memory of the current machine.
    pub fn detect() -> Self {
        let mut system = System::new();
        system.refresh_all();

        let cpus = system.cpus().len().max(1);
        let total_memory_gb = (system.total_memory() / BYTES_PER_GB).max(1);

        debug!(cpus, total_memory_gb, "detected host resources");
        Self {
            cpus,
            total_memory_gb,
        }
    }
}

impl ResourceSection {
    /// Fill unset ceilings and per-task hints from `host`.
    ///
    /// - worker and thread ceilings: CPU count minus one reserved core (min 1)
    /// - memory ceiling: `memory_fraction` of system memory (min 1 GB)
    /// - per-task hints: the built-in defaults clamped to the ceilings
    pub fn auto_tune(&mut self, host: &HostResources) {
        let usable_cpus = host.cpus.saturating_sub(1).max(1);

        let max_parallel = *self.max_parallel_tasks.get_or_insert(usable_cpus);
        let max_threads = *self
            .max_threads
            .get_or_insert(u32::try_from(usable_cpus).unwrap_or(u32::MAX));

        let fraction_gb = (host.total_memory_gb as f64 * self.memory_fraction).floor() as u64;
        let max_memory = *self
            .max_memory_gb
            .get_or_insert(u32::try_from(fraction_gb.max(1)).unwrap_or(u32::MAX));

        let threads = *self
            .threads_per_task
            .get_or_insert(DEFAULT_TASK_THREADS.min(max_threads));
        let memory = *self
            .memory_per_task_gb
            .get_or_insert(DEFAULT_TASK_MEMORY_GB.min(max_memory));

        info!(
            max_parallel_tasks = max_parallel,
            max_threads,
            max_memory_gb = max_memory,
            threads_per_task = threads,
            memory_per_task_gb = memory,
            "resource ceilings resolved"
        );
    }
}

impl ConfigFile {
    /// Threads each task of `stage_id` asks for: `[stage.<id>]`, then the
    /// `[resources]` per-task default, then 1.
    pub fn stage_threads(&self, stage_id: &str) -> u32 {
        self.stage_overrides(stage_id)
            .threads
            .or(self.resources.threads_per_task)
            .unwrap_or(1)
    }

    /// Memory each task of `stage_id` asks for, resolved like
    /// [`ConfigFile::stage_threads`].
    pub fn stage_memory_gb(&self, stage_id: &str) -> u32 {
        self.stage_overrides(stage_id)
            .memory_gb
            .or(self.resources.memory_per_task_gb)
            .unwrap_or(1)
    }

    /// Scheduler ceilings; call after [`ResourceSection::auto_tune`].
    pub fn scheduler_limits(&self) -> ResourceLimits {
        let res = &self.resources;
        ResourceLimits {
            max_parallel_tasks: res.max_parallel_tasks.unwrap_or(1),
            max_threads: res.max_threads.unwrap_or(1),
            max_memory_gb: res.max_memory_gb.unwrap_or(1),
        }
    }

    /// Validated `task_timeout`; malformed values were rejected at load time.
    pub fn task_timeout(&self) -> Option<Duration> {
        self.resources.timeout().ok().flatten()
    }
}
