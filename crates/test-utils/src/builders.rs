#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use snpflow::config::{
    ConfigFile, GatkSection, PipelineSection, RawConfigFile, ResourceSection, SampleSection,
    StageOverrides,
};
use snpflow::fs::mock::MockFileSystem;
use snpflow::sched::ResourceLimits;

/// Builder for `ConfigFile` to simplify test setup.
///
/// Defaults: reference `ref/genome.fasta`, samples in `samples/`, outputs in
/// `out/`, ceilings of 4 tasks / 8 threads / 16 GB and 1 thread / 1 GB per
/// task, so tests never depend on the host.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                pipeline: PipelineSection {
                    reference: PathBuf::from("ref/genome.fasta"),
                    samples_dir: PathBuf::from("samples"),
                    output_dir: PathBuf::from("out"),
                },
                samples: SampleSection::default(),
                resources: ResourceSection {
                    max_parallel_tasks: Some(4),
                    max_threads: Some(8),
                    max_memory_gb: Some(16),
                    threads_per_task: Some(1),
                    memory_per_task_gb: Some(1),
                    ..ResourceSection::default()
                },
                software: BTreeMap::new(),
                gatk: GatkSection::default(),
                stage: BTreeMap::new(),
            },
        }
    }

    pub fn with_output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.pipeline.output_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_samples_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.pipeline.samples_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_reference(mut self, path: impl AsRef<Path>) -> Self {
        self.config.pipeline.reference = path.as_ref().to_path_buf();
        self
    }

    pub fn with_limits(mut self, parallel: usize, threads: u32, memory_gb: u32) -> Self {
        self.config.resources.max_parallel_tasks = Some(parallel);
        self.config.resources.max_threads = Some(threads);
        self.config.resources.max_memory_gb = Some(memory_gb);
        self
    }

    pub fn with_task_defaults(mut self, threads: u32, memory_gb: u32) -> Self {
        self.config.resources.threads_per_task = Some(threads);
        self.config.resources.memory_per_task_gb = Some(memory_gb);
        self
    }

    pub fn with_timeout(mut self, timeout: &str) -> Self {
        self.config.resources.task_timeout = Some(timeout.to_string());
        self
    }

    pub fn with_software(mut self, tool: &str, path: &str) -> Self {
        self.config
            .software
            .insert(tool.to_string(), path.to_string());
        self
    }

    pub fn with_stage(mut self, id: &str, overrides: StageOverrides) -> Self {
        self.config.stage.insert(id.to_string(), overrides);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `StageOverrides`.
#[derive(Default)]
pub struct StageOverridesBuilder {
    overrides: StageOverrides,
}

impl StageOverridesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threads(mut self, threads: u32) -> Self {
        self.overrides.threads = Some(threads);
        self
    }

    pub fn memory_gb(mut self, memory_gb: u32) -> Self {
        self.overrides.memory_gb = Some(memory_gb);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.overrides.priority = Some(priority);
        self
    }

    pub fn extra_args(mut self, args: &str) -> Self {
        self.overrides.extra_args = Some(args.to_string());
        self
    }

    pub fn build(self) -> StageOverrides {
        self.overrides
    }
}

pub fn limits(parallel: usize, threads: u32, memory_gb: u32) -> ResourceLimits {
    ResourceLimits {
        max_parallel_tasks: parallel,
        max_threads: threads,
        max_memory_gb: memory_gb,
    }
}

/// Put the reference and paired FASTQ files for `samples` into `fs`.
pub fn seed_inputs(fs: &MockFileSystem, cfg: &ConfigFile, samples: &[&str]) {
    fs.add_file(&cfg.pipeline.reference, ">chr1\nACGT\n");
    fs.add_dir(&cfg.pipeline.samples_dir);
    for sample in samples {
        for suffix in [&cfg.samples.read1_suffix, &cfg.samples.read2_suffix] {
            fs.add_file(
                cfg.pipeline.samples_dir.join(format!("{sample}{suffix}")),
                "@r\nACGT\n+\nIIII\n",
            );
        }
    }
}
