// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::parse_duration;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [pipeline]
/// reference = "ref/genome.fasta"
/// samples_dir = "data/samples"
/// output_dir = "results"
///
/// [resources]
/// max_parallel_tasks = 4
/// max_memory_gb = 32
///
/// [stage.bwa_map]
/// threads = 8
/// ```
///
/// Only `[pipeline]` is required; every other section has defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub pipeline: PipelineSection,

    #[serde(default)]
    pub samples: SampleSection,

    #[serde(default)]
    pub resources: ResourceSection,

    /// Tool name -> executable path overrides from `[software]`.
    #[serde(default)]
    pub software: BTreeMap<String, String>,

    #[serde(default)]
    pub gatk: GatkSection,

    /// Per-stage overrides from `[stage.<id>]`.
    #[serde(default)]
    pub stage: BTreeMap<String, StageOverrides>,
}

/// Validated configuration.
///
/// Only obtainable through `ConfigFile::try_from(RawConfigFile)` (see
/// `validate.rs`), apart from [`ResourceSection::auto_tune`] which fills in
/// derived defaults once at startup.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub pipeline: PipelineSection,
    pub samples: SampleSection,
    pub resources: ResourceSection,
    pub software: BTreeMap<String, String>,
    pub gatk: GatkSection,
    pub stage: BTreeMap<String, StageOverrides>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            pipeline: raw.pipeline,
            samples: raw.samples,
            resources: raw.resources,
            software: raw.software,
            gatk: raw.gatk,
            stage: raw.stage,
        }
    }

    /// Executable to invoke for `tool`, honouring `[software]` overrides.
    pub fn tool_path(&self, tool: &str) -> String {
        self.software
            .get(tool)
            .cloned()
            .unwrap_or_else(|| tool.to_string())
    }

    /// Overrides for a stage, or the empty set.
    pub fn stage_overrides(&self, stage_id: &str) -> StageOverrides {
        self.stage.get(stage_id).cloned().unwrap_or_default()
    }

    /// Location of the persisted progress file.
    pub fn progress_path(&self) -> PathBuf {
        self.pipeline.output_dir.join(".progress")
    }

    /// Directory holding per-task log files.
    pub fn logs_dir(&self) -> PathBuf {
        self.pipeline.output_dir.join("logs")
    }
}

/// `[pipeline]` section: the files every run needs.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PipelineSection {
    /// Reference genome FASTA.
    #[serde(default)]
    pub reference: PathBuf,

    /// Directory containing the per-sample FASTQ files.
    #[serde(default)]
    pub samples_dir: PathBuf,

    /// Root of every output directory and of the progress file.
    #[serde(default)]
    pub output_dir: PathBuf,
}

/// `[samples]` section: how FASTQ files map to sample names.
#[derive(Debug, Clone, Deserialize)]
pub struct SampleSection {
    #[serde(default = "default_read1_suffix")]
    pub read1_suffix: String,

    /// Mate suffix; a sample without a mate file is treated as single-end.
    #[serde(default = "default_read2_suffix")]
    pub read2_suffix: String,
}

fn default_read1_suffix() -> String {
    "_clean_1.fastq.gz".to_string()
}

fn default_read2_suffix() -> String {
    "_clean_2.fastq.gz".to_string()
}

impl Default for SampleSection {
    fn default() -> Self {
        Self {
            read1_suffix: default_read1_suffix(),
            read2_suffix: default_read2_suffix(),
        }
    }
}

/// `[resources]` section.
///
/// Every ceiling is optional; missing values are derived from the host by
/// [`ResourceSection::auto_tune`].
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceSection {
    /// Maximum number of tasks running at once.
    #[serde(default)]
    pub max_parallel_tasks: Option<usize>,

    /// Global thread budget shared by all running tasks.
    #[serde(default)]
    pub max_threads: Option<u32>,

    /// Global memory budget in GB shared by all running tasks.
    #[serde(default)]
    pub max_memory_gb: Option<u32>,

    /// Share of system memory used when `max_memory_gb` is not set.
    #[serde(default = "default_memory_fraction")]
    pub memory_fraction: f64,

    /// Default thread hint for tasks whose stage has no override.
    #[serde(default)]
    pub threads_per_task: Option<u32>,

    /// Default memory hint (GB) for tasks whose stage has no override.
    #[serde(default)]
    pub memory_per_task_gb: Option<u32>,

    /// Hard limit on a single external process (e.g. `"12h"`). Unset means
    /// tasks may run forever.
    #[serde(default)]
    pub task_timeout: Option<String>,
}

fn default_memory_fraction() -> f64 {
    0.8
}

impl Default for ResourceSection {
    fn default() -> Self {
        Self {
            max_parallel_tasks: None,
            max_threads: None,
            max_memory_gb: None,
            memory_fraction: default_memory_fraction(),
            threads_per_task: None,
            memory_per_task_gb: None,
            task_timeout: None,
        }
    }
}

impl ResourceSection {
    /// Parsed `task_timeout`.
    pub fn timeout(&self) -> Result<Option<Duration>, String> {
        self.task_timeout.as_deref().map(parse_duration).transpose()
    }
}

/// `[gatk]` section: JVM options and tool parameters passed verbatim.
#[derive(Debug, Clone, Deserialize)]
pub struct GatkSection {
    #[serde(default = "default_java_options")]
    pub java_options: String,

    #[serde(default = "default_haplotype_caller_params")]
    pub haplotype_caller_params: String,

    #[serde(default = "default_genotype_gvcfs_params")]
    pub genotype_gvcfs_params: String,

    #[serde(default = "default_variant_filtration_params")]
    pub variant_filtration_params: String,
}

fn default_java_options() -> String {
    "-Xmx4g".to_string()
}

fn default_haplotype_caller_params() -> String {
    "--pcr-indel-model CONSERVATIVE -ERC GVCF".to_string()
}

fn default_genotype_gvcfs_params() -> String {
    "--max-alternate-alleles 2".to_string()
}

fn default_variant_filtration_params() -> String {
    "--filter-expression 'QD < 2.0 || FS > 60.0 || MQ < 40.0 || MQRankSum < -12.5 || ReadPosRankSum < -8.0 || SOR > 3.0' --filter-name 'hard_filter'"
        .to_string()
}

impl Default for GatkSection {
    fn default() -> Self {
        Self {
            java_options: default_java_options(),
            haplotype_caller_params: default_haplotype_caller_params(),
            genotype_gvcfs_params: default_genotype_gvcfs_params(),
            variant_filtration_params: default_variant_filtration_params(),
        }
    }
}

/// `[stage.<id>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StageOverrides {
    /// Threads requested by each task of this stage.
    #[serde(default)]
    pub threads: Option<u32>,

    /// Memory (GB) requested by each task of this stage.
    #[serde(default)]
    pub memory_gb: Option<u32>,

    /// Scheduling priority of this stage's tasks; higher runs first.
    #[serde(default)]
    pub priority: Option<i32>,

    /// Appended verbatim to the stage's main command.
    #[serde(default)]
    pub extra_args: Option<String>,
}
