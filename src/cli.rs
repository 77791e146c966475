// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::SampleSection;
use crate::testdata::TestDataOptions;
use crate::types::ExecutionMode;

/// Command-line arguments for `snpflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "snpflow",
    version,
    about = "Run the GATK SNP-calling pipeline under CPU and memory budgets.",
    long_about = None
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SNPFLOW_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Also append logs to this file.
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the pipeline (all stages, one stage, or from a stage onwards).
    Run(RunArgs),

    /// Print the stage catalog in execution order.
    ListSteps,

    /// Check that every external tool can be found.
    CheckDeps {
        /// Path to the config file (TOML), for `[software]` overrides.
        #[arg(long, value_name = "PATH", default_value = "snpflow.toml")]
        config: PathBuf,
    },

    /// Write an annotated starting config.
    Init {
        #[arg(long, value_name = "PATH", default_value = "snpflow.toml")]
        config: PathBuf,
    },

    /// Generate a small synthetic reference and FASTQ samples.
    TestData(TestDataArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `snpflow.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "snpflow.toml")]
    pub config: PathBuf,

    /// Run only this stage.
    #[arg(long, value_name = "STAGE", conflicts_with = "from_step")]
    pub step: Option<String>,

    /// Run this stage and every stage after it.
    #[arg(long, value_name = "STAGE")]
    pub from_step: Option<String>,

    /// Skip stages already recorded as complete.
    #[arg(long)]
    pub resume: bool,

    /// Do not look for external tools before running a stage.
    #[arg(long)]
    pub skip_tool_check: bool,

    /// Print every selected stage's tasks without executing anything.
    #[arg(long)]
    pub dry_run: bool,
}

impl RunArgs {
    pub fn mode(&self) -> ExecutionMode {
        match (&self.step, &self.from_step) {
            (Some(step), _) => ExecutionMode::Single(step.clone()),
            (None, Some(from)) => ExecutionMode::From(from.clone()),
            (None, None) => ExecutionMode::All,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct TestDataArgs {
    /// Directory that receives `reference/` and `samples/`.
    #[arg(long, value_name = "DIR")]
    pub output_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = SequencingType::Single)]
    pub sequencing_type: SequencingType,

    /// Also write a config pointing at the generated data.
    #[arg(long, value_name = "PATH")]
    pub create_config: Option<PathBuf>,

    #[arg(long, value_name = "SUFFIX", default_value = "_clean_1.fastq.gz")]
    pub read1_suffix: String,

    #[arg(long, value_name = "SUFFIX", default_value = "_clean_2.fastq.gz")]
    pub read2_suffix: String,

    #[arg(long, default_value_t = 3)]
    pub samples: usize,

    /// Bases per chromosome (three chromosomes are written).
    #[arg(long, default_value_t = 50_000)]
    pub chromosome_length: usize,

    #[arg(long, default_value_t = 15)]
    pub coverage: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

impl TestDataArgs {
    pub fn options(&self) -> TestDataOptions {
        let mut opts = TestDataOptions::new(&self.output_dir);
        opts.paired = self.sequencing_type == SequencingType::Paired;
        opts.naming = SampleSection {
            read1_suffix: self.read1_suffix.clone(),
            read2_suffix: self.read2_suffix.clone(),
        };
        opts.samples = self.samples;
        opts.chromosome_length = self.chromosome_length;
        opts.coverage = self.coverage;
        opts.seed = self.seed;
        opts
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum SequencingType {
    Single,
    Paired,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
