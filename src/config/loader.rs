// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::{ConfigFile, PipelineSection, RawConfigFile, SampleSection};
use crate::errors::{Result, SnpflowError};

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks required paths, resource values, `[stage.<id>]` names and
///   `[software]` overrides.
///
/// Resource ceilings are still unresolved afterwards; callers run
/// `ResourceSection::auto_tune` once before building a scheduler.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Annotated starting configuration written by `snpflow init`.
pub const CONFIG_TEMPLATE: &str = r#"# snpflow configuration

[pipeline]
reference = "path/to/reference.fasta"
samples_dir = "path/to/samples"
output_dir = "results"

[samples]
read1_suffix = "_clean_1.fastq.gz"
read2_suffix = "_clean_2.fastq.gz"

[resources]
# Unset ceilings are derived from the host (CPU count - 1, 80% of memory).
# max_parallel_tasks = 4
# max_threads = 16
# max_memory_gb = 32
memory_fraction = 0.8
threads_per_task = 4
memory_per_task_gb = 4
# task_timeout = "12h"

[software]
# gatk = "/opt/gatk/gatk"
# bwa-mem2 = "/usr/local/bin/bwa-mem2"

[gatk]
java_options = "-Xmx4g"

[stage.bwa_map]
threads = 8
memory_gb = 8
priority = 10
"#;

/// Write [`CONFIG_TEMPLATE`] to `path`, refusing to overwrite an existing file.
pub fn write_template(path: impl AsRef<Path>) -> Result<()> {
    write_new_config(path.as_ref(), CONFIG_TEMPLATE)
}

/// [`CONFIG_TEMPLATE`] with `[pipeline]` and `[samples]` filled in.
pub fn render_template(pipeline: &PipelineSection, samples: &SampleSection) -> String {
    let quoted = |value: &str| toml::Value::String(value.to_string()).to_string();
    let path = |p: &Path| quoted(&p.to_string_lossy());

    CONFIG_TEMPLATE
        .replace(
            "reference = \"path/to/reference.fasta\"",
            &format!("reference = {}", path(&pipeline.reference)),
        )
        .replace(
            "samples_dir = \"path/to/samples\"",
            &format!("samples_dir = {}", path(&pipeline.samples_dir)),
        )
        .replace(
            "output_dir = \"results\"",
            &format!("output_dir = {}", path(&pipeline.output_dir)),
        )
        .replace(
            "read1_suffix = \"_clean_1.fastq.gz\"",
            &format!("read1_suffix = {}", quoted(&samples.read1_suffix)),
        )
        .replace(
            "read2_suffix = \"_clean_2.fastq.gz\"",
            &format!("read2_suffix = {}", quoted(&samples.read2_suffix)),
        )
}

/// Write `contents` to `path`, refusing to overwrite an existing file.
pub fn write_new_config(path: &Path, contents: &str) -> Result<()> {
    if path.exists() {
        return Err(SnpflowError::ConfigError(format!(
            "config file {:?} already exists",
            path
        )));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, contents)?;
    Ok(())
}
