// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, SnpflowError};
use crate::stages::STAGE_IDS;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::SnpflowError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

/// Re-run validation on an already-built config (e.g. after auto-tuning).
pub fn validate_config(cfg: &ConfigFile) -> Result<()> {
    validate_resources(&cfg.resources)
}

/// Check that every stage's per-task demand fits the scheduler ceilings.
///
/// Run after auto-tuning so the ceilings are resolved. A stage that could
/// never be admitted is reported here instead of when the pipeline reaches it.
pub fn validate_stage_demands(cfg: &ConfigFile) -> Result<()> {
    let limits = cfg.scheduler_limits();
    for id in STAGE_IDS {
        let threads = cfg.stage_threads(id);
        let memory_gb = cfg.stage_memory_gb(id);
        if threads > limits.max_threads {
            return Err(config_error(format!(
                "[stage.{id}] needs {threads} threads per task but [resources].max_threads is {}",
                limits.max_threads
            )));
        }
        if memory_gb > limits.max_memory_gb {
            return Err(config_error(format!(
                "[stage.{id}] needs {memory_gb} GB per task but [resources].max_memory_gb is {}",
                limits.max_memory_gb
            )));
        }
    }
    Ok(())
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_pipeline_paths(cfg)?;
    validate_resources(&cfg.resources)?;
    validate_stage_overrides(cfg)?;
    validate_software(cfg)?;
    Ok(())
}

fn config_error(msg: impl Into<String>) -> SnpflowError {
    SnpflowError::ConfigError(msg.into())
}

fn validate_pipeline_paths(cfg: &RawConfigFile) -> Result<()> {
    let p = &cfg.pipeline;
    for (key, value) in [
        ("reference", &p.reference),
        ("samples_dir", &p.samples_dir),
        ("output_dir", &p.output_dir),
    ] {
        if value.as_os_str().is_empty() {
            return Err(config_error(format!("[pipeline].{key} must be set")));
        }
    }

    if cfg.samples.read1_suffix.is_empty() || cfg.samples.read2_suffix.is_empty() {
        return Err(config_error("[samples] read suffixes must not be empty"));
    }
    if cfg.samples.read1_suffix == cfg.samples.read2_suffix {
        return Err(config_error(
            "[samples].read1_suffix and read2_suffix must differ",
        ));
    }
    Ok(())
}

fn validate_resources(res: &crate::config::model::ResourceSection) -> Result<()> {
    if res.max_parallel_tasks == Some(0) {
        return Err(config_error(
            "[resources].max_parallel_tasks must be >= 1 (got 0)",
        ));
    }

    for (key, value) in [
        ("max_threads", res.max_threads),
        ("max_memory_gb", res.max_memory_gb),
        ("threads_per_task", res.threads_per_task),
        ("memory_per_task_gb", res.memory_per_task_gb),
    ] {
        if value == Some(0) {
            return Err(config_error(format!(
                "[resources].{key} must be >= 1 (got 0)"
            )));
        }
    }

    if !(res.memory_fraction > 0.0 && res.memory_fraction <= 1.0) {
        return Err(config_error(format!(
            "[resources].memory_fraction must be in (0, 1] (got {})",
            res.memory_fraction
        )));
    }

    res.timeout()
        .map_err(|e| config_error(format!("[resources].task_timeout: {e}")))?;

    Ok(())
}

fn validate_stage_overrides(cfg: &RawConfigFile) -> Result<()> {
    for (id, overrides) in cfg.stage.iter() {
        if !STAGE_IDS.contains(&id.as_str()) {
            return Err(config_error(format!(
                "[stage.{id}] does not name a known stage (expected one of: {})",
                STAGE_IDS.join(", ")
            )));
        }
        if overrides.threads == Some(0) {
            return Err(config_error(format!("[stage.{id}].threads must be >= 1")));
        }
        if overrides.memory_gb == Some(0) {
            return Err(config_error(format!(
                "[stage.{id}].memory_gb must be >= 1"
            )));
        }
    }
    Ok(())
}

fn validate_software(cfg: &RawConfigFile) -> Result<()> {
    for (tool, path) in cfg.software.iter() {
        if path.trim().is_empty() {
            return Err(config_error(format!(
                "[software].{tool} must not be an empty path"
            )));
        }
    }
    Ok(())
}
