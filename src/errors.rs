// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnpflowError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    #[error("Invalid stage catalog: {0}")]
    CatalogError(String),

    /// A task can never be admitted because it asks for more than the
    /// scheduler ceilings allow.
    #[error(
        "task '{task}' requests {threads} threads / {memory_gb} GB but the scheduler ceiling is {max_threads} threads / {max_memory_gb} GB"
    )]
    ResourceExceeded {
        task: String,
        threads: u32,
        memory_gb: u32,
        max_threads: u32,
        max_memory_gb: u32,
    },

    #[error("Duplicate task name in batch: {0}")]
    DuplicateTask(String),

    #[error("stage '{stage}' is missing required tools: {}", .tools.join(", "))]
    MissingTools { stage: String, tools: Vec<String> },

    #[error("stage '{stage}' is missing input files: {}", format_paths(.paths))]
    MissingInputs { stage: String, paths: Vec<PathBuf> },

    /// Progress state could not be written; resuming later would be unsafe.
    #[error("failed to persist pipeline progress to {path:?}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SnpflowError>;
