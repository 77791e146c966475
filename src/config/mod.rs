// src/config/mod.rs

//! Configuration loading and validation for snpflow.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate paths, resources and stage overrides (`validate.rs`).
//! - Derive host-dependent resource defaults (`tuning.rs`).

pub mod loader;
pub mod model;
pub mod tuning;
pub mod validate;

pub use loader::{
    load_and_validate, load_from_path, render_template, write_new_config, write_template,
};
pub use model::{
    ConfigFile, GatkSection, PipelineSection, RawConfigFile, ResourceSection, SampleSection,
    StageOverrides,
};
pub use tuning::HostResources;
pub use validate::{validate_config, validate_stage_demands};
