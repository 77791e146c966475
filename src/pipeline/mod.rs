// src/pipeline/mod.rs

//! Stage orchestration.
//!
//! - [`stage`]: the `Stage` trait and the context stages build tasks from.
//! - [`catalog`]: the ordered, validated stage list.
//! - [`progress`]: completed-stage state and the progress file.
//! - [`runner`]: `Pipeline`, which sequences stages through the scheduler.

pub mod catalog;
pub mod progress;
pub mod runner;
pub mod stage;

pub use catalog::StageCatalog;
pub use progress::{PipelineRunState, ProgressStore};
pub use runner::{
    Pipeline, PipelineOptions, RunSummary, StageFailure, StagePlan, StageReport, StopHandle,
};
pub use stage::{Stage, StageContext};
