// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running the commands built by the
//! stages, using `tokio::process::Command`.
//!
//! - [`backend`] provides the `CommandRunner` trait and its request/response
//!   types, which tests replace with a scripted implementation.
//! - [`task_runner`] holds `RealCommandRunner`, the production implementation.

pub mod backend;
pub mod task_runner;

pub use backend::{CommandOutput, CommandRequest, CommandRunner};
pub use task_runner::RealCommandRunner;
