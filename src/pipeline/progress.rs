// src/pipeline/progress.rs

//! Completed-stage bookkeeping and its on-disk form.
//!
//! The progress file holds one completed stage id per line, in catalog
//! order. It is replaced atomically: the new content goes to a sibling temp
//! file which is then renamed over the old one.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::{Result, SnpflowError};
use crate::fs::FileSystem;
use crate::pipeline::catalog::StageCatalog;

/// Which stages are done, and which one is running.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineRunState {
    completed: BTreeSet<String>,
    current: Option<String>,
}

impl PipelineRunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_completed(&self, stage_id: &str) -> bool {
        self.completed.contains(stage_id)
    }

    pub fn completed_stage_ids(&self) -> &BTreeSet<String> {
        &self.completed
    }

    pub fn current_stage_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub(crate) fn mark_completed(&mut self, stage_id: &str) {
        self.completed.insert(stage_id.to_string());
    }

    pub(crate) fn set_current(&mut self, stage_id: Option<&str>) {
        self.current = stage_id.map(str::to_string);
    }

    /// Drop every completed stage at or after ordinal `from`.
    pub(crate) fn forget_from(&mut self, catalog: &StageCatalog, from: usize) {
        for id in catalog.ids().skip(from) {
            if self.completed.remove(id) {
                debug!(stage = id, "dropping completion of stage that will re-run");
            }
        }
    }

    /// Completed ids in catalog order.
    pub fn ordered_ids(&self, catalog: &StageCatalog) -> Vec<&'static str> {
        catalog.ids().filter(|id| self.is_completed(id)).collect()
    }
}

/// Reads and writes [`PipelineRunState`] through a [`FileSystem`].
#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl ProgressStore {
    pub fn new(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            path: path.into(),
            fs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load persisted state. A missing file is an empty state; blank lines
    /// are ignored and ids the catalog does not know are dropped.
    pub fn load(&self, catalog: &StageCatalog) -> Result<PipelineRunState> {
        let mut state = PipelineRunState::new();
        if !self.fs.exists(&self.path) {
            debug!(path = %self.path.display(), "no progress file; starting fresh");
            return Ok(state);
        }

        let contents = self.fs.read_to_string(&self.path)?;
        for line in contents.lines() {
            let id = line.trim();
            if id.is_empty() {
                continue;
            }
            if catalog.contains(id) {
                state.mark_completed(id);
            } else {
                warn!(stage = id, path = %self.path.display(), "ignoring unknown stage in progress file");
            }
        }

        debug!(completed = ?state.ordered_ids(catalog), "loaded progress");
        Ok(state)
    }

    /// Atomically replace the progress file with `state`.
    pub fn persist(&self, state: &PipelineRunState, catalog: &StageCatalog) -> Result<()> {
        let mut contents = state.ordered_ids(catalog).join("\n");
        if !contents.is_empty() {
            contents.push('\n');
        }

        let tmp = self.temp_path();
        let persist_err = |err: anyhow::Error| SnpflowError::Persistence {
            path: self.path.clone(),
            reason: format!("{err:#}"),
        };

        self.fs
            .write(&tmp, contents.as_bytes())
            .map_err(persist_err)?;
        self.fs.rename(&tmp, &self.path).map_err(persist_err)?;

        debug!(path = %self.path.display(), "progress persisted");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name: OsString = self
            .path
            .file_name()
            .map(|n| n.to_owned())
            .unwrap_or_else(|| OsString::from("progress"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
