use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use snpflow::tools::ToolChecker;

/// Tool checker that finds everything except the tools it is told are
/// missing, and records every lookup.
#[derive(Debug, Clone, Default)]
pub struct FakeToolChecker {
    missing: BTreeSet<String>,
    lookups: Arc<Mutex<Vec<String>>>,
}

impl FakeToolChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without(mut self, tool: &str) -> Self {
        self.missing.insert(tool.to_string());
        self
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

impl ToolChecker for FakeToolChecker {
    fn locate(&self, tool: &str) -> Option<PathBuf> {
        self.lookups.lock().unwrap().push(tool.to_string());
        if self.missing.contains(tool) {
            None
        } else {
            Some(PathBuf::from("/fake/bin").join(tool))
        }
    }
}
