// src/tools/mod.rs

//! Pre-flight lookup of the external programs a stage invokes.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::ConfigFile;

/// Answers whether external tools can be invoked.
pub trait ToolChecker: Send + Sync {
    /// Where `tool` resolves to, if anywhere.
    fn locate(&self, tool: &str) -> Option<PathBuf>;

    /// Tools from `tools` that cannot be found, in input order.
    fn missing_tools(&self, tools: &[&str]) -> Vec<String> {
        tools
            .iter()
            .filter(|tool| self.locate(tool).is_none())
            .map(|tool| tool.to_string())
            .collect()
    }

    fn all_required_tools_present(&self, tools: &[&str]) -> bool {
        self.missing_tools(tools).is_empty()
    }
}

/// Resolves tools through `[software]` overrides, then the `PATH`.
#[derive(Debug, Clone)]
pub struct PathToolChecker {
    overrides: BTreeMap<String, String>,
    search_path: Vec<PathBuf>,
}

impl PathToolChecker {
    pub fn new(overrides: BTreeMap<String, String>, path_var: Option<OsString>) -> Self {
        let search_path = path_var
            .map(|p| std::env::split_paths(&p).collect())
            .unwrap_or_default();
        Self {
            overrides,
            search_path,
        }
    }

    /// Checker for the current process environment.
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self::new(cfg.software.clone(), std::env::var_os("PATH"))
    }

    fn search(&self, program: &str) -> Option<PathBuf> {
        let as_path = Path::new(program);
        if as_path.components().count() > 1 || as_path.is_absolute() {
            return is_executable(as_path).then(|| as_path.to_path_buf());
        }

        self.search_path.iter().find_map(|dir| {
            candidate_names(program)
                .into_iter()
                .map(|name| dir.join(name))
                .find(|candidate| is_executable(candidate))
        })
    }
}

impl ToolChecker for PathToolChecker {
    fn locate(&self, tool: &str) -> Option<PathBuf> {
        let program = self.overrides.get(tool).map(String::as_str).unwrap_or(tool);
        let found = self.search(program);
        debug!(tool, program, found = ?found, "tool lookup");
        found
    }
}

fn candidate_names(program: &str) -> Vec<String> {
    if cfg!(windows) {
        vec![
            program.to_string(),
            format!("{program}.exe"),
            format!("{program}.bat"),
            format!("{program}.cmd"),
        ]
    } else {
        vec![program.to_string()]
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
