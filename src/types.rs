// src/types.rs

use std::str::FromStr;
use std::time::Duration;

/// Which part of the stage catalog an invocation executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Every stage in ordinal order.
    All,
    /// Exactly one stage, bypassing ordering checks.
    Single(String),
    /// The named stage and everything after it.
    From(String),
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::All
    }
}

/// Terminal state of one stage within an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
    /// Already complete in persisted state; not re-run (resume mode).
    Skipped,
}

impl FromStr for StageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(StageStatus::Pending),
            "running" => Ok(StageStatus::Running),
            "completed" => Ok(StageStatus::Completed),
            "failed" => Ok(StageStatus::Failed),
            "skipped" => Ok(StageStatus::Skipped),
            other => Err(format!("invalid stage status: {other}")),
        }
    }
}

/// Parse durations like `"500ms"`, `"30s"`, `"5m"` or `"12h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
