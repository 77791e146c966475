// src/stages/samples.rs

//! Sample discovery from the FASTQ directory.

use std::path::{Path, PathBuf};

use anyhow::Context;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::SampleSection;
use crate::errors::{Result, SnpflowError};
use crate::fs::FileSystem;

/// Sample names end up inside shell command lines.
const SAMPLE_NAME_PATTERN: &str = r"^[A-Za-z0-9._-]+$";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub name: String,
    pub read1: PathBuf,
    /// Mate file; `None` for single-end data.
    pub read2: Option<PathBuf>,
}

impl Sample {
    pub fn is_paired(&self) -> bool {
        self.read2.is_some()
    }

    /// All FASTQ files belonging to this sample.
    pub fn reads(&self) -> Vec<PathBuf> {
        std::iter::once(self.read1.clone())
            .chain(self.read2.clone())
            .collect()
    }
}

/// Find every `<name><read1_suffix>` file in `dir`, sorted by name.
///
/// A missing directory yields no samples; stages that need samples report
/// that as a missing input.
pub fn discover_samples(
    fs: &dyn FileSystem,
    dir: &Path,
    naming: &SampleSection,
) -> Result<Vec<Sample>> {
    if !fs.is_dir(dir) {
        warn!(dir = %dir.display(), "samples directory not found");
        return Ok(Vec::new());
    }

    let valid_name = Regex::new(SAMPLE_NAME_PATTERN).context("compiling sample name pattern")?;

    let mut samples = Vec::new();
    for entry in fs.read_dir(dir)? {
        if !fs.is_file(&entry) {
            continue;
        }
        let Some(file_name) = entry.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(name) = file_name.strip_suffix(naming.read1_suffix.as_str()) else {
            continue;
        };

        if !valid_name.is_match(name) {
            return Err(SnpflowError::ConfigError(format!(
                "sample file {:?} yields invalid sample name '{}' (allowed: letters, digits, '.', '_', '-')",
                entry, name
            )));
        }

        let mate = dir.join(format!("{name}{}", naming.read2_suffix));
        let read2 = fs.is_file(&mate).then_some(mate);

        debug!(sample = name, paired = read2.is_some(), "discovered sample");
        samples.push(Sample {
            name: name.to_string(),
            read1: entry.clone(),
            read2,
        });
    }

    samples.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(samples)
}
