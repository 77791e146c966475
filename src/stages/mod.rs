// src/stages/mod.rs

//! The variant-calling stage catalog.
//!
//! Output layout under `pipeline.output_dir`:
//!
//! ```text
//! mapped_reads/<s>.sam
//! sorted_reads/<s>.bam
//! marked_duplicates/<s>.bam, <s>.metrics.txt, <s>.bam.bai
//! gvcf/<s>.g.vcf.gz
//! vcf/cohort.g.vcf.gz, all.vcf.gz, all.filtered.vcf.gz, all.snp.vcf.gz,
//!     all.snp.soft_filtered.vcf.gz
//! gwas/snp.{bed,bim,fam}
//! logs/<stage>/<task>.log
//! tmp/
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::errors::{Result, SnpflowError};
use crate::pipeline::{Stage, StageContext};

pub mod alignment;
pub mod calling;
pub mod filtering;
pub mod gwas;
pub mod reference;
pub mod samples;

pub use samples::{Sample, discover_samples};

/// Stage ids in execution order.
pub const STAGE_IDS: [&str; 12] = [
    "ref_index",
    "bwa_map",
    "sort_sam",
    "mark_duplicates",
    "index_bam",
    "haplotype_caller",
    "combine_gvcfs",
    "genotype_gvcfs",
    "vcf_filter",
    "select_snp",
    "soft_filter_snp",
    "get_gwas_data",
];

/// Every stage, in execution order.
pub fn default_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(reference::RefIndex),
        Box::new(alignment::BwaMap),
        Box::new(alignment::SortSam),
        Box::new(alignment::MarkDuplicates),
        Box::new(alignment::IndexBam),
        Box::new(calling::HaplotypeCaller),
        Box::new(calling::CombineGvcfs),
        Box::new(calling::GenotypeGvcfs),
        Box::new(filtering::VcfFilter),
        Box::new(filtering::SelectSnp),
        Box::new(filtering::SoftFilterSnp),
        Box::new(gwas::GetGwasData),
    ]
}

/// Samples for a per-sample stage; an empty set is a missing input.
pub(crate) fn require_samples(ctx: &StageContext<'_>, stage_id: &str) -> Result<Vec<Sample>> {
    let samples = ctx.samples()?;
    if samples.is_empty() {
        return Err(SnpflowError::MissingInputs {
            stage: stage_id.to_string(),
            paths: vec![ctx.config.pipeline.samples_dir.clone()],
        });
    }
    Ok(samples)
}

/// `path` with `.ext` appended to the full file name (`a.fasta` -> `a.fasta.fai`).
pub(crate) fn with_suffix(path: &Path, ext: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(".");
    raw.push(ext);
    PathBuf::from(raw)
}

/// Files produced by indexing the reference.
pub(crate) fn reference_index_files(reference: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = ["0123", "amb", "ann", "bwt.2bit.64", "pac"]
        .iter()
        .map(|ext| with_suffix(reference, ext))
        .collect();
    files.push(sequence_dictionary(reference));
    files.push(with_suffix(reference, "fai"));
    files
}

/// `genome.fasta` -> `genome.dict`.
pub(crate) fn sequence_dictionary(reference: &Path) -> PathBuf {
    reference.with_extension("dict")
}

pub(crate) fn mapped_sam(ctx: &StageContext<'_>, sample: &str) -> PathBuf {
    ctx.out(&["mapped_reads", &format!("{sample}.sam")])
}

pub(crate) fn sorted_bam(ctx: &StageContext<'_>, sample: &str) -> PathBuf {
    ctx.out(&["sorted_reads", &format!("{sample}.bam")])
}

pub(crate) fn marked_bam(ctx: &StageContext<'_>, sample: &str) -> PathBuf {
    ctx.out(&["marked_duplicates", &format!("{sample}.bam")])
}

pub(crate) fn gvcf(ctx: &StageContext<'_>, sample: &str) -> PathBuf {
    ctx.out(&["gvcf", &format!("{sample}.g.vcf.gz")])
}

pub(crate) fn vcf(ctx: &StageContext<'_>, file: &str) -> PathBuf {
    ctx.out(&["vcf", file])
}

pub(crate) fn tmp_dir(ctx: &StageContext<'_>, name: &str) -> PathBuf {
    ctx.out(&["tmp", name])
}

/// `<stage>:<sample>`.
pub(crate) fn sample_task_name(stage_id: &str, sample: &str) -> String {
    format!("{stage_id}:{sample}")
}
