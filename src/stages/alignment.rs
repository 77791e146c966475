// src/stages/alignment.rs

//! Per-sample read processing: map, sort, mark duplicates, index.

use std::path::PathBuf;

use crate::errors::Result;
use crate::pipeline::{Stage, StageContext};
use crate::sched::Task;
use crate::stages::{
    mapped_sam, marked_bam, reference_index_files, require_samples, sample_task_name, sorted_bam,
    tmp_dir, with_suffix,
};

/// Aligns each sample's reads against the reference.
#[derive(Debug, Clone, Copy)]
pub struct BwaMap;

impl BwaMap {
    const ID: &'static str = "bwa_map";
}

impl Stage for BwaMap {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn description(&self) -> &'static str {
        "Map reads to the reference with bwa-mem2"
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["bwa-mem2"]
    }

    fn upstream(&self) -> &'static [&'static str] {
        &["ref_index"]
    }

    fn input_files(&self, ctx: &StageContext<'_>) -> Result<Vec<PathBuf>> {
        let mut files = vec![ctx.reference().to_path_buf()];
        files.extend(reference_index_files(ctx.reference()));
        for sample in require_samples(ctx, Self::ID)? {
            files.extend(sample.reads());
        }
        Ok(files)
    }

    fn output_files(&self, ctx: &StageContext<'_>) -> Result<Vec<PathBuf>> {
        Ok(require_samples(ctx, Self::ID)?
            .iter()
            .map(|s| mapped_sam(ctx, &s.name))
            .collect())
    }

    fn build_tasks(&self, ctx: &StageContext<'_>) -> Result<Vec<Task>> {
        let threads = ctx.threads(Self::ID);
        let extra = ctx.extra_args(Self::ID);

        Ok(require_samples(ctx, Self::ID)?
            .iter()
            .map(|sample| {
                let s = &sample.name;
                let reads = sample
                    .reads()
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                let command = format!(
                    "{} mem -R \"@RG\\tID:{s}\\tLB:{s}\\tPL:illumina\\tSM:{s}\" -t {threads}{extra} {} {reads} -o {}",
                    ctx.tool("bwa-mem2"),
                    ctx.reference().display(),
                    mapped_sam(ctx, s).display()
                );
                ctx.task(Self::ID, sample_task_name(Self::ID, s), command)
            })
            .collect())
    }
}

/// Converts each SAM into a coordinate-sorted BAM.
#[derive(Debug, Clone, Copy)]
pub struct SortSam;

impl SortSam {
    const ID: &'static str = "sort_sam";
}

impl Stage for SortSam {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn description(&self) -> &'static str {
        "Sort alignments into BAM with samtools"
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["samtools"]
    }

    fn upstream(&self) -> &'static [&'static str] {
        &["bwa_map"]
    }

    fn input_files(&self, ctx: &StageContext<'_>) -> Result<Vec<PathBuf>> {
        Ok(require_samples(ctx, Self::ID)?
            .iter()
            .map(|s| mapped_sam(ctx, &s.name))
            .collect())
    }

    fn output_files(&self, ctx: &StageContext<'_>) -> Result<Vec<PathBuf>> {
        Ok(require_samples(ctx, Self::ID)?
            .iter()
            .map(|s| sorted_bam(ctx, &s.name))
            .collect())
    }

    fn build_tasks(&self, ctx: &StageContext<'_>) -> Result<Vec<Task>> {
        // `-@` counts additional threads beyond the main one.
        let extra_threads = ctx.threads(Self::ID).saturating_sub(1);
        let extra = ctx.extra_args(Self::ID);

        Ok(require_samples(ctx, Self::ID)?
            .iter()
            .map(|sample| {
                let command = format!(
                    "{} sort -@ {extra_threads}{extra} -o {} {}",
                    ctx.tool("samtools"),
                    sorted_bam(ctx, &sample.name).display(),
                    mapped_sam(ctx, &sample.name).display()
                );
                ctx.task(Self::ID, sample_task_name(Self::ID, &sample.name), command)
            })
            .collect())
    }
}

/// Flags PCR/optical duplicates.
#[derive(Debug, Clone, Copy)]
pub struct MarkDuplicates;

impl MarkDuplicates {
    const ID: &'static str = "mark_duplicates";
}

impl Stage for MarkDuplicates {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn description(&self) -> &'static str {
        "Mark duplicate reads with GATK MarkDuplicates"
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["gatk"]
    }

    fn upstream(&self) -> &'static [&'static str] {
        &["sort_sam"]
    }

    fn input_files(&self, ctx: &StageContext<'_>) -> Result<Vec<PathBuf>> {
        Ok(require_samples(ctx, Self::ID)?
            .iter()
            .map(|s| sorted_bam(ctx, &s.name))
            .collect())
    }

    fn output_files(&self, ctx: &StageContext<'_>) -> Result<Vec<PathBuf>> {
        Ok(require_samples(ctx, Self::ID)?
            .iter()
            .flat_map(|s| [marked_bam(ctx, &s.name), metrics_file(ctx, &s.name)])
            .collect())
    }

    fn build_tasks(&self, ctx: &StageContext<'_>) -> Result<Vec<Task>> {
        let extra = ctx.extra_args(Self::ID);

        Ok(require_samples(ctx, Self::ID)?
            .iter()
            .map(|sample| {
                let s = &sample.name;
                let tmp = tmp_dir(ctx, &format!("markdup_{s}"));
                let command = format!(
                    "{} MarkDuplicates -I {} -O {} -M {} --TMP_DIR {} --CREATE_INDEX true --VALIDATION_STRINGENCY SILENT{extra}",
                    ctx.gatk(&tmp),
                    sorted_bam(ctx, s).display(),
                    marked_bam(ctx, s).display(),
                    metrics_file(ctx, s).display(),
                    tmp.display()
                );
                ctx.task(Self::ID, sample_task_name(Self::ID, s), command)
            })
            .collect())
    }
}

fn metrics_file(ctx: &StageContext<'_>, sample: &str) -> PathBuf {
    ctx.out(&["marked_duplicates", &format!("{sample}.metrics.txt")])
}

/// Writes a `.bai` next to every duplicate-marked BAM.
#[derive(Debug, Clone, Copy)]
pub struct IndexBam;

impl IndexBam {
    const ID: &'static str = "index_bam";
}

impl Stage for IndexBam {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn description(&self) -> &'static str {
        "Index duplicate-marked BAM files with samtools"
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["samtools"]
    }

    fn upstream(&self) -> &'static [&'static str] {
        &["mark_duplicates"]
    }

    fn input_files(&self, ctx: &StageContext<'_>) -> Result<Vec<PathBuf>> {
        Ok(require_samples(ctx, Self::ID)?
            .iter()
            .map(|s| marked_bam(ctx, &s.name))
            .collect())
    }

    fn output_files(&self, ctx: &StageContext<'_>) -> Result<Vec<PathBuf>> {
        Ok(require_samples(ctx, Self::ID)?
            .iter()
            .map(|s| with_suffix(&marked_bam(ctx, &s.name), "bai"))
            .collect())
    }

    fn build_tasks(&self, ctx: &StageContext<'_>) -> Result<Vec<Task>> {
        Ok(require_samples(ctx, Self::ID)?
            .iter()
            .map(|sample| {
                let command = format!(
                    "{} index {}",
                    ctx.tool("samtools"),
                    marked_bam(ctx, &sample.name).display()
                );
                ctx.task(Self::ID, sample_task_name(Self::ID, &sample.name), command)
            })
            .collect())
    }
}
