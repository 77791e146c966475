// src/stages/calling.rs

//! Variant calling: per-sample GVCFs, cohort merge, joint genotyping.

use std::path::PathBuf;

use crate::errors::Result;
use crate::pipeline::{Stage, StageContext};
use crate::sched::Task;
use crate::stages::{
    gvcf, marked_bam, require_samples, sample_task_name, sequence_dictionary, tmp_dir, vcf,
    with_suffix,
};

const COHORT_GVCF: &str = "cohort.g.vcf.gz";
const RAW_VCF: &str = "all.vcf.gz";

fn reference_inputs(ctx: &StageContext<'_>) -> Vec<PathBuf> {
    vec![
        ctx.reference().to_path_buf(),
        with_suffix(ctx.reference(), "fai"),
        sequence_dictionary(ctx.reference()),
    ]
}

/// Calls variants per sample in GVCF mode.
#[derive(Debug, Clone, Copy)]
pub struct HaplotypeCaller;

impl HaplotypeCaller {
    const ID: &'static str = "haplotype_caller";
}

impl Stage for HaplotypeCaller {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn description(&self) -> &'static str {
        "Call per-sample variants with GATK HaplotypeCaller (GVCF mode)"
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["gatk"]
    }

    fn upstream(&self) -> &'static [&'static str] {
        &["ref_index", "index_bam"]
    }

    fn input_files(&self, ctx: &StageContext<'_>) -> Result<Vec<PathBuf>> {
        let mut files = reference_inputs(ctx);
        for sample in require_samples(ctx, Self::ID)? {
            let bam = marked_bam(ctx, &sample.name);
            files.push(with_suffix(&bam, "bai"));
            files.push(bam);
        }
        Ok(files)
    }

    fn output_files(&self, ctx: &StageContext<'_>) -> Result<Vec<PathBuf>> {
        Ok(require_samples(ctx, Self::ID)?
            .iter()
            .map(|s| gvcf(ctx, &s.name))
            .collect())
    }

    fn build_tasks(&self, ctx: &StageContext<'_>) -> Result<Vec<Task>> {
        let params = &ctx.config.gatk.haplotype_caller_params;
        let extra = ctx.extra_args(Self::ID);

        Ok(require_samples(ctx, Self::ID)?
            .iter()
            .map(|sample| {
                let s = &sample.name;
                let command = format!(
                    "{} HaplotypeCaller -R {} -I {} -O {} {params}{extra}",
                    ctx.gatk(&tmp_dir(ctx, &format!("hc_{s}"))),
                    ctx.reference().display(),
                    marked_bam(ctx, s).display(),
                    gvcf(ctx, s).display()
                );
                ctx.task(Self::ID, sample_task_name(Self::ID, s), command)
            })
            .collect())
    }
}

/// Merges every sample GVCF into one cohort GVCF.
#[derive(Debug, Clone, Copy)]
pub struct CombineGvcfs;

impl CombineGvcfs {
    const ID: &'static str = "combine_gvcfs";
}

impl Stage for CombineGvcfs {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn description(&self) -> &'static str {
        "Combine per-sample GVCFs with GATK CombineGVCFs"
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["gatk"]
    }

    fn upstream(&self) -> &'static [&'static str] {
        &["haplotype_caller"]
    }

    fn input_files(&self, ctx: &StageContext<'_>) -> Result<Vec<PathBuf>> {
        let mut files = reference_inputs(ctx);
        files.extend(
            require_samples(ctx, Self::ID)?
                .iter()
                .map(|s| gvcf(ctx, &s.name)),
        );
        Ok(files)
    }

    fn output_files(&self, ctx: &StageContext<'_>) -> Result<Vec<PathBuf>> {
        Ok(vec![vcf(ctx, COHORT_GVCF)])
    }

    fn build_tasks(&self, ctx: &StageContext<'_>) -> Result<Vec<Task>> {
        let variants = require_samples(ctx, Self::ID)?
            .iter()
            .map(|s| format!("-V {}", gvcf(ctx, &s.name).display()))
            .collect::<Vec<_>>()
            .join(" ");
        let command = format!(
            "{} CombineGVCFs -R {} {variants} -O {}{}",
            ctx.gatk(&tmp_dir(ctx, Self::ID)),
            ctx.reference().display(),
            vcf(ctx, COHORT_GVCF).display(),
            ctx.extra_args(Self::ID)
        );
        Ok(vec![ctx.task(Self::ID, Self::ID, command)])
    }
}

/// Joint genotyping of the cohort GVCF.
#[derive(Debug, Clone, Copy)]
pub struct GenotypeGvcfs;

impl GenotypeGvcfs {
    const ID: &'static str = "genotype_gvcfs";
}

impl Stage for GenotypeGvcfs {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn description(&self) -> &'static str {
        "Joint-genotype the cohort with GATK GenotypeGVCFs"
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["gatk"]
    }

    fn upstream(&self) -> &'static [&'static str] {
        &["combine_gvcfs"]
    }

    fn input_files(&self, ctx: &StageContext<'_>) -> Result<Vec<PathBuf>> {
        let mut files = reference_inputs(ctx);
        files.push(vcf(ctx, COHORT_GVCF));
        Ok(files)
    }

    fn output_files(&self, ctx: &StageContext<'_>) -> Result<Vec<PathBuf>> {
        Ok(vec![vcf(ctx, RAW_VCF)])
    }

    fn build_tasks(&self, ctx: &StageContext<'_>) -> Result<Vec<Task>> {
        let command = format!(
            "{} GenotypeGVCFs -R {} -V {} -O {} {}{}",
            ctx.gatk(&tmp_dir(ctx, Self::ID)),
            ctx.reference().display(),
            vcf(ctx, COHORT_GVCF).display(),
            vcf(ctx, RAW_VCF).display(),
            ctx.config.gatk.genotype_gvcfs_params,
            ctx.extra_args(Self::ID)
        );
        Ok(vec![ctx.task(Self::ID, Self::ID, command)])
    }
}
