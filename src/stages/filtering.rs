// src/stages/filtering.rs

//! Hard filtering, SNP selection and site-level soft filtering.

use std::path::PathBuf;

use crate::errors::Result;
use crate::pipeline::{Stage, StageContext};
use crate::sched::Task;
use crate::stages::{sequence_dictionary, tmp_dir, vcf, with_suffix};

const RAW_VCF: &str = "all.vcf.gz";
const FILTERED_VCF: &str = "all.filtered.vcf.gz";
const SNP_VCF: &str = "all.snp.vcf.gz";
const SOFT_FILTERED_VCF: &str = "all.snp.soft_filtered.vcf.gz";

/// Soft-filter thresholds passed to vcftools.
const MAX_MISSING: f64 = 0.9;
const MIN_MAF: f64 = 0.05;

fn reference_inputs(ctx: &StageContext<'_>) -> Vec<PathBuf> {
    vec![
        ctx.reference().to_path_buf(),
        with_suffix(ctx.reference(), "fai"),
        sequence_dictionary(ctx.reference()),
    ]
}

#[derive(Debug, Clone, Copy)]
pub struct VcfFilter;

impl VcfFilter {
    const ID: &'static str = "vcf_filter";
}

impl Stage for VcfFilter {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn description(&self) -> &'static str {
        "Apply hard filters with GATK VariantFiltration"
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["gatk"]
    }

    fn upstream(&self) -> &'static [&'static str] {
        &["genotype_gvcfs"]
    }

    fn input_files(&self, ctx: &StageContext<'_>) -> Result<Vec<PathBuf>> {
        let mut files = reference_inputs(ctx);
        files.push(vcf(ctx, RAW_VCF));
        Ok(files)
    }

    fn output_files(&self, ctx: &StageContext<'_>) -> Result<Vec<PathBuf>> {
        Ok(vec![vcf(ctx, FILTERED_VCF)])
    }

    fn build_tasks(&self, ctx: &StageContext<'_>) -> Result<Vec<Task>> {
        let command = format!(
            "{} VariantFiltration -R {} -V {} -O {} {}{}",
            ctx.gatk(&tmp_dir(ctx, Self::ID)),
            ctx.reference().display(),
            vcf(ctx, RAW_VCF).display(),
            vcf(ctx, FILTERED_VCF).display(),
            ctx.config.gatk.variant_filtration_params,
            ctx.extra_args(Self::ID)
        );
        Ok(vec![ctx.task(Self::ID, Self::ID, command)])
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SelectSnp;

impl SelectSnp {
    const ID: &'static str = "select_snp";
}

impl Stage for SelectSnp {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn description(&self) -> &'static str {
        "Extract SNPs with GATK SelectVariants"
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["gatk"]
    }

    fn upstream(&self) -> &'static [&'static str] {
        &["vcf_filter"]
    }

    fn input_files(&self, ctx: &StageContext<'_>) -> Result<Vec<PathBuf>> {
        let mut files = reference_inputs(ctx);
        files.push(vcf(ctx, FILTERED_VCF));
        Ok(files)
    }

    fn output_files(&self, ctx: &StageContext<'_>) -> Result<Vec<PathBuf>> {
        Ok(vec![vcf(ctx, SNP_VCF)])
    }

    fn build_tasks(&self, ctx: &StageContext<'_>) -> Result<Vec<Task>> {
        let command = format!(
            "{} SelectVariants -R {} -V {} -O {} --select-type SNP{}",
            ctx.gatk(&tmp_dir(ctx, Self::ID)),
            ctx.reference().display(),
            vcf(ctx, FILTERED_VCF).display(),
            vcf(ctx, SNP_VCF).display(),
            ctx.extra_args(Self::ID)
        );
        Ok(vec![ctx.task(Self::ID, Self::ID, command)])
    }
}

/// Drops sites with too much missing data or a low minor allele frequency,
/// then recompresses the result.
#[derive(Debug, Clone, Copy)]
pub struct SoftFilterSnp;

impl SoftFilterSnp {
    const ID: &'static str = "soft_filter_snp";
}

impl Stage for SoftFilterSnp {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn description(&self) -> &'static str {
        "Soft-filter SNPs by missingness and MAF with vcftools"
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["vcftools", "bgzip"]
    }

    fn upstream(&self) -> &'static [&'static str] {
        &["select_snp"]
    }

    fn input_files(&self, ctx: &StageContext<'_>) -> Result<Vec<PathBuf>> {
        Ok(vec![vcf(ctx, SNP_VCF)])
    }

    fn output_files(&self, ctx: &StageContext<'_>) -> Result<Vec<PathBuf>> {
        Ok(vec![vcf(ctx, SOFT_FILTERED_VCF)])
    }

    fn build_tasks(&self, ctx: &StageContext<'_>) -> Result<Vec<Task>> {
        // vcftools appends `.recode.vcf` to the --out prefix.
        let prefix = vcf(ctx, "all.snp.soft_filtered");
        let recoded = with_suffix(&prefix, "recode.vcf");
        let command = format!(
            "{} --gzvcf {} --max-missing {MAX_MISSING} --maf {MIN_MAF}{} --recode --recode-INFO-all --out {} && {} -c {} > {}",
            ctx.tool("vcftools"),
            vcf(ctx, SNP_VCF).display(),
            ctx.extra_args(Self::ID),
            prefix.display(),
            ctx.tool("bgzip"),
            recoded.display(),
            vcf(ctx, SOFT_FILTERED_VCF).display()
        );
        Ok(vec![ctx.task(Self::ID, Self::ID, command)])
    }
}
