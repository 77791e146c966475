// src/stages/gwas.rs

use std::path::PathBuf;

use crate::errors::Result;
use crate::pipeline::{Stage, StageContext};
use crate::sched::Task;
use crate::stages::vcf;

const ID: &str = "get_gwas_data";

/// Splits multi-allelic sites and converts the soft-filtered SNPs into a
/// PLINK binary fileset (`gwas/snp.{bed,bim,fam}`).
#[derive(Debug, Clone, Copy)]
pub struct GetGwasData;

impl Stage for GetGwasData {
    fn id(&self) -> &'static str {
        ID
    }

    fn description(&self) -> &'static str {
        "Normalize with bcftools and export PLINK files for GWAS"
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["bcftools", "plink"]
    }

    fn upstream(&self) -> &'static [&'static str] {
        &["soft_filter_snp"]
    }

    fn input_files(&self, ctx: &StageContext<'_>) -> Result<Vec<PathBuf>> {
        Ok(vec![vcf(ctx, "all.snp.soft_filtered.vcf.gz")])
    }

    fn output_files(&self, ctx: &StageContext<'_>) -> Result<Vec<PathBuf>> {
        Ok(["bed", "bim", "fam"]
            .iter()
            .map(|ext| ctx.out(&["gwas", &format!("snp.{ext}")]))
            .collect())
    }

    fn build_tasks(&self, ctx: &StageContext<'_>) -> Result<Vec<Task>> {
        let normalized = ctx.out(&["gwas", "normalized.vcf.gz"]);
        let command = format!(
            "{} norm -m-any -Oz -o {} {} && {} --vcf {} --double-id --allow-extra-chr --make-bed{} --out {}",
            ctx.tool("bcftools"),
            normalized.display(),
            vcf(ctx, "all.snp.soft_filtered.vcf.gz").display(),
            ctx.tool("plink"),
            normalized.display(),
            ctx.extra_args(ID),
            ctx.out(&["gwas", "snp"]).display()
        );
        Ok(vec![ctx.task(ID, ID, command)])
    }
}
