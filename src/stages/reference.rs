// src/stages/reference.rs

use std::path::PathBuf;

use crate::errors::Result;
use crate::pipeline::{Stage, StageContext};
use crate::sched::Task;
use crate::stages::{reference_index_files, sequence_dictionary, tmp_dir};

const ID: &str = "ref_index";

/// Builds the aligner index, sequence dictionary and FASTA index of the
/// reference. The three tasks are independent.
#[derive(Debug, Clone, Copy)]
pub struct RefIndex;

impl Stage for RefIndex {
    fn id(&self) -> &'static str {
        ID
    }

    fn description(&self) -> &'static str {
        "Index the reference genome (bwa-mem2, sequence dictionary, faidx)"
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["bwa-mem2", "gatk", "samtools"]
    }

    fn input_files(&self, ctx: &StageContext<'_>) -> Result<Vec<PathBuf>> {
        Ok(vec![ctx.reference().to_path_buf()])
    }

    fn output_files(&self, ctx: &StageContext<'_>) -> Result<Vec<PathBuf>> {
        Ok(reference_index_files(ctx.reference()))
    }

    fn build_tasks(&self, ctx: &StageContext<'_>) -> Result<Vec<Task>> {
        let reference = ctx.reference().display().to_string();
        let dict = sequence_dictionary(ctx.reference());
        let extra = ctx.extra_args(ID);

        let bwa = format!("{} index{extra} {reference}", ctx.tool("bwa-mem2"));
        let dictionary = format!(
            "{} CreateSequenceDictionary -R {reference} -O {}",
            ctx.gatk(&tmp_dir(ctx, ID)),
            dict.display()
        );
        let faidx = format!("{} faidx {reference}", ctx.tool("samtools"));

        Ok(vec![
            ctx.task(ID, format!("{ID}:bwa_index"), bwa),
            ctx.task(ID, format!("{ID}:dictionary"), dictionary),
            ctx.task(ID, format!("{ID}:faidx"), faidx),
        ])
    }
}
