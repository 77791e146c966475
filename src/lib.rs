// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod pipeline;
pub mod sched;
pub mod stages;
pub mod testdata;
pub mod tools;
pub mod types;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, bail};
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, Command, RunArgs, TestDataArgs};
use crate::config::{
    HostResources, PipelineSection, load_and_validate, load_from_path, validate_config,
    validate_stage_demands,
};
use crate::exec::{CommandRunner, RealCommandRunner};
use crate::fs::{FileSystem, RealFileSystem};
use crate::pipeline::{Pipeline, PipelineOptions, RunSummary, StageCatalog, StagePlan};
use crate::sched::TaskScheduler;
use crate::tools::{PathToolChecker, ToolChecker};

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    match args.command {
        Command::Run(run_args) => run_pipeline(&run_args).await,
        Command::ListSteps => list_steps(),
        Command::CheckDeps { config } => check_deps(&config),
        Command::Init { config } => {
            config::write_template(&config)?;
            println!("wrote {}", config.display());
            Ok(())
        }
        Command::TestData(data_args) => generate_test_data(&data_args),
    }
}

/// This wires together:
/// - config loading and host auto-tuning
/// - scheduler + real process runner
/// - tool checker and filesystem
/// - Ctrl-C handling (stop at the next stage boundary)
async fn run_pipeline(args: &RunArgs) -> Result<()> {
    let mut cfg = load_and_validate(&args.config)?;
    cfg.resources.auto_tune(&HostResources::detect());
    validate_config(&cfg)?;
    validate_stage_demands(&cfg)?;

    let catalog = StageCatalog::standard()?;
    let mode = args.mode();

    let runner: Arc<dyn CommandRunner> = Arc::new(RealCommandRunner::new());
    let scheduler = TaskScheduler::new(cfg.scheduler_limits(), runner, cfg.task_timeout())?;
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let tools: Arc<dyn ToolChecker> = Arc::new(PathToolChecker::from_config(&cfg));
    let options = PipelineOptions {
        resume: args.resume,
        check_tools: !args.skip_tool_check,
    };

    let mut pipeline = Pipeline::new(cfg, catalog, scheduler, fs, tools, options);

    if args.dry_run {
        print_dry_run(&pipeline.plan(&mode)?);
        return Ok(());
    }

    // Ctrl-C -> stop before the next stage.
    {
        let stop = pipeline.stop_handle();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            warn!("interrupt received; stopping after the running stage");
            stop.request_stop();
        });
    }

    info!(?mode, resume = args.resume, "starting pipeline");
    let summary = pipeline.run(&mode).await?;
    finish(&summary)
}

fn finish(summary: &RunSummary) -> Result<()> {
    for report in summary.stages.iter() {
        debug!(stage = report.stage, status = ?report.status, tasks = report.tasks, "stage result");
    }

    if let Some(failure) = &summary.failure {
        let mut msg = format!("stage '{}' failed", failure.stage);
        for (task, reason) in failure.tasks.iter() {
            msg.push_str(&format!("\n  {task}: {reason}"));
        }
        bail!(msg);
    }
    if summary.stopped {
        bail!("pipeline stopped before all selected stages ran");
    }

    info!("pipeline finished");
    Ok(())
}

fn list_steps() -> Result<()> {
    let catalog = StageCatalog::standard()?;
    for (idx, stage) in catalog.stages().iter().enumerate() {
        println!("{:>2}. {:<18} {}", idx + 1, stage.id(), stage.description());
        println!("      tools: {}", stage.required_tools().join(", "));
    }
    Ok(())
}

fn check_deps(config_path: &Path) -> Result<()> {
    let overrides: BTreeMap<String, String> = if config_path.exists() {
        load_from_path(config_path)?.software
    } else {
        debug!(path = %config_path.display(), "no config file; using PATH only");
        BTreeMap::new()
    };

    let checker = PathToolChecker::new(overrides, std::env::var_os("PATH"));
    let catalog = StageCatalog::standard()?;

    let mut missing = Vec::new();
    for tool in catalog.required_tools() {
        match checker.locate(tool) {
            Some(path) => println!("  ok       {tool:<10} {}", path.display()),
            None => {
                println!("  MISSING  {tool}");
                missing.push(tool);
            }
        }
    }

    if !missing.is_empty() {
        bail!("missing tools: {}", missing.join(", "));
    }
    println!("all tools found");
    Ok(())
}

fn generate_test_data(args: &TestDataArgs) -> Result<()> {
    if let Some(path) = &args.create_config {
        if path.exists() {
            bail!("config file {} already exists", path.display());
        }
    }

    let opts = args.options();
    let data = testdata::generate(&opts)?;
    println!("reference: {}", data.reference.display());
    println!(
        "samples:   {} ({} x {} reads)",
        data.samples_dir.display(),
        data.samples.len(),
        data.reads_per_sample
    );

    if let Some(path) = &args.create_config {
        let pipeline = PipelineSection {
            reference: data.reference,
            samples_dir: data.samples_dir,
            output_dir: args.output_dir.join("results"),
        };
        config::write_new_config(path, &config::render_template(&pipeline, &opts.naming))?;
        println!("wrote {}", path.display());
    }
    Ok(())
}

/// Simple dry-run output: print stages and the tasks each would run.
fn print_dry_run(plan: &[StagePlan]) {
    println!("snpflow dry-run");
    println!();

    for stage in plan {
        let marker = if stage.already_completed {
            " (completed)"
        } else {
            ""
        };
        println!("stage {}{marker}: {}", stage.stage, stage.description);
        for task in stage.tasks.iter() {
            println!("  - {}", task.name);
            println!("      cmd: {}", task.command);
            println!(
                "      threads: {}  memory_gb: {}  priority: {}",
                task.threads, task.memory_gb, task.priority
            );
            if let Some(log) = &task.log_path {
                println!("      log: {}", log.display());
            }
        }
    }

    debug!("dry-run complete (no execution)");
}
