use std::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use snpflow::errors::SnpflowError;
use snpflow::exec::{CommandOutput, CommandRequest, CommandRunner};
use snpflow::fs::FileSystem;
use snpflow::fs::mock::MockFileSystem;
use snpflow::pipeline::{Pipeline, PipelineOptions, Stage, StageCatalog};
use snpflow::sched::TaskScheduler;
use snpflow::types::{ExecutionMode, StageStatus};
use snpflow_test_utils::builders::ConfigFileBuilder;
use snpflow_test_utils::fake_runner::FakeRunner;
use snpflow_test_utils::fake_tools::FakeToolChecker;
use snpflow_test_utils::test_stage::{TestStage, linear_catalog};
use snpflow_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

const FIVE: [&str; 5] = ["s1", "s2", "s3", "s4", "s5"];
const PROGRESS: &str = "out/.progress";

fn pipeline_with(
    catalog: StageCatalog,
    fs: &MockFileSystem,
    runner: Arc<dyn CommandRunner>,
    tools: FakeToolChecker,
    options: PipelineOptions,
) -> Pipeline {
    let cfg = ConfigFileBuilder::new().build();
    let scheduler =
        TaskScheduler::new(cfg.scheduler_limits(), runner, None).expect("valid limits");
    Pipeline::new(
        cfg,
        catalog,
        scheduler,
        Arc::new(fs.clone()),
        Arc::new(tools),
        options,
    )
}

fn pipeline(fs: &MockFileSystem, runner: &FakeRunner, resume: bool) -> Pipeline {
    pipeline_with(
        linear_catalog(&FIVE),
        fs,
        Arc::new(runner.clone()),
        FakeToolChecker::new(),
        PipelineOptions {
            resume,
            check_tools: true,
        },
    )
}

fn ran(runner: &FakeRunner, stage: &str) -> bool {
    let needle = format!("run {stage} ");
    runner.executed().iter().any(|c| c.starts_with(&needle))
}

#[tokio::test]
async fn failing_middle_stage_halts_and_keeps_earlier_completions() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    let runner = FakeRunner::new().fail_when("run s3", 1);
    let mut p = pipeline(&fs, &runner, false);

    let summary = with_timeout(p.run_all()).await?;

    assert!(!summary.is_success());
    let failure = summary.failure.as_ref().expect("failure recorded");
    assert_eq!(failure.stage, "s3");
    assert_eq!(failure.tasks.len(), 1);
    assert_eq!(failure.tasks[0].0, "s3:1");

    assert_eq!(summary.status_of("s1"), Some(StageStatus::Completed));
    assert_eq!(summary.status_of("s2"), Some(StageStatus::Completed));
    assert_eq!(summary.status_of("s3"), Some(StageStatus::Failed));
    assert_eq!(summary.status_of("s4"), None);
    assert!(!ran(&runner, "s4"));
    assert!(!ran(&runner, "s5"));

    let completed: Vec<_> = p.state().completed_stage_ids().iter().cloned().collect();
    assert_eq!(completed, vec!["s1", "s2"]);
    assert_eq!(fs.file_contents(PROGRESS).as_deref(), Some("s1\ns2\n"));
    assert_eq!(p.state().current_stage_id(), None);
    Ok(())
}

#[tokio::test]
async fn resume_after_full_success_runs_nothing() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    let runner = FakeRunner::new();

    let first = with_timeout(pipeline(&fs, &runner, false).run_all()).await?;
    assert!(first.is_success());
    assert_eq!(runner.call_count(), 5);
    let persisted = fs.file_contents(PROGRESS);
    assert_eq!(persisted.as_deref(), Some("s1\ns2\ns3\ns4\ns5\n"));
    let writes = fs.write_count();

    let second = with_timeout(pipeline(&fs, &runner, true).run_all()).await?;

    assert!(second.is_success());
    assert_eq!(runner.call_count(), 5);
    assert!(second
        .stages
        .iter()
        .all(|r| r.status == StageStatus::Skipped));
    assert_eq!(fs.file_contents(PROGRESS), persisted);
    assert_eq!(fs.write_count(), writes);
    Ok(())
}

#[tokio::test]
async fn resume_retries_the_failed_stage_from_scratch() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();

    let failing = FakeRunner::new().fail_when("run s3", 2);
    let first = with_timeout(pipeline(&fs, &failing, false).run_all()).await?;
    assert!(!first.is_success());

    let healthy = FakeRunner::new();
    let second = with_timeout(pipeline(&fs, &healthy, true).run_all()).await?;

    assert!(second.is_success());
    assert_eq!(
        healthy.executed(),
        vec!["run s3 1", "run s4 1", "run s5 1"]
    );
    assert_eq!(second.status_of("s1"), Some(StageStatus::Skipped));
    assert_eq!(second.status_of("s3"), Some(StageStatus::Completed));
    assert_eq!(
        fs.file_contents(PROGRESS).as_deref(),
        Some("s1\ns2\ns3\ns4\ns5\n")
    );
    Ok(())
}

#[tokio::test]
async fn failing_stage_leaves_progress_file_untouched() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file(PROGRESS, "s1\ns2\n");
    let runner = FakeRunner::new().fail_when("run s3", 1);

    let summary = with_timeout(pipeline(&fs, &runner, true).run_all()).await?;

    assert_eq!(summary.failure.map(|f| f.stage), Some("s3"));
    assert_eq!(fs.file_contents(PROGRESS).as_deref(), Some("s1\ns2\n"));
    assert_eq!(fs.write_count(), 0);
    Ok(())
}

#[tokio::test]
async fn fresh_run_failing_first_stage_writes_no_progress() -> TestResult {
    let fs = MockFileSystem::new();
    let runner = FakeRunner::new().fail_when("run s1", 1);

    let summary = with_timeout(pipeline(&fs, &runner, false).run_all()).await?;

    assert!(!summary.is_success());
    assert!(!fs.exists(PROGRESS.as_ref()));
    Ok(())
}

#[tokio::test]
async fn gap_in_progress_file_reruns_from_the_gap() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file(PROGRESS, "s1\ns3\n");
    let runner = FakeRunner::new().fail_when("run s4", 1);

    let summary = with_timeout(pipeline(&fs, &runner, true).run_all()).await?;

    assert!(!ran(&runner, "s1"));
    assert!(ran(&runner, "s2"));
    assert!(ran(&runner, "s3"));
    assert_eq!(summary.failure.map(|f| f.stage), Some("s4"));
    // s3 was dropped when the gap was found and re-recorded after it re-ran.
    assert_eq!(fs.file_contents(PROGRESS).as_deref(), Some("s1\ns2\ns3\n"));
    Ok(())
}

#[tokio::test]
async fn unknown_and_blank_progress_lines_are_ignored() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_file(PROGRESS, "s1\n\nnot_a_stage\n  s2  \n");
    let runner = FakeRunner::new();

    let summary = with_timeout(pipeline(&fs, &runner, true).run_all()).await?;

    assert!(summary.is_success());
    assert!(!ran(&runner, "s1"));
    assert!(!ran(&runner, "s2"));
    assert_eq!(runner.call_count(), 3);
    Ok(())
}

#[tokio::test]
async fn run_single_runs_only_that_stage_and_records_it() -> TestResult {
    let fs = MockFileSystem::new();
    let runner = FakeRunner::new();
    let mut p = pipeline(&fs, &runner, false);

    let summary = with_timeout(p.run_single("s4")).await?;

    assert!(summary.is_success());
    assert_eq!(runner.executed(), vec!["run s4 1"]);
    assert!(p.state().is_completed("s4"));
    assert!(!p.state().is_completed("s3"));
    assert_eq!(fs.file_contents(PROGRESS).as_deref(), Some("s4\n"));
    Ok(())
}

#[tokio::test]
async fn run_from_keeps_earlier_completions_and_runs_to_the_end() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_file(PROGRESS, "s1\n");
    let runner = FakeRunner::new();

    let summary = with_timeout(pipeline(&fs, &runner, false).run_from("s3")).await?;

    assert!(summary.is_success());
    assert_eq!(runner.executed(), vec!["run s3 1", "run s4 1", "run s5 1"]);
    assert_eq!(
        fs.file_contents(PROGRESS).as_deref(),
        Some("s1\ns3\ns4\ns5\n")
    );
    Ok(())
}

#[tokio::test]
async fn run_from_with_resume_skips_completed_stages_after_start() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_file(PROGRESS, "s2\ns3\n");
    let runner = FakeRunner::new();

    let mut p = pipeline(&fs, &runner, true);
    let summary = with_timeout(p.run(&ExecutionMode::From("s2".to_string()))).await?;

    assert!(summary.is_success());
    assert_eq!(summary.status_of("s2"), Some(StageStatus::Skipped));
    assert_eq!(summary.status_of("s3"), Some(StageStatus::Skipped));
    assert_eq!(runner.executed(), vec!["run s4 1", "run s5 1"]);
    Ok(())
}

#[tokio::test]
async fn unknown_stage_is_an_error() -> TestResult {
    let fs = MockFileSystem::new();
    let runner = FakeRunner::new();
    let mut p = pipeline(&fs, &runner, false);

    assert!(matches!(
        p.run_single("nope").await,
        Err(SnpflowError::UnknownStage(id)) if id == "nope"
    ));
    assert!(matches!(
        p.run_from("nope").await,
        Err(SnpflowError::UnknownStage(_))
    ));
    assert_eq!(runner.call_count(), 0);
    Ok(())
}

fn catalog_with_inputs() -> StageCatalog {
    let stages: Vec<Box<dyn Stage>> = vec![
        Box::new(TestStage::new("s1").input("data/raw.txt")),
        Box::new(TestStage::new("s2").input("out/s1.txt")),
        Box::new(TestStage::new("s3").input("out/s2.txt")),
    ];
    StageCatalog::new(stages).expect("valid catalog")
}

#[tokio::test]
async fn missing_inputs_prevent_the_stage_from_starting() -> TestResult {
    let fs = MockFileSystem::new();
    let runner = FakeRunner::new();
    let options = PipelineOptions::default();
    let mut p = pipeline_with(
        catalog_with_inputs(),
        &fs,
        Arc::new(runner.clone()),
        FakeToolChecker::new(),
        options,
    );

    match p.run_single("s2").await {
        Err(SnpflowError::MissingInputs { stage, paths }) => {
            assert_eq!(stage, "s2");
            assert_eq!(paths, vec![std::path::PathBuf::from("out/s1.txt")]);
        }
        other => panic!("expected MissingInputs, got {other:?}"),
    }
    assert_eq!(runner.call_count(), 0);
    assert!(!p.state().is_completed("s2"));
    Ok(())
}

#[tokio::test]
async fn run_from_checks_only_the_starting_stage_inputs() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_file("out/s1.txt", "x");
    let runner = FakeRunner::new();
    let mut p = pipeline_with(
        catalog_with_inputs(),
        &fs,
        Arc::new(runner.clone()),
        FakeToolChecker::new(),
        PipelineOptions::default(),
    );

    // s3's input is never produced by the fake runner, yet s3 still runs.
    let summary = with_timeout(p.run_from("s2")).await?;

    assert!(summary.is_success());
    assert_eq!(runner.executed(), vec!["run s2 1", "run s3 1"]);
    Ok(())
}

fn catalog_with_tools() -> StageCatalog {
    let stages: Vec<Box<dyn Stage>> = vec![
        Box::new(TestStage::new("s1").tools(&["aligner", "sorter"])),
        Box::new(TestStage::new("s2").tools(&["caller"])),
    ];
    StageCatalog::new(stages).expect("valid catalog")
}

#[tokio::test]
async fn missing_tool_stops_the_stage_before_it_runs() -> TestResult {
    let fs = MockFileSystem::new();
    let runner = FakeRunner::new();
    let tools = FakeToolChecker::new().without("caller");
    let mut p = pipeline_with(
        catalog_with_tools(),
        &fs,
        Arc::new(runner.clone()),
        tools,
        PipelineOptions::default(),
    );

    match p.run_all().await {
        Err(SnpflowError::MissingTools { stage, tools }) => {
            assert_eq!(stage, "s2");
            assert_eq!(tools, vec!["caller"]);
        }
        other => panic!("expected MissingTools, got {other:?}"),
    }
    assert_eq!(runner.executed(), vec!["run s1 1"]);
    assert!(p.state().is_completed("s1"));
    assert!(!p.state().is_completed("s2"));
    Ok(())
}

#[tokio::test]
async fn tool_check_can_be_skipped_and_runs_once_per_stage() -> TestResult {
    let fs = MockFileSystem::new();
    let runner = FakeRunner::new();

    let skipping = FakeToolChecker::new().without("caller");
    let mut p = pipeline_with(
        catalog_with_tools(),
        &fs,
        Arc::new(runner.clone()),
        skipping.clone(),
        PipelineOptions {
            resume: false,
            check_tools: false,
        },
    );
    assert!(with_timeout(p.run_all()).await?.is_success());
    assert!(skipping.lookups().is_empty());

    let counting = FakeToolChecker::new();
    let mut p = pipeline_with(
        catalog_with_tools(),
        &fs,
        Arc::new(runner.clone()),
        counting.clone(),
        PipelineOptions::default(),
    );
    with_timeout(p.run_single("s1")).await?;
    with_timeout(p.run_single("s1")).await?;
    assert_eq!(counting.lookups(), vec!["aligner", "sorter"]);
    Ok(())
}

#[tokio::test]
async fn stale_outputs_are_removed_and_parents_created() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_file("out/stage/result.txt", "old");
    let stages: Vec<Box<dyn Stage>> = vec![Box::new(
        TestStage::new("s1")
            .output("out/stage/result.txt")
            .output("out/fresh/dir/new.txt"),
    )];
    let runner = FakeRunner::new();
    let mut p = pipeline_with(
        StageCatalog::new(stages)?,
        &fs,
        Arc::new(runner.clone()),
        FakeToolChecker::new(),
        PipelineOptions::default(),
    );

    with_timeout(p.run_all()).await?;

    assert!(!fs.exists("out/stage/result.txt".as_ref()));
    assert!(fs.is_dir("out/fresh/dir".as_ref()));
    Ok(())
}

#[tokio::test]
async fn persistence_failure_is_fatal() -> TestResult {
    let fs = MockFileSystem::new();
    fs.set_read_only(true);
    let runner = FakeRunner::new();
    let mut p = pipeline(&fs, &runner, false);

    match p.run_all().await {
        Err(SnpflowError::Persistence { path, .. }) => {
            assert_eq!(path, std::path::PathBuf::from(PROGRESS));
        }
        other => panic!("expected Persistence error, got {other:?}"),
    }
    // The first stage ran; nothing after it did.
    assert_eq!(runner.executed(), vec!["run s1 1"]);
    Ok(())
}

#[tokio::test]
async fn stop_request_halts_at_the_stage_boundary() -> TestResult {
    let fs = MockFileSystem::new();
    let runner = FakeRunner::new();
    let mut p = pipeline(&fs, &runner, false);

    p.stop_handle().request_stop();
    let summary = with_timeout(p.run_all()).await?;

    assert!(summary.stopped);
    assert!(!summary.is_success());
    assert_eq!(runner.call_count(), 0);
    Ok(())
}

/// Records `start <cmd>` / `end <cmd>` events so stage barriers are visible.
#[derive(Debug, Default)]
struct EventRunner {
    events: Mutex<Vec<String>>,
}

impl CommandRunner for EventRunner {
    fn execute(
        &self,
        request: CommandRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CommandOutput>> + Send + '_>> {
        Box::pin(async move {
            self.events
                .lock()
                .unwrap()
                .push(format!("start {}", request.command));
            // Later tasks of a stage finish first.
            let n: u64 = request
                .command
                .rsplit(' ')
                .next()
                .and_then(|n| n.parse().ok())
                .unwrap_or(1);
            tokio::time::sleep(Duration::from_millis(40 / n)).await;
            self.events
                .lock()
                .unwrap()
                .push(format!("end {}", request.command));
            Ok(CommandOutput {
                exit_code: Some(0),
                ..CommandOutput::default()
            })
        })
    }
}

#[tokio::test]
async fn next_stage_starts_only_after_every_task_of_the_previous_one() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    let stages: Vec<Box<dyn Stage>> = vec![
        Box::new(TestStage::new("s1").tasks(3)),
        Box::new(TestStage::new("s2").tasks(2)),
    ];
    let runner = Arc::new(EventRunner::default());
    let mut p = pipeline_with(
        StageCatalog::new(stages)?,
        &fs,
        runner.clone(),
        FakeToolChecker::new(),
        PipelineOptions::default(),
    );

    assert!(with_timeout(p.run_all()).await?.is_success());

    let events = runner.events.lock().unwrap().clone();
    let last_s1_end = events
        .iter()
        .rposition(|e| e.starts_with("end run s1"))
        .expect("s1 finished");
    let first_s2_start = events
        .iter()
        .position(|e| e.starts_with("start run s2"))
        .expect("s2 started");
    assert!(last_s1_end < first_s2_start, "events: {events:?}");
    assert_eq!(events.len(), 10);
    Ok(())
}
