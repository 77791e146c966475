use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use snpflow::errors::SnpflowError;
use snpflow::sched::{Task, TaskOutcome, TaskScheduler};
use snpflow_test_utils::builders::limits;
use snpflow_test_utils::fake_runner::FakeRunner;
use snpflow_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn scheduler(runner: &FakeRunner, parallel: usize, threads: u32, memory_gb: u32) -> TaskScheduler {
    TaskScheduler::new(
        limits(parallel, threads, memory_gb),
        Arc::new(runner.clone()),
        None,
    )
    .expect("valid limits")
}

#[tokio::test]
async fn two_of_three_tasks_run_concurrently_under_thread_and_memory_ceiling() -> TestResult {
    init_tracing();
    let runner = FakeRunner::new().with_delay(Duration::from_millis(50));
    let sched = scheduler(&runner, 4, 4, 8);

    let tasks = ["a", "b", "c"]
        .iter()
        .map(|n| Task::new(*n, format!("work {n}")).with_threads(2).with_memory_gb(4))
        .collect();

    let report = with_timeout(sched.submit(tasks)).await?;

    assert!(report.all_succeeded());
    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(runner.max_concurrency(), 2);
    Ok(())
}

#[tokio::test]
async fn higher_priority_dispatches_first_and_ties_keep_submission_order() -> TestResult {
    init_tracing();
    let runner = FakeRunner::new();
    let sched = scheduler(&runner, 1, 4, 8);

    let tasks = vec![
        Task::new("A", "cmd A").with_priority(5),
        Task::new("B", "cmd B").with_priority(1),
        Task::new("C", "cmd C").with_priority(5),
    ];

    let report = with_timeout(sched.submit(tasks)).await?;

    assert_eq!(report.dispatch_order, vec!["A", "C", "B"]);
    assert_eq!(runner.executed(), vec!["cmd A", "cmd C", "cmd B"]);
    assert_eq!(runner.max_concurrency(), 1);
    Ok(())
}

#[tokio::test]
async fn ledger_is_fully_restored_after_submit_even_with_failures() -> TestResult {
    init_tracing();
    let runner = FakeRunner::new()
        .with_delay(Duration::from_millis(5))
        .fail_when("bad", 2)
        .spawn_error_when("broken");
    let sched = scheduler(&runner, 3, 6, 10);

    let tasks = vec![
        Task::new("ok1", "good 1").with_threads(2).with_memory_gb(3),
        Task::new("bad", "bad 1").with_threads(3).with_memory_gb(5),
        Task::new("broken", "broken 1").with_threads(1).with_memory_gb(1),
        Task::new("ok2", "good 2").with_threads(4).with_memory_gb(2),
    ];

    let report = with_timeout(sched.submit(tasks)).await?;

    let snapshot = sched.ledger().snapshot();
    assert_eq!(snapshot.available_threads, 6);
    assert_eq!(snapshot.available_memory_gb, 10);
    assert_eq!(snapshot.running, 0);

    assert_eq!(report.outcomes["ok1"], TaskOutcome::Succeeded);
    assert_eq!(report.outcomes["ok2"], TaskOutcome::Succeeded);
    assert!(!report.all_succeeded());
    assert_eq!(report.failures().count(), 2);
    Ok(())
}

#[tokio::test]
async fn a_failed_task_does_not_cancel_its_siblings() -> TestResult {
    init_tracing();
    let runner = FakeRunner::new()
        .fail_when("sample2", 1)
        .delay_when("sample3", Duration::from_millis(30));
    let sched = scheduler(&runner, 3, 3, 3);

    let tasks = (1..=3)
        .map(|i| Task::new(format!("map:{i}"), format!("align sample{i}")))
        .collect();

    let report = with_timeout(sched.submit(tasks)).await?;

    assert_eq!(runner.call_count(), 3);
    assert_eq!(report.outcomes["map:1"], TaskOutcome::Succeeded);
    assert_eq!(report.outcomes["map:3"], TaskOutcome::Succeeded);
    match &report.outcomes["map:2"] {
        TaskOutcome::Failed(failure) => {
            assert_eq!(failure.exit_code, Some(1));
            assert!(failure.reason.contains("status 1"));
            assert!(failure.output.contains("simulated failure"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn failure_with_log_file_points_at_the_log() -> TestResult {
    let runner = FakeRunner::new().fail_when("boom", 7);
    let sched = scheduler(&runner, 1, 1, 1);

    let tasks = vec![Task::new("t", "boom").with_log_path("out/logs/t.log")];
    let report = with_timeout(sched.submit(tasks)).await?;

    let (_, failure) = report.failures().next().expect("one failure");
    assert_eq!(failure.exit_code, Some(7));
    assert!(failure.output.contains("out/logs/t.log"));
    Ok(())
}

#[tokio::test]
async fn oversized_task_is_rejected_before_anything_runs() -> TestResult {
    let runner = FakeRunner::new();
    let sched = scheduler(&runner, 4, 4, 8);

    let tasks = vec![
        Task::new("fits", "small"),
        Task::new("huge", "big").with_threads(5),
    ];

    match sched.submit(tasks).await {
        Err(SnpflowError::ResourceExceeded {
            task, max_threads, ..
        }) => {
            assert_eq!(task, "huge");
            assert_eq!(max_threads, 4);
        }
        other => panic!("expected ResourceExceeded, got {other:?}"),
    }
    assert_eq!(runner.call_count(), 0);

    let tasks = vec![Task::new("hungry", "big").with_memory_gb(9)];
    assert!(matches!(
        sched.submit(tasks).await,
        Err(SnpflowError::ResourceExceeded { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn malformed_batches_are_configuration_errors() -> TestResult {
    let runner = FakeRunner::new();
    let sched = scheduler(&runner, 2, 2, 2);

    let dup = vec![Task::new("x", "one"), Task::new("x", "two")];
    assert!(matches!(
        sched.submit(dup).await,
        Err(SnpflowError::DuplicateTask(name)) if name == "x"
    ));

    let zero = vec![Task::new("z", "zero").with_threads(0)];
    assert!(matches!(
        sched.submit(zero).await,
        Err(SnpflowError::ConfigError(_))
    ));

    assert_eq!(runner.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn empty_batch_returns_empty_report() -> TestResult {
    let runner = FakeRunner::new();
    let sched = scheduler(&runner, 1, 1, 1);

    let report = sched.submit(Vec::new()).await?;
    assert!(report.outcomes.is_empty());
    assert!(report.all_succeeded());
    Ok(())
}

#[test]
fn zero_ceilings_are_rejected() {
    let runner = FakeRunner::new();
    let result = TaskScheduler::new(limits(0, 4, 4), Arc::new(runner), None);
    assert!(matches!(result, Err(SnpflowError::ConfigError(_))));
}

#[tokio::test]
async fn task_exceeding_timeout_is_failed() -> TestResult {
    init_tracing();
    let runner = FakeRunner::new().delay_when("slow", Duration::from_secs(30));
    let sched = TaskScheduler::new(
        limits(2, 2, 2),
        Arc::new(runner.clone()),
        Some(Duration::from_millis(50)),
    )?;

    let tasks = vec![Task::new("slow", "slow job"), Task::new("quick", "quick job")];
    let report = with_timeout(sched.submit(tasks)).await?;

    assert_eq!(report.outcomes["quick"], TaskOutcome::Succeeded);
    match &report.outcomes["slow"] {
        TaskOutcome::Failed(failure) => {
            assert_eq!(failure.exit_code, None);
            assert!(failure.reason.contains("timed out"));
        }
        other => panic!("expected timeout failure, got {other:?}"),
    }
    assert_eq!(sched.ledger().snapshot().running, 0);
    Ok(())
}

#[tokio::test]
async fn waiting_large_task_blocks_smaller_ones_behind_it() -> TestResult {
    init_tracing();
    let runner = FakeRunner::new().with_delay(Duration::from_millis(20));
    let sched = scheduler(&runner, 4, 4, 8);

    // `big` cannot start until `first` finishes. `small` would fit next to
    // `first` but must wait its turn behind `big`.
    let tasks = vec![
        Task::new("first", "first").with_threads(3).with_priority(10),
        Task::new("big", "big").with_threads(4).with_priority(5),
        Task::new("small", "small").with_threads(1).with_priority(1),
    ];

    let report = with_timeout(sched.submit(tasks)).await?;

    assert_eq!(report.dispatch_order, vec!["first", "big", "small"]);
    assert_eq!(runner.executed(), vec!["first", "big", "small"]);
    assert_eq!(runner.max_concurrency(), 1);
    assert!(report.all_succeeded());
    Ok(())
}

#[tokio::test]
async fn lower_priority_task_never_overtakes_a_blocked_head() -> TestResult {
    init_tracing();
    let runner = FakeRunner::new().with_delay(Duration::from_millis(20));
    let sched = scheduler(&runner, 4, 4, 8);

    // Submission order differs from priority order on purpose.
    let tasks = vec![
        Task::new("B", "cmd B").with_threads(1).with_priority(1),
        Task::new("A", "cmd A").with_threads(4).with_priority(5),
        Task::new("X", "cmd X").with_threads(3).with_priority(9),
    ];

    let report = with_timeout(sched.submit(tasks)).await?;

    assert_eq!(report.dispatch_order, vec!["X", "A", "B"]);
    assert!(report.all_succeeded());
    Ok(())
}

#[tokio::test]
async fn tasks_behind_a_fitting_head_still_run_together() -> TestResult {
    init_tracing();
    let runner = FakeRunner::new().with_delay(Duration::from_millis(30));
    let sched = scheduler(&runner, 4, 4, 8);

    let tasks = vec![
        Task::new("h1", "h1").with_threads(2).with_priority(3),
        Task::new("h2", "h2").with_threads(1).with_priority(2),
        Task::new("h3", "h3").with_threads(1).with_priority(1),
    ];

    let report = with_timeout(sched.submit(tasks)).await?;

    assert_eq!(report.dispatch_order, vec!["h1", "h2", "h3"]);
    assert_eq!(runner.max_concurrency(), 3);
    Ok(())
}
