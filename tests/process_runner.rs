#![cfg(unix)]

use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use snpflow::exec::{CommandRequest, CommandRunner, RealCommandRunner};
use snpflow::sched::{Task, TaskOutcome, TaskScheduler};
use snpflow::tools::{PathToolChecker, ToolChecker};
use snpflow_test_utils::builders::limits;
use snpflow_test_utils::{init_tracing, with_timeout};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn Error>>;

fn request(command: &str) -> CommandRequest {
    CommandRequest {
        command: command.to_string(),
        log_path: None,
        threads: 1,
    }
}

#[tokio::test]
async fn captures_stdout_and_stderr() -> TestResult {
    let runner = RealCommandRunner::new();

    let out = runner.execute(request("echo hello; echo oops 1>&2")).await?;

    assert!(out.success());
    assert_eq!(out.stdout.trim(), "hello");
    assert_eq!(out.stderr.trim(), "oops");
    Ok(())
}

#[tokio::test]
async fn reports_non_zero_exit_codes() -> TestResult {
    let runner = RealCommandRunner::new();

    let out = runner.execute(request("exit 3")).await?;

    assert!(!out.success());
    assert_eq!(out.exit_code, Some(3));
    Ok(())
}

#[tokio::test]
async fn log_path_receives_both_streams() -> TestResult {
    let dir = TempDir::new()?;
    let log = dir.path().join("logs").join("bwa_map").join("bwa_map_S1.log");
    let runner = RealCommandRunner::new();

    let out = runner
        .execute(CommandRequest {
            command: "echo to-out; echo to-err 1>&2".to_string(),
            log_path: Some(log.clone()),
            threads: 1,
        })
        .await?;

    assert!(out.success());
    assert!(out.stdout.is_empty());
    let logged = fs::read_to_string(&log)?;
    assert!(logged.contains("to-out"));
    assert!(logged.contains("to-err"));
    Ok(())
}

#[tokio::test]
async fn thread_hint_is_exported() -> TestResult {
    let runner = RealCommandRunner::new();

    let out = runner
        .execute(CommandRequest {
            command: "echo \"${OMP_NUM_THREADS:-unset}\"".to_string(),
            log_path: None,
            threads: 4,
        })
        .await?;
    assert_eq!(out.stdout.trim(), "4");
    Ok(())
}

#[tokio::test]
async fn timed_out_process_is_killed() -> TestResult {
    init_tracing();
    let sched = TaskScheduler::new(
        limits(2, 2, 2),
        Arc::new(RealCommandRunner::new()),
        Some(Duration::from_millis(200)),
    )?;

    let started = Instant::now();
    let report = with_timeout(sched.submit(vec![
        Task::new("slow", "sleep 30"),
        Task::new("fast", "true"),
    ]))
    .await?;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.outcomes["fast"], TaskOutcome::Succeeded);
    match &report.outcomes["slow"] {
        TaskOutcome::Failed(failure) => assert!(failure.reason.contains("timed out")),
        other => panic!("expected timeout, got {other:?}"),
    }
    Ok(())
}

/// True while `pid` exists and is not a zombie.
#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    match fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .is_some_and(|rest| !rest.trim_start().starts_with('Z')),
        Err(_) => false,
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn timeout_kills_tools_started_by_compound_commands() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let pid_file = dir.path().join("tool.pid");
    let sched = TaskScheduler::new(
        limits(1, 1, 1),
        Arc::new(RealCommandRunner::new()),
        Some(Duration::from_millis(300)),
    )?;

    // The tool runs as a grandchild of the task's shell, the way
    // `mkdir -p out && gatk ...` does. The trailing echo keeps the shell
    // from exec-ing the last command in place.
    let command = format!(
        "mkdir -p {work} && sh -c 'echo $$ > {pid}; exec sleep 30'; echo done",
        work = dir.path().join("work").display(),
        pid = pid_file.display(),
    );
    let report = with_timeout(sched.submit(vec![Task::new("compound", command)])).await?;

    match &report.outcomes["compound"] {
        TaskOutcome::Failed(failure) => assert!(failure.reason.contains("timed out")),
        other => panic!("expected timeout, got {other:?}"),
    }

    let pid: u32 = fs::read_to_string(&pid_file)?.trim().parse()?;
    let deadline = Instant::now() + Duration::from_secs(2);
    while process_alive(pid) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!process_alive(pid), "tool process {pid} outlived its timed-out task");
    Ok(())
}

fn write_script(dir: &Path, name: &str, mode: u32) -> TestResult {
    let path = dir.join(name);
    fs::write(&path, "#!/bin/sh\nexit 0\n")?;
    fs::set_permissions(&path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[test]
fn path_checker_finds_only_executables() -> TestResult {
    let dir = TempDir::new()?;
    write_script(dir.path(), "bwa-mem2", 0o755)?;
    write_script(dir.path(), "samtools", 0o644)?;

    let checker = PathToolChecker::new(
        BTreeMap::new(),
        Some(dir.path().as_os_str().to_owned()),
    );

    assert_eq!(checker.locate("bwa-mem2"), Some(dir.path().join("bwa-mem2")));
    assert_eq!(checker.locate("samtools"), None);
    assert_eq!(
        checker.missing_tools(&["bwa-mem2", "samtools", "plink"]),
        vec!["samtools", "plink"]
    );
    assert!(!checker.all_required_tools_present(&["bwa-mem2", "plink"]));
    assert!(checker.all_required_tools_present(&["bwa-mem2"]));
    Ok(())
}

#[test]
fn software_overrides_take_precedence_over_path() -> TestResult {
    let bin = TempDir::new()?;
    let opt = TempDir::new()?;
    write_script(opt.path(), "gatk-4.5", 0o755)?;
    write_script(bin.path(), "picard-wrapper", 0o755)?;

    let mut overrides = BTreeMap::new();
    overrides.insert(
        "gatk".to_string(),
        opt.path().join("gatk-4.5").display().to_string(),
    );
    overrides.insert("picard".to_string(), "picard-wrapper".to_string());
    overrides.insert(
        "plink".to_string(),
        opt.path().join("missing").display().to_string(),
    );

    let checker = PathToolChecker::new(overrides, Some(bin.path().as_os_str().to_owned()));

    assert_eq!(checker.locate("gatk"), Some(opt.path().join("gatk-4.5")));
    assert_eq!(checker.locate("picard"), Some(bin.path().join("picard-wrapper")));
    assert_eq!(checker.locate("plink"), None);
    Ok(())
}

#[test]
fn no_search_path_finds_nothing_bare() {
    let checker = PathToolChecker::new(BTreeMap::new(), None);
    assert_eq!(checker.missing_tools(&["sh"]), vec!["sh"]);
}
