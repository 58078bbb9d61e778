//! Session integration tests.
//!
//! Each test runs on its own thread and therefore gets its own execution
//! context and shell.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use shell_tether::context::{
    self, cleanup_shell, get_background_job, get_shell, list_background_jobs,
    reset_background_jobs, set_shell, start_background_job,
};
use shell_tether::execution::{
    CommandExecutor, ShellCommand, INTERRUPTED_RETURNCODE, TIMED_OUT_RETURNCODE,
};
use shell_tether::jobs::JobStatus;
use shell_tether::output::{OutputPresenter, QUIET_OUTPUT_DIR};
use shell_tether::session::{is_live, SessionState, ShellConfig, ShellSession};
use shell_tether::split_commands;
use shell_tether::validation::{CommandValidator, ValidationMode};
use shell_tether::ShellTetherError;

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_cd_persists() {
    let shell = get_shell().unwrap();
    shell.run("cd /tmp", None).unwrap();
    let result = shell.run("pwd", None).unwrap();
    assert_eq!(result.stdout_trimmed(), "/tmp");
    assert_eq!(shell.cwd().unwrap().to_str(), Some("/tmp"));
}

#[test]
fn test_same_shell_within_context() {
    let first = get_shell().unwrap();
    let second = get_shell().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_variables_and_functions_persist() {
    let shell = get_shell().unwrap();
    shell.run("export GREETING=hello", None).unwrap();
    shell.run("greet() { echo \"$GREETING $1\"; }", None).unwrap();
    let result = shell.run("greet world", None).unwrap();
    assert_eq!(result.stdout_trimmed(), "hello world");
}

#[test]
fn test_multiline_script_runs_every_statement() {
    let script = "cd /tmp\ncat <<'EOF'\n$HOME stays literal\nEOF\nfor i in 1 2; do\n  echo \"n=$i\"\ndone";
    assert_eq!(split_commands(script).len(), 3);

    let result = get_shell().unwrap().run(script, None).unwrap();
    assert_eq!(result.returncode, Some(0));
    assert_eq!(result.stdout, "$HOME stays literal\nn=1\nn=2\n");
}

#[test]
fn test_separate_streams_and_returncode() {
    let result = get_shell()
        .unwrap()
        .run("echo out; echo err >&2; false", None)
        .unwrap();
    assert_eq!(result.stdout, "out\n");
    assert_eq!(result.stderr, "err\n");
    assert_eq!(result.returncode, Some(1));
}

#[test]
fn test_concurrent_contexts_are_isolated() {
    let dirs = ["/tmp", "/", "/usr", "/etc"];
    let handles: Vec<_> = dirs
        .iter()
        .map(|dir| {
            let dir = dir.to_string();
            thread::spawn(move || {
                let shell = get_shell().unwrap();
                shell.run(&format!("cd {dir}"), None).unwrap();
                thread::sleep(Duration::from_millis(50));
                let pwd = shell.run("pwd", None).unwrap().stdout_trimmed().to_string();
                (dir, pwd, shell.id())
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        let (dir, pwd, id) = handle.join().unwrap();
        assert_eq!(pwd, dir);
        ids.push(id);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), dirs.len());
}

// ============================================================================
// Interrupt & Timeout
// ============================================================================

#[test]
fn test_interrupt_keeps_partial_output() {
    let shell = get_shell().unwrap();
    let runner = Arc::clone(&shell);
    let handle = thread::spawn(move || runner.run("echo started; sleep 10; echo never", None));

    thread::sleep(Duration::from_millis(500));
    assert!(shell.interrupt());

    let result = handle.join().unwrap().unwrap();
    assert!(result.interrupted);
    assert_eq!(result.returncode, Some(INTERRUPTED_RETURNCODE));
    assert!(result.stdout.contains("started"));
    assert!(!result.stdout.contains("never"));
    assert!(result.duration < Duration::from_secs(5));

    assert_eq!(shell.state(), SessionState::Ready);
    let after = shell.run("echo alive", None).unwrap();
    assert_eq!(after.stdout_trimmed(), "alive");
}

#[test]
fn test_interrupt_stops_remaining_statements() {
    let shell = get_shell().unwrap();
    let runner = Arc::clone(&shell);
    let handle = thread::spawn(move || runner.run("sleep 10\necho second-statement", None));

    thread::sleep(Duration::from_millis(300));
    shell.interrupt();

    let result = handle.join().unwrap().unwrap();
    assert!(result.interrupted);
    assert!(!result.stdout.contains("second-statement"));
}

#[test]
fn test_timeout_returns_and_session_survives() {
    let shell = get_shell().unwrap();
    let start = Instant::now();
    let result = shell
        .run("echo before; sleep 10", Some(Duration::from_millis(500)))
        .unwrap();

    assert!(result.timed_out);
    assert_eq!(result.returncode, Some(TIMED_OUT_RETURNCODE));
    assert_eq!(result.stdout, "before\n");
    assert!(start.elapsed() < Duration::from_secs(5));

    let after = shell.run("echo ok", None).unwrap();
    assert_eq!(after.stdout, "ok\n");
}

#[test]
fn test_busy_session_rejects_second_run() {
    let shell = get_shell().unwrap();
    let runner = Arc::clone(&shell);
    let handle = thread::spawn(move || runner.run("sleep 1", None));

    thread::sleep(Duration::from_millis(200));
    let err = shell.run("echo overlap", None).unwrap_err();
    assert!(matches!(
        err,
        ShellTetherError::SessionNotReady(SessionState::Executing)
    ));
    assert_eq!(handle.join().unwrap().unwrap().returncode, Some(0));
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_exit_replaces_shell_on_next_get() {
    let shell = get_shell().unwrap();
    let result = shell.run("exit 3", None).unwrap();
    assert_eq!(result.returncode, Some(3));
    assert_eq!(shell.state(), SessionState::Closed);
    assert!(!is_live(shell.id()));

    let replacement = get_shell().unwrap();
    assert_ne!(replacement.id(), shell.id());
    assert_eq!(replacement.run("echo fresh", None).unwrap().stdout, "fresh\n");
}

#[test]
fn test_cleanup_shell() {
    let shell = get_shell().unwrap();
    assert!(cleanup_shell().unwrap());
    assert!(shell.state().is_terminal());
    assert!(!cleanup_shell().unwrap());
}

#[test]
fn test_set_shell_binds_explicit_session() {
    let custom = Arc::new(
        ShellSession::spawn(&ShellConfig::default().env("TETHER_TEST_MARK", "custom")).unwrap(),
    );
    let previous = get_shell().unwrap();

    set_shell(Some(Arc::clone(&custom))).unwrap();
    assert!(previous.state().is_terminal());

    let result = get_shell().unwrap().run("echo $TETHER_TEST_MARK", None).unwrap();
    assert_eq!(result.stdout_trimmed(), "custom");

    set_shell(None).unwrap();
    assert!(custom.state().is_terminal());
}

#[test]
fn test_thread_exit_closes_shell() {
    let shell = thread::spawn(|| get_shell().unwrap()).join().unwrap();
    assert!(shell.state().is_terminal());
    assert!(!is_live(shell.id()));
}

// ============================================================================
// Background Jobs
// ============================================================================

#[test]
fn test_background_job_ids_per_context() {
    let ids: Vec<u64> = (0..3)
        .map(|_| start_background_job("true").unwrap().id())
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);

    let other = thread::spawn(|| start_background_job("true").unwrap().id())
        .join()
        .unwrap();
    assert_eq!(other, 1);

    reset_background_jobs().unwrap();
    assert!(list_background_jobs().unwrap().is_empty());
    assert_eq!(start_background_job("true").unwrap().id(), 1);
}

#[test]
fn test_background_job_output_and_kill() {
    let quick = start_background_job("echo from-job; echo oops >&2; exit 4").unwrap();
    let slow = start_background_job("sleep 30").unwrap();

    assert_eq!(quick.wait(Duration::from_secs(5)), Some(4));
    let fetched = get_background_job(quick.id()).unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    while fetched.get_output().stderr.is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    let output = fetched.get_output();
    assert_eq!(output.stdout, "from-job\n");
    assert_eq!(output.stderr, "oops\n");
    assert_eq!(fetched.status(), JobStatus::Finished(Some(4)));

    assert!(slow.is_running());
    assert_eq!(reset_background_jobs().unwrap(), 1);
    assert_eq!(slow.status(), JobStatus::Killed);
    assert!(matches!(
        get_background_job(1),
        Err(ShellTetherError::JobNotFound(1))
    ));
}

#[test]
fn test_background_jobs_do_not_touch_session_state() {
    let shell = get_shell().unwrap();
    shell.run("cd /tmp", None).unwrap();
    let job = start_background_job("pwd").unwrap();
    job.wait(Duration::from_secs(5));
    let deadline = Instant::now() + Duration::from_secs(2);
    while job.get_output().stdout.is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    assert_ne!(job.get_output().stdout.trim(), "");
    assert_eq!(shell.run("pwd", None).unwrap().stdout_trimmed(), "/tmp");
}

// ============================================================================
// Validation & Presentation
// ============================================================================

#[test]
fn test_strict_validation_never_reaches_shell() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("created");
    let executor = CommandExecutor::new(
        CommandValidator::with_mode(ValidationMode::Strict),
        OutputPresenter::default(),
    );

    let cmd = ShellCommand::new(format!("touch {} && python -V", marker.display()));
    let err = executor.execute_current(&cmd).unwrap_err();
    assert!(matches!(err, ShellTetherError::ValidationBlocked(_)));
    assert!(!marker.exists());
}

#[test]
fn test_warn_validation_runs_with_advisory() {
    let executor = CommandExecutor::new(
        CommandValidator::with_mode(ValidationMode::Warn),
        OutputPresenter::default(),
    );
    let execution = executor
        .execute_current(&ShellCommand::new("echo python"))
        .unwrap();
    assert!(execution.output.contains("[python_invocation]"));
    assert_eq!(execution.result.stdout, "python\n");
    assert_eq!(executor.validator().metrics().total_warnings, 1);
}

#[test]
fn test_quiet_mode_offloads_output() {
    let dir = tempfile::tempdir().unwrap();
    let executor = CommandExecutor::new(
        CommandValidator::with_mode(ValidationMode::Off),
        OutputPresenter::new(Some(dir.path().to_path_buf())),
    );

    let execution = executor
        .execute_current(&ShellCommand::new("seq 1 500").quiet(true))
        .unwrap();
    assert!(!execution.output.contains("\n250\n"));
    assert!(execution.output.contains("Output saved to:"));

    let saved: Vec<_> = std::fs::read_dir(dir.path().join(QUIET_OUTPUT_DIR))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(saved.len(), 1);
    let content = std::fs::read_to_string(&saved[0]).unwrap();
    assert!(content.starts_with("=== stdout ===\n1\n2\n"));
    assert!(content.contains("\n500\n=== stderr ===\n"));
}

#[test]
fn test_context_key_is_stable_per_thread() {
    let key = context::current_context().key().to_string();
    assert_eq!(context::current_context().key(), key);
    let other = thread::spawn(|| context::current_context().key().to_string())
        .join()
        .unwrap();
    assert_ne!(other, key);
}
