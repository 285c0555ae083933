//! Integration tests for child supervision
//!
//! The reaper waits for *any* child of the test process, so tests that spawn
//! children must not overlap. Every test holds `CHILD_LOCK`.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;

use entrypoint::supervisor::{reap_ready, WaitResult};
use entrypoint::{run_child_process, SupervisorError};

static CHILD_LOCK: Mutex<()> = Mutex::const_new(());

fn sh(script: &str) -> Vec<String> {
    vec!["-c".to_string(), script.to_string()]
}

fn write_script(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[tokio::test]
async fn clean_exit_returns_zero() {
    let _lock = CHILD_LOCK.lock().await;
    let dir = tempfile::tempdir().unwrap();

    let code = tokio_test::assert_ok!(run_child_process(dir.path(), "/bin/sh", &sh("exit 0")).await);
    assert_eq!(code, 0);
}

#[tokio::test]
async fn nonzero_exit_code_is_propagated() {
    let _lock = CHILD_LOCK.lock().await;
    let dir = tempfile::tempdir().unwrap();

    let err = tokio_test::assert_err!(run_child_process(dir.path(), "/bin/sh", &sh("exit 7")).await);
    assert!(matches!(err, SupervisorError::ExitedNonZero(7)), "{:?}", err);
    assert_eq!(err.exit_code(), 7);
}

#[tokio::test]
async fn signal_death_is_an_error() {
    let _lock = CHILD_LOCK.lock().await;
    let dir = tempfile::tempdir().unwrap();

    let err = tokio_test::assert_err!(
        run_child_process(dir.path(), "/bin/sh", &sh("kill -KILL $$")).await
    );
    assert!(matches!(err, SupervisorError::Signaled(9)), "{:?}", err);
    assert_eq!(err.exit_code(), 137);
}

#[tokio::test]
async fn relative_binary_runs_in_working_dir() {
    let _lock = CHILD_LOCK.lock().await;
    let dir = tempfile::tempdir().unwrap();
    write_script(dir.path(), "Server", r#"[ "$1" = "--port" ] && [ "$2" = "9339" ] && exit 3; exit 1"#);

    let args = vec!["--port".to_string(), "9339".to_string()];
    let err = tokio_test::assert_err!(run_child_process(dir.path(), "./Server", &args).await);
    assert!(matches!(err, SupervisorError::ExitedNonZero(3)), "{:?}", err);
}

#[tokio::test]
async fn child_inherits_environment() {
    let _lock = CHILD_LOCK.lock().await;
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("ENTRYPOINT_TEST_MARKER", "present");

    let result = run_child_process(
        dir.path(),
        "/bin/sh",
        &sh(r#"[ "$ENTRYPOINT_TEST_MARKER" = "present" ]"#),
    )
    .await;
    assert_eq!(tokio_test::assert_ok!(result), 0);
}

#[tokio::test]
async fn missing_binary_fails_to_launch() {
    let _lock = CHILD_LOCK.lock().await;
    let dir = tempfile::tempdir().unwrap();

    let err = tokio_test::assert_err!(run_child_process(dir.path(), "./Server", &[]).await);
    assert!(matches!(err, SupervisorError::Spawn { .. }), "{:?}", err);
    assert_eq!(err.exit_code(), 1);
}

#[tokio::test]
async fn bad_working_dir_is_a_config_error() {
    let _lock = CHILD_LOCK.lock().await;

    let err = tokio_test::assert_err!(
        run_child_process(Path::new("/nonexistent/gameserver"), "/bin/sh", &sh("exit 0")).await
    );
    assert!(matches!(err, SupervisorError::ChangeDir { .. }), "{:?}", err);
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn orphans_are_reaped_and_skipped() {
    let _lock = CHILD_LOCK.lock().await;
    let dir = tempfile::tempdir().unwrap();

    // The backgrounded sleep outlives its subshell and is reparented to us
    let script = "(sleep 0.1 &); sleep 0.5; exit 4";
    let err = tokio_test::assert_err!(run_child_process(dir.path(), "/bin/sh", &sh(script)).await);
    assert!(matches!(err, SupervisorError::ExitedNonZero(4)), "{:?}", err);

    // Nothing is left waiting to be reaped
    assert!(reap_ready().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sigterm_is_forwarded_to_child() {
    let _lock = CHILD_LOCK.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_path_buf();

    // The child exits cleanly only if it receives SIGTERM
    let script = r#"trap "exit 0" TERM; i=0; while [ $i -lt 100 ]; do sleep 0.1; i=$((i+1)); done; exit 9"#;
    let handle = tokio::spawn(async move { run_child_process(&path, "/bin/sh", &sh(script)).await });

    tokio::time::sleep(Duration::from_millis(500)).await;
    nix::sys::signal::kill(nix::unistd::getpid(), nix::sys::signal::Signal::SIGTERM).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("supervisor did not return after SIGTERM")
        .unwrap();
    assert_eq!(tokio_test::assert_ok!(result), 0);
}

#[test]
fn reap_ready_collects_every_dead_child() {
    let _lock = CHILD_LOCK.blocking_lock();

    let mut pids = Vec::new();
    for code in [0, 1, 2] {
        let child = std::process::Command::new("/bin/sh")
            .args(["-c", &format!("exit {}", code)])
            .spawn()
            .unwrap();
        pids.push(child.id() as i32);
    }
    std::thread::sleep(Duration::from_millis(300));

    let reaped = reap_ready();
    for pid in &pids {
        let report = reaped
            .iter()
            .find(|r| r.pid == *pid)
            .unwrap_or_else(|| panic!("PID {} was not reaped: {:?}", pid, reaped));
        assert!(matches!(report.status, WaitResult::Exited(0..=2)));
        assert!(report.rusage.is_some());
    }
    assert!(reap_ready().is_empty());
}
