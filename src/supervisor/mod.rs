//! Child process supervision
//!
//! Launches the single main child, forwards termination signals to it, reaps
//! every descendant that gets reparented to us and reports how the main child
//! ended.
//!
//! On unix the supervisor never waits for the main child's pid directly; it
//! watches the reaper's stream of completed processes and picks the main
//! child out of it. Anything else on that stream is an inherited orphan.

#[cfg(unix)]
mod reaper;
#[cfg(unix)]
mod signals;

#[cfg(unix)]
pub use reaper::{
    reap_ready, set_subreaper, ChildExitReport, ResourceUsage, WaitResult, ZombieReaper,
};
#[cfg(unix)]
pub use signals::{ForwardedSignal, TermForwarder};

use std::path::{Path, PathBuf};

/// Launch `binary` in `working_dir` and supervise it until it terminates
///
/// Returns `Ok(0)` only for a clean exit. A nonzero exit, a signal death and
/// any failure to get the child running are reported as errors; use
/// [`SupervisorError::exit_code`] to turn them into the entrypoint's status.
#[cfg(unix)]
pub async fn run_child_process(
    working_dir: &Path,
    binary: &str,
    args: &[String],
) -> Result<i32, SupervisorError> {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    use std::process::{Command, Stdio};

    change_dir(working_dir)?;

    log::info!("Running {} {}", binary, args.join(" "));

    if let Err(e) = set_subreaper() {
        log::warn!("Failed to become child subreaper: {} (orphans reparent to init)", e);
    }

    // Capture SIGTERM
    let mut term_rx = TermForwarder::new()
        .map_err(SupervisorError::SignalSetup)?
        .spawn_forwarder();

    // The reaper subscribes to SIGCHLD before the child exists
    let mut reaper = ZombieReaper::new().map_err(SupervisorError::SignalSetup)?;
    let mut completed_rx = reaper
        .take_receiver()
        .ok_or(SupervisorError::ReaperClosed)?;
    let _reaper_task = reaper.spawn();

    // The Child handle is intentionally never waited on: its status belongs
    // to the reaper.
    let child = Command::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| SupervisorError::Spawn {
            binary: binary.to_string(),
            source: e,
        })?;
    let main_pid = child.id() as i32;
    drop(child);

    log::debug!("Main child started with PID {}", main_pid);

    let report = loop {
        tokio::select! {
            Some(sig) = term_rx.recv() => {
                log::info!("Received {:?}, forwarding to PID {}", sig.as_nix(), main_pid);
                if let Err(e) = kill(Pid::from_raw(main_pid), sig.as_nix()) {
                    log::warn!("Failed to forward {:?} to PID {}: {}", sig.as_nix(), main_pid, e);
                }
            }
            completed = completed_rx.recv() => {
                let Some(report) = completed else {
                    return Err(SupervisorError::ReaperClosed);
                };
                if report.pid == main_pid {
                    break report;
                }
                log::debug!("Reaped orphan PID {} ({:?})", report.pid, report.status);
            }
        }
    };

    if let Some(usage) = report.rusage {
        log::debug!(
            "Child resource usage: user={:?} system={:?} maxrss={}kB",
            usage.user_time,
            usage.system_time,
            usage.max_rss_kb
        );
    }

    classify(report.status)
}

/// Map the main child's wait status onto the supervisor result
#[cfg(unix)]
fn classify(status: WaitResult) -> Result<i32, SupervisorError> {
    match status {
        WaitResult::Signaled {
            signal,
            core_dumped: true,
        } => Err(SupervisorError::CoreDumped(signal)),
        WaitResult::Signaled { signal, .. } => Err(SupervisorError::Signaled(signal)),
        WaitResult::Exited(0) => {
            log::info!("Child process exited with code 0");
            Ok(0)
        }
        WaitResult::Exited(code) => Err(SupervisorError::ExitedNonZero(code)),
        WaitResult::Unknown => Err(SupervisorError::UnknownStatus),
    }
}

/// Launch `binary` and block until it exits
///
/// Platforms without `SIGCHLD` get the naive path: no signal forwarding and
/// no orphan reaping.
#[cfg(not(unix))]
pub async fn run_child_process(
    working_dir: &Path,
    binary: &str,
    args: &[String],
) -> Result<i32, SupervisorError> {
    use std::process::Stdio;
    use tokio::process::Command;

    change_dir(working_dir)?;

    log::info!("Running {} {}", binary, args.join(" "));

    let status = Command::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|e| SupervisorError::Spawn {
            binary: binary.to_string(),
            source: e,
        })?;

    match status.code() {
        Some(0) => {
            log::info!("Child process exited with code 0");
            Ok(0)
        }
        Some(code) => Err(SupervisorError::ExitedNonZero(code)),
        None => Err(SupervisorError::UnknownStatus),
    }
}

fn change_dir(working_dir: &Path) -> Result<(), SupervisorError> {
    std::env::set_current_dir(working_dir).map_err(|e| SupervisorError::ChangeDir {
        path: working_dir.to_path_buf(),
        source: e,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Failed to enter directory {}: {source}", path.display())]
    ChangeDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Signal setup failed: {0}")]
    SignalSetup(#[source] std::io::Error),

    #[error("Failed to start {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("The child process exited with code {0}")]
    ExitedNonZero(i32),

    #[error("The child process was killed by signal {0}")]
    Signaled(i32),

    #[error("The child process crashed with a core dump (signal {0})")]
    CoreDumped(i32),

    #[error("The child process ended with an unrecognised wait status")]
    UnknownStatus,

    #[error("Reaper stopped before the child process exited")]
    ReaperClosed,
}

impl SupervisorError {
    /// Exit code the entrypoint should terminate with
    ///
    /// A child's own nonzero code is passed through; signal deaths follow the
    /// shell convention of `128 + signo`. A bad working directory is a
    /// configuration error and maps to the usage status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ExitedNonZero(code) => *code,
            Self::ChangeDir { .. } => 2,
            Self::Signaled(signal) | Self::CoreDumped(signal) => 128 + signal,
            _ => 1,
        }
    }
}
