//! Zombie process reaping
//!
//! The entrypoint runs as PID 1 (or a subreaper) inside the container, so
//! every orphaned descendant of the main child is reparented to us and must be
//! waited for. The reaper never waits on a specific pid: it drains every ready
//! child with `wait4(-1, WNOHANG)` and publishes what it finds.

use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use std::time::Duration;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Capacity of the completed-process channel
const REPORT_CHANNEL_CAPACITY: usize = 64;

/// Information about a reaped process
#[derive(Debug, Clone)]
pub struct ChildExitReport {
    pub pid: i32,
    pub status: WaitResult,
    pub rusage: Option<ResourceUsage>,
}

/// Exit status of a reaped process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// Process exited normally with code
    Exited(i32),
    /// Process killed by signal
    Signaled { signal: i32, core_dumped: bool },
    /// Unknown status
    Unknown,
}

impl WaitResult {
    fn from_wait_status(status: WaitStatus) -> Self {
        match status {
            WaitStatus::Exited(_, code) => WaitResult::Exited(code),
            WaitStatus::Signaled(_, signal, core_dumped) => WaitResult::Signaled {
                signal: signal as i32,
                core_dumped,
            },
            _ => WaitResult::Unknown,
        }
    }
}

/// Resource usage reported by the kernel for a reaped process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceUsage {
    pub user_time: Duration,
    pub system_time: Duration,
    /// Peak resident set size in kilobytes
    pub max_rss_kb: i64,
}

impl ResourceUsage {
    fn from_rusage(ru: &libc::rusage) -> Self {
        Self {
            user_time: timeval_to_duration(ru.ru_utime),
            system_time: timeval_to_duration(ru.ru_stime),
            max_rss_kb: ru.ru_maxrss as i64,
        }
    }
}

fn timeval_to_duration(tv: libc::timeval) -> Duration {
    let secs = u64::try_from(tv.tv_sec).unwrap_or(0);
    let micros = u32::try_from(tv.tv_usec).unwrap_or(0);
    Duration::from_secs(secs) + Duration::from_micros(u64::from(micros))
}

/// Outcome of a single non-blocking wait
enum Reaped {
    Child(ChildExitReport),
    /// A child changed state without terminating (stopped/continued)
    NotTerminated,
    /// Children exist but none is ready
    NoneReady,
    /// No children at all
    NoChildren,
}

/// Non-blocking `wait4(-1)` that also collects resource usage
fn wait_any_nohang() -> Reaped {
    let mut raw_status: libc::c_int = 0;
    // SAFETY: rusage is plain old data, zero is a valid bit pattern.
    let mut rusage: libc::rusage = unsafe { std::mem::zeroed() };

    // SAFETY: both out-pointers refer to live locals for the duration of the call.
    let pid = unsafe { libc::wait4(-1, &mut raw_status, libc::WNOHANG, &mut rusage) };

    if pid == 0 {
        return Reaped::NoneReady;
    }
    if pid < 0 {
        let errno = nix::errno::Errno::last();
        if errno != nix::errno::Errno::ECHILD {
            log::error!("wait4 error: {}", errno);
        }
        return Reaped::NoChildren;
    }

    match WaitStatus::from_raw(Pid::from_raw(pid), raw_status) {
        Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => {
            Reaped::Child(ChildExitReport {
                pid,
                status: WaitResult::from_wait_status(status),
                rusage: Some(ResourceUsage::from_rusage(&rusage)),
            })
        }
        Ok(_) => Reaped::NotTerminated,
        Err(e) => {
            log::warn!("Cannot decode wait status {:#x} for PID {}: {}", raw_status, pid, e);
            Reaped::Child(ChildExitReport {
                pid,
                status: WaitResult::Unknown,
                rusage: None,
            })
        }
    }
}

/// Reap all available zombie processes (non-blocking)
///
/// Returns every terminated child collected in this pass, in the order the
/// kernel handed them out.
pub fn reap_ready() -> Vec<ChildExitReport> {
    let mut reaped = Vec::new();

    loop {
        match wait_any_nohang() {
            Reaped::Child(report) => {
                log::debug!("Reaped PID {} ({:?})", report.pid, report.status);
                reaped.push(report);
            }
            Reaped::NotTerminated => continue,
            Reaped::NoneReady | Reaped::NoChildren => break,
        }
    }

    reaped
}

/// Zombie process reaper
///
/// Subscribes to `SIGCHLD` on construction. Create it before spawning the main
/// child so an exit right after `fork` cannot slip past the subscription.
pub struct ZombieReaper {
    sigchld: Signal,
    tx: mpsc::Sender<ChildExitReport>,
    rx: Option<mpsc::Receiver<ChildExitReport>>,
}

impl ZombieReaper {
    /// Create a new zombie reaper
    pub fn new() -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel(REPORT_CHANNEL_CAPACITY);
        Ok(Self {
            sigchld: signal(SignalKind::child())?,
            tx,
            rx: Some(rx),
        })
    }

    /// Take the receiver for reaped processes
    pub fn take_receiver(&mut self) -> Option<mpsc::Receiver<ChildExitReport>> {
        self.rx.take()
    }

    /// Spawn the reaping loop
    ///
    /// Each iteration drains every ready child before blocking on the next
    /// `SIGCHLD`; the first drain covers signals delivered before we
    /// subscribed. The task ends once the receiver is dropped.
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                for report in reap_ready() {
                    if self.tx.send(report).await.is_err() {
                        log::debug!("Reaper receiver dropped, stopping");
                        return;
                    }
                }

                if self.sigchld.recv().await.is_none() {
                    log::warn!("SIGCHLD stream closed, reaper stopping");
                    return;
                }
            }
        })
    }
}

/// Mark this process as a child subreaper
///
/// Orphaned descendants are then reparented to us instead of the real init,
/// which matters when the entrypoint is not PID 1 (e.g. under `docker run
/// --init` or a debugging shell).
#[cfg(target_os = "linux")]
pub fn set_subreaper() -> std::io::Result<()> {
    // SAFETY: prctl with PR_SET_CHILD_SUBREAPER takes no pointers.
    let code = unsafe { libc::prctl(libc::PR_SET_CHILD_SUBREAPER, 1, 0, 0, 0) };
    if code != 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
pub fn set_subreaper() -> std::io::Result<()> {
    Ok(())
}
