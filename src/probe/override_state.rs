//! Time-limited probe overrides
//!
//! ```text
//!                 set(Success|Failure)
//!   ┌─────────────┐ ───────────────────▶ ┌────────────────────────┐
//!   │ Passthrough │                      │ ForceSuccess/Failure   │
//!   └─────────────┘ ◀─────────────────── └────────────────────────┘
//!                   set(Passthrough) or
//!                   read at now >= expire_at
//! ```
//!
//! Expiry is lazy: the record is demoted on the first read past its deadline.

use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// How a probe endpoint answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverrideMode {
    /// Relay the child's own probe result
    #[default]
    Passthrough,
    /// Answer 200 without asking the child
    ForceSuccess,
    /// Answer 500 without asking the child
    ForceFailure,
}

impl OverrideMode {
    /// Name accepted by the `mode` query parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passthrough => "Passthrough",
            Self::ForceSuccess => "Success",
            Self::ForceFailure => "Failure",
        }
    }
}

impl fmt::Display for OverrideMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverrideMode {
    type Err = InvalidOverrideMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Success" => Ok(Self::ForceSuccess),
            "Failure" => Ok(Self::ForceFailure),
            "Passthrough" => Ok(Self::Passthrough),
            other => Err(InvalidOverrideMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid mode parameter '{0}'")]
pub struct InvalidOverrideMode(pub String);

/// Snapshot of an override as seen by one probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverrideState {
    pub mode: OverrideMode,
    /// Time left before the override lapses; zero in passthrough
    pub expires_in: Duration,
}

#[derive(Debug, Default)]
struct Inner {
    mode: OverrideMode,
    /// Only consulted when `mode` is not `Passthrough`
    expire_at: Option<Instant>,
}

/// Override for a single probe endpoint
///
/// The lock covers only the `(mode, expire_at)` pair and is never held across
/// I/O.
#[derive(Debug, Default)]
pub struct OverrideRecord {
    inner: Mutex<Inner>,
}

impl OverrideRecord {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // The guarded pair is written in one step, so a poisoned lock still
        // holds a consistent value.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Install `mode` for `ttl` starting now
    pub fn set(&self, mode: OverrideMode, ttl: Duration) {
        self.set_at(mode, ttl, Instant::now());
    }

    pub fn set_at(&self, mode: OverrideMode, ttl: Duration, now: Instant) {
        let mut inner = self.lock();
        inner.mode = mode;
        inner.expire_at = Some(now + ttl);

        let wall_clock = chrono::Local::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());
        log::info!(
            "Override set to {}, expires at {}",
            mode,
            wall_clock.format("%Y-%m-%d %H:%M:%S %Z")
        );
    }

    /// Current override, demoting it first if it has expired
    pub fn state(&self) -> OverrideState {
        self.state_at(Instant::now())
    }

    pub fn state_at(&self, now: Instant) -> OverrideState {
        let mut inner = self.lock();

        if inner.mode != OverrideMode::Passthrough {
            match inner.expire_at {
                Some(expire_at) if now < expire_at => {
                    return OverrideState {
                        mode: inner.mode,
                        expires_in: expire_at - now,
                    };
                }
                _ => {
                    log::info!("Resetting expired {} override", inner.mode);
                    inner.mode = OverrideMode::Passthrough;
                    inner.expire_at = None;
                }
            }
        }

        OverrideState {
            mode: OverrideMode::Passthrough,
            expires_in: Duration::ZERO,
        }
    }
}

/// Render a remaining duration as `Xm Ys`, or `Ys` under a minute
pub fn format_duration(d: Duration) -> String {
    let total = d.as_secs();
    let minutes = total / 60;
    let seconds = total % 60;
    if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
