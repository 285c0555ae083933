//! entrypoint - Container entrypoint for long-running application processes
//!
//! Runs two things side by side:
//! - A supervisor that launches the application, forwards SIGTERM to it,
//!   reaps every descendant and reports the application's exit status
//! - A probe proxy that fronts the application's liveness/readiness
//!   endpoints and lets operators force their outcome for a while
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   entrypoint                     │
//! ├────────────────────────┬────────────────────────┤
//! │  Supervisor (main)     │  Probe proxy (task)    │
//! │  SIGTERM ─▶ child      │  :8585 ─▶ :8888        │
//! │  SIGCHLD ─▶ reaper     │  override records      │
//! └────────────────────────┴────────────────────────┘
//! ```
//!
//! The two halves never talk to each other; the proxy reaches the child only
//! over loopback HTTP.

pub mod app;
pub mod config;
pub mod probe;
pub mod supervisor;

pub use app::App;
pub use config::ProxyConfig;
pub use probe::{ProbeProxy, ProxyError};
pub use supervisor::{run_child_process, SupervisorError};
