//! Termination signal capture
//!
//! `SIGTERM` delivered to the entrypoint is not acted on here; it is pushed
//! onto a small buffered channel for the supervisor loop to forward to the
//! main child.

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;

/// Buffer for pending termination requests
const TERM_CHANNEL_CAPACITY: usize = 10;

/// Signals that the supervisor forwards to the main child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardedSignal {
    /// Graceful shutdown request (SIGTERM)
    Term,
}

impl ForwardedSignal {
    pub fn as_nix(self) -> nix::sys::signal::Signal {
        match self {
            Self::Term => nix::sys::signal::Signal::SIGTERM,
        }
    }
}

/// SIGTERM listener
pub struct TermForwarder {
    sigterm: Signal,
}

impl TermForwarder {
    /// Install the SIGTERM handler
    ///
    /// From here on SIGTERM no longer terminates the entrypoint.
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
        })
    }

    /// Spawn a task that forwards signals to a channel
    ///
    /// Sends never block: a signal arriving while the buffer is full is
    /// dropped, which is harmless since repeated SIGTERMs are idempotent.
    pub fn spawn_forwarder(mut self) -> mpsc::Receiver<ForwardedSignal> {
        let (tx, rx) = mpsc::channel(TERM_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            while self.sigterm.recv().await.is_some() {
                match tx.try_send(ForwardedSignal::Term) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        log::debug!("SIGTERM buffer full, dropping duplicate");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
        });

        rx
    }
}
