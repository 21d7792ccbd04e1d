//! Signal handling for the berth daemon.

use tokio::signal::unix::{Signal, SignalKind, signal};
use tracing::info;

/// What the daemon should do in response to a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// SIGHUP: re-read the definitions file.
    Reload,
    /// SIGINT or SIGTERM: stop all supervisors and exit.
    Shutdown,
}

/// Listens for the signals the daemon reacts to.
pub struct SignalListener {
    hangup: Signal,
    interrupt: Signal,
    terminate: Signal,
}

impl SignalListener {
    /// Install the handlers. Must be called from within a tokio runtime.
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Wait for the next signal.
    pub async fn next(&mut self) -> SignalAction {
        tokio::select! {
            _ = self.hangup.recv() => {
                info!("Received SIGHUP");
                SignalAction::Reload
            }
            _ = self.interrupt.recv() => {
                info!("Received SIGINT");
                SignalAction::Shutdown
            }
            _ = self.terminate.recv() => {
                info!("Received SIGTERM");
                SignalAction::Shutdown
            }
        }
    }
}
