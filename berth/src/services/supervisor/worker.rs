//! Supervisor loop.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::{PassOutcome, Reconciler, SupervisorHandle};
use crate::services::registry::{Registry, Retirement};

#[derive(Debug, Clone, Copy)]
enum Trigger {
    Reload,
    Tick,
}

pub(super) struct Worker {
    pub handle: SupervisorHandle,
    pub interval: Duration,
    pub reconciler: Reconciler,
    pub registry: Registry,
    pub reload_rx: mpsc::Receiver<()>,
    pub shutdown_rx: watch::Receiver<bool>,
    pub exited_tx: watch::Sender<bool>,
}

/// Flags the loop as exited when dropped, including on panic.
struct ExitSignal(watch::Sender<bool>);

impl Drop for ExitSignal {
    fn drop(&mut self) {
        self.0.send_replace(true);
    }
}

impl Worker {
    pub async fn run(self) {
        let Worker {
            handle,
            interval,
            mut reconciler,
            registry,
            mut reload_rx,
            mut shutdown_rx,
            exited_tx,
        } = self;
        let _exit = ExitSignal(exited_tx);

        info!("Supervisor started (version {})", reconciler.definition().version);

        // The pre-armed reload covers the first pass, so the first tick is a full period out.
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if handle.is_closed() {
                break;
            }

            let trigger = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                Some(()) = reload_rx.recv() => Trigger::Reload,
                _ = ticker.tick() => Trigger::Tick,
            };

            // Shutdown may race with a trigger.
            if handle.is_closed() {
                break;
            }

            debug!(?trigger, "Reconciling");
            if let PassOutcome::Retire = reconciler.pass().await {
                match registry.retire(&handle).await {
                    Retirement::Declined => {
                        info!("Definition reappeared, staying active");
                        handle.request_reload();
                    }
                    Retirement::Retired | Retirement::NotOwned => break,
                }
            }
            ticker.reset();
        }

        info!("Supervisor stopped");
    }
}
