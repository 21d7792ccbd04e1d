//! Supervisor Service - one long-lived task per managed container.
//!
//! A supervisor waits for a trigger (reload request, periodic tick or
//! shutdown), runs one reconcile pass per trigger and never overlaps passes.
//! Callers talk to it only through a [`SupervisorHandle`], which sets
//! signals and never touches the supervisor's state directly.

mod reconcile;
mod worker;

pub use reconcile::{Action, PassOutcome, Reconciler, decide};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{Instrument, debug, info_span};
use uuid::Uuid;

use crate::Config;
use crate::catalog::DefinitionProvider;
use crate::definition::ResourceDefinition;
use crate::runtime::RuntimeClient;
use crate::services::registry::Registry;
use worker::Worker;

/// Collaborators and settings shared by every supervisor.
pub struct Context {
    pub runtime: Arc<dyn RuntimeClient>,
    pub provider: Arc<dyn DefinitionProvider>,
    /// Period of the fallback reconcile trigger.
    pub interval: Duration,
    /// Deadline for each runtime call, `None` waits forever.
    pub call_timeout: Option<Duration>,
}

impl Context {
    pub fn new(
        runtime: Arc<dyn RuntimeClient>,
        provider: Arc<dyn DefinitionProvider>,
        config: &Config,
    ) -> Self {
        Self {
            runtime,
            provider,
            interval: config.interval,
            call_timeout: config.call_timeout,
        }
    }
}

struct Shared {
    id: Uuid,
    name: String,
    closed: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    /// Single-slot reload mailbox.
    reload_tx: mpsc::Sender<()>,
    exited_rx: watch::Receiver<bool>,
}

/// Control surface of a running supervisor. Cheap to clone.
#[derive(Clone)]
pub struct SupervisorHandle {
    shared: Arc<Shared>,
}

impl SupervisorHandle {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Unique per supervisor instance, also across instances for the same name.
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Ask for a reconcile pass. Never blocks.
    ///
    /// If a reload is already pending the request is absorbed; the pending
    /// pass will observe whatever changed.
    pub fn request_reload(&self) {
        if self.is_closed() {
            return;
        }
        if self.shared.reload_tx.try_send(()).is_err() {
            debug!(container = %self.name(), "Reload already pending");
        }
    }

    /// Stop the supervisor at its next wait point.
    ///
    /// Returns true for the one call that actually closed it.
    pub fn close(&self) -> bool {
        let first = self
            .shared
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            self.shared.shutdown_tx.send_replace(true);
            debug!(container = %self.name(), "Close requested");
        }
        first
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// True once the supervisor loop has returned.
    pub fn has_exited(&self) -> bool {
        *self.shared.exited_rx.borrow()
    }

    /// Wait until the supervisor loop has returned.
    pub async fn closed(&self) {
        let mut exited = self.shared.exited_rx.clone();
        // An error means the loop dropped its sender, which also means it is gone.
        let _ = exited.wait_for(|exited| *exited).await;
    }
}

impl std::fmt::Debug for SupervisorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorHandle")
            .field("name", &self.shared.name)
            .field("id", &self.shared.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Start supervising `definition.name`.
///
/// One reload is pre-armed so the first pass runs immediately. Most callers
/// want [`Registry::manage`], which also keeps the name unique.
pub fn spawn(
    definition: ResourceDefinition,
    ctx: Arc<Context>,
    registry: Registry,
) -> SupervisorHandle {
    let (reload_tx, reload_rx) = mpsc::channel(1);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (exited_tx, exited_rx) = watch::channel(false);

    let _ = reload_tx.try_send(());

    let name = definition.name.clone();
    let handle = SupervisorHandle {
        shared: Arc::new(Shared {
            id: Uuid::new_v4(),
            name: name.clone(),
            closed: AtomicBool::new(false),
            shutdown_tx,
            reload_tx,
            exited_rx,
        }),
    };

    let worker = Worker {
        handle: handle.clone(),
        interval: ctx.interval,
        reconciler: Reconciler::new(definition, ctx),
        registry,
        reload_rx,
        shutdown_rx,
        exited_tx,
    };
    tokio::spawn(worker.run().instrument(info_span!("container", name = %name)));

    handle
}
