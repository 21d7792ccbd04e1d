//! Reconcile pass - compare the observed container with its definition and
//! issue the lifecycle operations that close the gap.
//!
//! A failing runtime call abandons the rest of the pass. Nothing is rolled
//! back: every action is safe to retry against whatever state the engine is
//! left in, and the next trigger does exactly that.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tracing::{error, info};

use super::Context;
use crate::definition::ResourceDefinition;
use crate::error::{Result, RuntimeError};
use crate::runtime::ObservedState;

/// What a pass decided to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// No container exists: create one from the definition and start it.
    Create(ResourceDefinition),
    /// Container is current but stopped.
    Start { id: String },
    /// Container is current and running.
    Nothing,
    /// Container exists but is no longer defined: stop, remove and retire.
    Teardown { running: bool },
    /// Container was created from an older version: recreate it.
    Replace {
        running: bool,
        definition: ResourceDefinition,
    },
    /// Neither a container nor a definition exists: retire without touching the engine.
    Retire,
}

/// Pick the action for one pass.
pub fn decide(observed: Option<&ObservedState>, desired: Option<&ResourceDefinition>) -> Action {
    match (observed, desired) {
        (None, Some(desired)) => Action::Create(desired.clone()),
        (None, None) => Action::Retire,
        (Some(observed), None) => Action::Teardown {
            running: observed.running,
        },
        (Some(observed), Some(desired)) if observed.version() == Some(desired.version.as_str()) => {
            if observed.running {
                Action::Nothing
            } else {
                Action::Start {
                    id: observed.id.clone(),
                }
            }
        }
        (Some(observed), Some(desired)) => Action::Replace {
            running: observed.running,
            definition: desired.clone(),
        },
    }
}

/// Result of one pass.
#[derive(Debug)]
pub enum PassOutcome {
    Unchanged,
    Created,
    Started,
    Replaced,
    /// The container is gone and no longer defined; the supervisor must
    /// deregister and close.
    Retire,
    /// A runtime call failed; the rest of the pass was skipped.
    Aborted(RuntimeError),
}

/// Runs reconcile passes for one container and holds its current definition.
pub struct Reconciler {
    name: String,
    definition: ResourceDefinition,
    ctx: Arc<Context>,
}

impl Reconciler {
    pub fn new(definition: ResourceDefinition, ctx: Arc<Context>) -> Self {
        Self {
            name: definition.name.clone(),
            definition,
            ctx,
        }
    }

    /// The definition the container was last (re)created from.
    pub fn definition(&self) -> &ResourceDefinition {
        &self.definition
    }

    /// Run one pass. Errors are logged here and never propagated.
    pub async fn pass(&mut self) -> PassOutcome {
        match self.try_pass().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Reconcile aborted: {}", e);
                PassOutcome::Aborted(e)
            }
        }
    }

    async fn try_pass(&mut self) -> Result<PassOutcome> {
        let runtime = Arc::clone(&self.ctx.runtime);

        let observed = match self.guarded("inspect", runtime.inspect(&self.name)).await {
            Ok(state) => Some(state),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        let desired = self.ctx.provider.lookup(&self.name);

        match decide(observed.as_ref(), desired.as_ref()) {
            Action::Nothing => Ok(PassOutcome::Unchanged),
            Action::Start { id } => {
                info!("Container not running, starting it");
                self.guarded("start", runtime.start(&id)).await?;
                Ok(PassOutcome::Started)
            }
            Action::Create(definition) => {
                info!("Container not found, creating it (version {})", definition.version);
                self.definition = definition;
                self.create_and_start().await?;
                Ok(PassOutcome::Created)
            }
            Action::Teardown { running } => {
                info!("Container definition removed, tearing down");
                if running {
                    info!("Stopping container");
                    self.guarded("stop", runtime.stop(&self.name, self.stop_timeout()))
                        .await?;
                }
                info!("Removing container");
                self.guarded("remove", runtime.remove(&self.name, true))
                    .await?;
                Ok(PassOutcome::Retire)
            }
            Action::Replace {
                running,
                definition,
            } => {
                info!(
                    "Container definition changed ({} -> {}), recreating",
                    observed
                        .as_ref()
                        .and_then(ObservedState::version)
                        .unwrap_or("unlabelled"),
                    definition.version
                );
                if running {
                    info!("Stopping old container");
                    self.guarded("stop", runtime.stop(&self.name, self.stop_timeout()))
                        .await?;
                }
                info!("Removing old container");
                self.guarded("remove", runtime.remove(&self.name, true))
                    .await?;
                self.definition = definition;
                self.create_and_start().await?;
                Ok(PassOutcome::Replaced)
            }
            Action::Retire => {
                info!("Container and definition both absent, nothing left to manage");
                Ok(PassOutcome::Retire)
            }
        }
    }

    async fn create_and_start(&self) -> Result<()> {
        let runtime = &self.ctx.runtime;

        info!("Creating container");
        let id = self
            .guarded("create", runtime.create(&self.name, &self.definition))
            .await?;
        info!("Starting container {}", id);
        self.guarded("start", runtime.start(&id)).await
    }

    fn stop_timeout(&self) -> Option<Duration> {
        self.definition
            .spec
            .stop_timeout
            .map(|secs| Duration::from_secs(secs.into()))
    }

    /// Apply the per-call deadline, if one is configured.
    async fn guarded<T>(&self, op: &'static str, call: impl Future<Output = Result<T>>) -> Result<T> {
        match self.ctx.call_timeout {
            Some(after) => time::timeout(after, call)
                .await
                .unwrap_or(Err(RuntimeError::Timeout { op, after })),
            None => call.await,
        }
    }
}
