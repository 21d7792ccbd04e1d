//! Registry - maps container names to their live supervisor.
//!
//! All mutation goes through the registry lock, so at most one live
//! supervisor exists per name. A supervisor that retires removes itself
//! and signals its own close while holding the lock, which means a
//! concurrent `manage` never hands out a supervisor that is about to stop.
//! Retirement is re-checked against the provider under that same lock, so
//! a supervisor handed out mid-teardown stays live.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::definition::ResourceDefinition;
use crate::services::supervisor::{self, Context, SupervisorHandle};

/// Result of [`Registry::retire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retirement {
    /// Entry removed and supervisor closed.
    Retired,
    /// The name has a definition again; the supervisor keeps running.
    Declined,
    /// The entry belongs to another supervisor (or none); only closed.
    NotOwned,
}

/// Name to supervisor directory. Clones share the same map.
#[derive(Clone)]
pub struct Registry {
    supervisors: Arc<Mutex<HashMap<String, SupervisorHandle>>>,
    ctx: Arc<Context>,
}

impl Registry {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self {
            supervisors: Arc::new(Mutex::new(HashMap::new())),
            ctx,
        }
    }

    /// Make sure `definition.name` is supervised.
    ///
    /// An existing live supervisor gets a reload request and is returned.
    /// Otherwise a new one is spawned, after any closed predecessor with the
    /// same name has fully exited.
    pub async fn manage(&self, definition: ResourceDefinition) -> SupervisorHandle {
        loop {
            let stale = {
                let mut supervisors = self.supervisors.lock().await;
                match supervisors.get(&definition.name).cloned() {
                    Some(live) if !live.is_closed() => {
                        live.request_reload();
                        return live;
                    }
                    Some(stale) if !stale.has_exited() => stale,
                    _ => {
                        info!("Managing container {}", definition.name);
                        let name = definition.name.clone();
                        let handle =
                            supervisor::spawn(definition, Arc::clone(&self.ctx), self.clone());
                        supervisors.insert(name, handle.clone());
                        return handle;
                    }
                }
            };
            debug!("Waiting for previous supervisor of {} to exit", stale.name());
            stale.closed().await;
        }
    }

    pub async fn get(&self, name: &str) -> Option<SupervisorHandle> {
        self.supervisors.lock().await.get(name).cloned()
    }

    /// Names with a registered supervisor, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.supervisors.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Deregister `handle` and close it, as one step under the registry lock.
    ///
    /// The entry is only removed if it still belongs to this supervisor. If
    /// the name was defined again in the meantime the supervisor stays
    /// registered and open, since `manage` may already have handed it out.
    pub async fn retire(&self, handle: &SupervisorHandle) -> Retirement {
        let mut supervisors = self.supervisors.lock().await;
        let owned = supervisors
            .get(handle.name())
            .is_some_and(|current| current.id() == handle.id());
        if !owned {
            handle.close();
            return Retirement::NotOwned;
        }
        if self.ctx.provider.lookup(handle.name()).is_some() {
            debug!("Container {} was defined again, not retiring", handle.name());
            return Retirement::Declined;
        }
        supervisors.remove(handle.name());
        info!("Deregistered container {}", handle.name());
        handle.close();
        Retirement::Retired
    }

    /// Bring the registry in line with the provider.
    ///
    /// Every defined container gets a supervisor (or a reload on its
    /// existing one). Supervisors whose definition vanished are asked to
    /// reload too, so that they tear their container down and retire.
    pub async fn sync(&self) {
        let defined = self.ctx.provider.names();
        for name in &defined {
            if let Some(definition) = self.ctx.provider.lookup(name) {
                self.manage(definition).await;
            }
        }

        let orphans: Vec<SupervisorHandle> = self
            .supervisors
            .lock()
            .await
            .values()
            .filter(|h| !defined.iter().any(|name| name == h.name()))
            .cloned()
            .collect();
        for handle in orphans {
            debug!("Container {} is no longer defined", handle.name());
            handle.request_reload();
        }
    }

    /// Close every supervisor and wait for all of them to exit.
    pub async fn shutdown(&self) {
        let handles: Vec<SupervisorHandle> = self
            .supervisors
            .lock()
            .await
            .drain()
            .map(|(_, handle)| handle)
            .collect();

        info!("Stopping {} supervisors", handles.len());
        for handle in &handles {
            handle.close();
        }
        for handle in handles {
            handle.closed().await;
        }
    }
}
