//! Container engine interface.
//!
//! The supervisor only needs five operations from the engine. `NotFound` from
//! `inspect` must be reliably distinguishable from every other failure, it is
//! how the supervisor learns that a container has to be created.

mod docker;

pub use docker::DockerCli;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::definition::{ResourceDefinition, VERSION_LABEL};
use crate::error::Result;

/// What the engine reports about an existing container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedState {
    /// Engine-assigned id.
    pub id: String,
    pub running: bool,
    pub labels: HashMap<String, String>,
}

impl ObservedState {
    /// Version token the container was created from, if labelled.
    pub fn version(&self) -> Option<&str> {
        self.labels.get(VERSION_LABEL).map(String::as_str)
    }
}

/// Lifecycle operations against the container engine.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Look up a container by name.
    async fn inspect(&self, name: &str) -> Result<ObservedState>;

    /// Create (but do not start) a container, returning its id.
    ///
    /// The container carries the definition's version under [`VERSION_LABEL`].
    async fn create(&self, name: &str, definition: &ResourceDefinition) -> Result<String>;

    /// Start a created or stopped container.
    async fn start(&self, id: &str) -> Result<()>;

    /// Stop a running container, waiting at most `timeout` before it is killed.
    async fn stop(&self, name: &str, timeout: Option<Duration>) -> Result<()>;

    /// Remove a container. `force` also removes a running one.
    async fn remove(&self, name: &str, force: bool) -> Result<()>;
}
