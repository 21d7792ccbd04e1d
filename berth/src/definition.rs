//! Container definitions: the desired state a supervisor converges to.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Label carrying the version token a container was created from.
pub const VERSION_LABEL: &str = "berth.container-version";

/// Parameters needed to create a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSpec {
    pub image: String,
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    /// Publish specs, `host:container[/proto]`.
    pub ports: Vec<String>,
    /// Bind or volume mounts, `src:dst[:mode]`.
    pub volumes: Vec<String>,
    pub network: Option<String>,
    pub restart: Option<String>,
    pub user: Option<String>,
    pub workdir: Option<String>,
    /// Seconds the engine waits before killing the container on stop.
    pub stop_timeout: Option<u32>,
}

impl ContainerSpec {
    /// Derive a version token from the spec content: SHA-256 over the
    /// JSON encoding, first 16 hex characters.
    ///
    /// Maps are ordered, so equal specs produce equal tokens and any field
    /// change produces a new one.
    pub fn content_version(&self) -> String {
        let mut hasher = Sha256::new();
        match serde_json::to_vec(self) {
            Ok(encoded) => hasher.update(&encoded),
            // Only string keys and plain values; encoding cannot fail.
            Err(_) => hasher.update(format!("{self:?}")),
        }
        hasher.finalize()[..8]
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    /// Labels to set on the created container, including the version label.
    pub fn labels_with_version(&self, version: &str) -> BTreeMap<String, String> {
        let mut labels = self.labels.clone();
        labels.insert(VERSION_LABEL.to_string(), version.to_string());
        labels
    }
}

/// A named container definition with its version token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDefinition {
    pub name: String,
    pub version: String,
    pub spec: ContainerSpec,
}

impl ResourceDefinition {
    /// Build a definition whose version is derived from the spec content.
    pub fn new(name: impl Into<String>, spec: ContainerSpec) -> Self {
        let version = spec.content_version();
        Self {
            name: name.into(),
            version,
            spec,
        }
    }

    /// Build a definition with an explicit version token.
    pub fn with_version(
        name: impl Into<String>,
        version: impl Into<String>,
        spec: ContainerSpec,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            spec,
        }
    }
}
