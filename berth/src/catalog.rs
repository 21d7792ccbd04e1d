//! Desired-state provider backed by a TOML definitions file.
//!
//! ```toml
//! [containers.web]
//! image = "nginx:1.25"
//! ports = ["8080:80"]
//! restart = "unless-stopped"
//!
//! [containers.worker]
//! image = "example/worker:3"
//! command = ["worker", "--queue", "default"]
//! env = { RUST_LOG = "info" }
//! version = "2024-06-01"
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use serde::Deserialize;
use tracing::info;

use crate::definition::{ContainerSpec, ResourceDefinition};
use crate::error::ConfigError;

/// Looks up the desired definition of a container by name.
pub trait DefinitionProvider: Send + Sync {
    /// Current definition, or `None` if the container is no longer wanted.
    fn lookup(&self, name: &str) -> Option<ResourceDefinition>;

    /// Names of all defined containers.
    fn names(&self) -> Vec<String>;
}

#[derive(Debug, Deserialize)]
struct DefinitionsFile {
    #[serde(default)]
    containers: BTreeMap<String, DefinitionEntry>,
}

#[derive(Debug, Deserialize)]
struct DefinitionEntry {
    version: Option<String>,
    #[serde(flatten)]
    spec: ContainerSpec,
}

/// In-memory set of definitions, safe to share between supervisors.
#[derive(Debug, Default)]
pub struct Catalog {
    definitions: RwLock<BTreeMap<String, ResourceDefinition>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a catalog from a definitions file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let catalog = Self::new();
        catalog.reload(path)?;
        Ok(catalog)
    }

    /// Replace the contents with a fresh read of `path`.
    ///
    /// On error the previous contents stay in place.
    pub fn reload(&self, path: &Path) -> Result<usize, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let definitions = parse_definitions(path, &raw)?;

        let count = definitions.len();
        self.replace(definitions);
        info!("Loaded {} container definitions from {}", count, path.display());
        Ok(count)
    }

    pub fn insert(&self, definition: ResourceDefinition) {
        self.write().insert(definition.name.clone(), definition);
    }

    pub fn remove(&self, name: &str) -> Option<ResourceDefinition> {
        self.write().remove(name)
    }

    /// Swap the whole set of definitions.
    pub fn replace(&self, definitions: impl IntoIterator<Item = ResourceDefinition>) {
        let definitions = definitions
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();
        *self.write() = definitions;
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, ResourceDefinition>> {
        self.definitions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, ResourceDefinition>> {
        self.definitions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl DefinitionProvider for Catalog {
    fn lookup(&self, name: &str) -> Option<ResourceDefinition> {
        self.read().get(name).cloned()
    }

    fn names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }
}

fn parse_definitions(path: &Path, raw: &str) -> Result<Vec<ResourceDefinition>, ConfigError> {
    let file: DefinitionsFile = toml::from_str(raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    file.containers
        .into_iter()
        .map(|(name, entry)| {
            if !is_valid_name(&name) {
                return Err(ConfigError::InvalidName(name));
            }
            if entry.spec.image.is_empty() {
                return Err(ConfigError::MissingImage(name));
            }
            Ok(match entry.version {
                Some(version) => ResourceDefinition::with_version(name, version, entry.spec),
                None => ResourceDefinition::new(name, entry.spec),
            })
        })
        .collect()
}

/// Docker container names: `[a-zA-Z0-9][a-zA-Z0-9_.-]*`.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}
