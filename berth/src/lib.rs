//! berth - keeps docker containers converged to their declared definitions.
//!
//! Every container gets its own supervisor task. A supervisor re-checks its
//! container whenever it is asked to (reload) and once per interval as a
//! fallback, and issues the smallest set of create/start/stop/remove calls
//! that brings the container back in line with its definition.
//!
//! ## Architecture
//!
//! - **Catalog**: desired definitions, loaded from a TOML file
//! - **Runtime**: container engine operations (docker CLI)
//! - **Supervisor**: per-container trigger loop and reconcile pass
//! - **Registry**: name to supervisor mapping, one live supervisor per name

pub mod catalog;
pub mod definition;
pub mod error;
pub mod runtime;
pub mod services;
pub mod utils;

pub use catalog::{Catalog, DefinitionProvider};
pub use definition::{ContainerSpec, ResourceDefinition, VERSION_LABEL};
pub use error::{ConfigError, RuntimeError};
pub use runtime::{DockerCli, ObservedState, RuntimeClient};
pub use services::registry::{Registry, Retirement};
pub use services::supervisor::{Context, SupervisorHandle};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Configuration for berth services.
#[derive(Debug, Clone)]
pub struct Config {
    /// TOML file with the container definitions.
    pub definitions: PathBuf,
    /// Fallback reconcile period. Must be non-zero.
    pub interval: Duration,
    /// Deadline for each container engine call, `None` disables it.
    pub call_timeout: Option<Duration>,
    /// docker binary used by the default runtime.
    pub docker: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            definitions: PathBuf::from("/etc/berth/containers.toml"),
            interval: Duration::from_secs(60),
            call_timeout: Some(Duration::from_secs(120)),
            docker: PathBuf::from("docker"),
        }
    }
}

/// Running berth services.
pub struct Services {
    pub catalog: Arc<Catalog>,
    pub registry: Registry,
    definitions: PathBuf,
}

impl Services {
    /// Re-read the definitions file and resync all supervisors.
    ///
    /// A file that fails to load leaves the current definitions in place.
    pub async fn reload(&self) -> Result<(), ConfigError> {
        self.catalog.reload(&self.definitions)?;
        self.registry.sync().await;
        Ok(())
    }

    /// Close every supervisor and wait for them to exit.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}

/// Load the definitions and start a supervisor for each, using docker.
pub async fn initialize_services(config: Config) -> Result<Services, ConfigError> {
    let runtime = Arc::new(DockerCli::new(config.docker.clone()));
    initialize_services_with(config, runtime).await
}

/// Like [`initialize_services`], with a caller-provided runtime.
pub async fn initialize_services_with(
    config: Config,
    runtime: Arc<dyn RuntimeClient>,
) -> Result<Services, ConfigError> {
    info!("Initializing berth services");

    let catalog = Arc::new(Catalog::load(&config.definitions)?);
    let ctx = Arc::new(Context::new(
        runtime,
        Arc::clone(&catalog) as Arc<dyn DefinitionProvider>,
        &config,
    ));
    let registry = Registry::new(ctx);
    registry.sync().await;
    info!("Supervising {} containers", catalog.len());

    Ok(Services {
        catalog,
        registry,
        definitions: config.definitions,
    })
}
