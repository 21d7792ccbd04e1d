//! berth daemon.
//!
//! Supervises every container in the definitions file:
//! - SIGHUP re-reads the file and resyncs supervisors
//! - SIGINT/SIGTERM stops all supervisors and exits
//!
//! Containers are left running on exit; only removed definitions tear
//! containers down.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use berth::utils::signals::{SignalAction, SignalListener};
use berth::{Config, initialize_services};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Keep docker containers converged to their definitions
#[derive(Parser, Debug)]
#[command(name = "berth", version, about)]
struct Args {
    /// Container definitions file (TOML)
    #[arg(long, default_value = "/etc/berth/containers.toml")]
    definitions: PathBuf,

    /// Fallback reconcile interval in seconds
    #[arg(long, default_value = "60", value_parser = clap::value_parser!(u64).range(1..))]
    interval: u64,

    /// Deadline for each docker call in seconds (0 disables)
    #[arg(long, default_value = "120")]
    call_timeout: u64,

    /// docker binary
    #[arg(long, default_value = "docker")]
    docker: PathBuf,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Config {
            definitions: args.definitions,
            interval: Duration::from_secs(args.interval),
            call_timeout: (args.call_timeout > 0).then(|| Duration::from_secs(args.call_timeout)),
            docker: args.docker,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "berth=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config: Config = Args::parse().into();
    info!("Starting berth");
    info!("Definitions: {}", config.definitions.display());

    let mut signals = SignalListener::install().context("Failed to install signal handlers")?;
    let services = initialize_services(config)
        .await
        .context("Failed to load container definitions")?;

    loop {
        match signals.next().await {
            SignalAction::Reload => {
                info!("Reloading container definitions");
                if let Err(e) = services.reload().await {
                    error!("Reload failed, keeping current definitions: {}", e);
                }
            }
            SignalAction::Shutdown => break,
        }
    }

    services.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}
