//! Runtime client that drives the docker CLI.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{ObservedState, RuntimeClient};
use crate::definition::ResourceDefinition;
use crate::error::{Result, RuntimeError};

/// stderr fragments docker prints for a missing container.
const NOT_FOUND_MARKERS: &[&str] = &["No such container", "No such object"];

/// Runtime client backed by the `docker` binary.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: PathBuf,
}

impl DockerCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run one docker command, returning its stdout.
    ///
    /// `target` is the container the command addresses, reported in
    /// [`RuntimeError::NotFound`].
    async fn run(&self, op: &'static str, target: &str, args: &[String]) -> Result<String> {
        debug!("Executing {} {}", self.program.display(), args.join(" "));

        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| RuntimeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            if NOT_FOUND_MARKERS.iter().any(|m| stderr.contains(m)) {
                return Err(RuntimeError::NotFound(target.to_string()));
            }
            return Err(RuntimeError::Engine {
                op,
                message: format!("docker exited with {}: {}", output.status, stderr),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

#[async_trait]
impl RuntimeClient for DockerCli {
    async fn inspect(&self, name: &str) -> Result<ObservedState> {
        let stdout = self
            .run("inspect", name, &args(&["container", "inspect", name]))
            .await?;
        parse_inspect(name, &stdout)
    }

    async fn create(&self, name: &str, definition: &ResourceDefinition) -> Result<String> {
        let stdout = self
            .run("create", name, &create_args(name, definition))
            .await?;
        let id = stdout.trim();
        if id.is_empty() {
            return Err(RuntimeError::Parse {
                op: "create",
                message: "no container id on stdout".to_string(),
            });
        }
        Ok(id.to_string())
    }

    async fn start(&self, id: &str) -> Result<()> {
        self.run("start", id, &args(&["container", "start", id]))
            .await
            .map(drop)
    }

    async fn stop(&self, name: &str, timeout: Option<Duration>) -> Result<()> {
        self.run("stop", name, &stop_args(name, timeout))
            .await
            .map(drop)
    }

    async fn remove(&self, name: &str, force: bool) -> Result<()> {
        let mut argv = args(&["container", "rm"]);
        if force {
            argv.push("--force".to_string());
        }
        argv.push(name.to_string());
        self.run("remove", name, &argv).await.map(drop)
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Arguments for `docker container create`.
fn create_args(name: &str, definition: &ResourceDefinition) -> Vec<String> {
    let spec = &definition.spec;
    let mut argv = args(&["container", "create", "--name", name]);

    for (key, value) in spec.labels_with_version(&definition.version) {
        argv.push("--label".to_string());
        argv.push(format!("{key}={value}"));
    }
    for (key, value) in &spec.env {
        argv.push("--env".to_string());
        argv.push(format!("{key}={value}"));
    }
    for port in &spec.ports {
        argv.push("--publish".to_string());
        argv.push(port.clone());
    }
    for volume in &spec.volumes {
        argv.push("--volume".to_string());
        argv.push(volume.clone());
    }
    for (flag, value) in [
        ("--network", &spec.network),
        ("--restart", &spec.restart),
        ("--user", &spec.user),
        ("--workdir", &spec.workdir),
    ] {
        if let Some(value) = value {
            argv.push(flag.to_string());
            argv.push(value.clone());
        }
    }
    if let Some(secs) = spec.stop_timeout {
        argv.push("--stop-timeout".to_string());
        argv.push(secs.to_string());
    }

    argv.push(spec.image.clone());
    argv.extend(spec.command.iter().cloned());
    argv
}

fn stop_args(name: &str, timeout: Option<Duration>) -> Vec<String> {
    let mut argv = args(&["container", "stop"]);
    if let Some(timeout) = timeout {
        argv.push("-t".to_string());
        argv.push(timeout.as_secs().to_string());
    }
    argv.push(name.to_string());
    argv
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectEntry {
    id: String,
    state: InspectState,
    config: InspectConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    running: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
}

fn parse_inspect(name: &str, stdout: &str) -> Result<ObservedState> {
    let entries: Vec<InspectEntry> =
        serde_json::from_str(stdout).map_err(|e| RuntimeError::Parse {
            op: "inspect",
            message: e.to_string(),
        })?;

    if entries.len() > 1 {
        warn!("docker inspect {} returned {} containers", name, entries.len());
    }
    let entry = entries
        .into_iter()
        .next()
        .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;

    Ok(ObservedState {
        id: entry.id,
        running: entry.state.running,
        labels: entry.config.labels.unwrap_or_default(),
    })
}
