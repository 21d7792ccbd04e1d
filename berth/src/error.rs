//! Error types for berth.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors reported by a [`RuntimeClient`](crate::runtime::RuntimeClient).
///
/// `NotFound` is the only variant the reconciler treats specially: it means
/// the container does not exist and drives the create path. Everything else
/// is transient and abandons the current pass.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// No container with this name or id exists.
    #[error("container not found: {0}")]
    NotFound(String),

    /// The engine rejected the operation.
    #[error("{op} failed: {message}")]
    Engine { op: &'static str, message: String },

    /// The engine CLI could not be executed at all.
    #[error("failed to execute {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The engine answered with something we could not parse.
    #[error("unexpected {op} output: {message}")]
    Parse { op: &'static str, message: String },

    /// The call did not finish within the configured deadline.
    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },
}

impl RuntimeError {
    /// True if the error reports a missing container.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound(_))
    }
}

/// Errors loading container definitions.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid container name {0:?}")]
    InvalidName(String),

    #[error("container {0:?} has no image")]
    MissingImage(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
