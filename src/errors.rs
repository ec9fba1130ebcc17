// src/errors.rs

//! Crate-wide error types.
//!
//! Each failure category of the host has its own enum so callers can react to
//! it precisely:
//! - [`ProvisionError`]: the worker artifact could not be made ready.
//! - [`LaunchError`]: the worker process could not be started.
//! - [`ProtocolDecodeError`]: one stdout line was not a valid message.
//! - [`UpdateError`]: the self-update flow failed.
//! - [`HostError`]: configuration / startup problems of the host itself.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Why the worker artifact could not be made ready.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("no package available for artifact '{0}'")]
    NotBundled(String),

    #[error("extraction failed: {0}")]
    ExtractFailed(String),

    #[error("package download failed: {0}")]
    DownloadFailed(String),

    #[error("I/O error during provisioning: {0}")]
    IoError(String),
}

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error("worker executable not found at {}", .0.display())]
    ExecutableMissing(PathBuf),

    #[error("failed to spawn worker {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
#[error("undecodable worker line {line:?}: {source}")]
pub struct ProtocolDecodeError {
    pub line: String,
    #[source]
    pub source: serde_json::Error,
}

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

#[derive(Error, Debug)]
pub enum UpdateError {
    /// The feed has no published release (or no feed endpoint at all).
    ///
    /// Expected steady state for an application without public releases;
    /// never shown to the user.
    #[error("no published releases")]
    NoPublishedReleases,

    #[error("update feed request failed: {0}")]
    Network(String),

    #[error("malformed update feed: {0}")]
    Feed(String),

    #[error("update download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("cannot {operation} while update state is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("installer hand-off failed: {0}")]
    Install(String),
}

impl UpdateError {
    /// Whether this failure is hidden from user-facing surfaces.
    pub fn is_suppressed(&self) -> bool {
        matches!(self, UpdateError::NoPublishedReleases)
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, HostError>;
