// src/config/model.rs

use std::path::{Path, PathBuf};

use semver::Version;
use serde::Deserialize;

use crate::artifact::{ArtifactDescriptor, PackageSource, RemotePackage};
use crate::update::UpdateSettings;

/// Configuration exactly as read from the TOML file.
///
/// ```toml
/// [artifact]
/// name = "backend"
/// version = "1.4.0"
/// install_dir = "runtime/backend"
/// executables = ["backend/backend.exe", "backend"]
/// bundled_package = "resources/backend.zip"
///
/// [update]
/// enabled = true
/// feed_url = "https://api.github.com/repos/acme/bollettini/releases/latest"
///
/// [worker]
/// captcha_dir = "."
/// ```
///
/// Only `[artifact]` is required. Use `ConfigFile::try_from` (or
/// [`crate::config::load_and_validate`]) to get a validated [`ConfigFile`].
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    pub artifact: ArtifactSection,

    #[serde(default)]
    pub update: UpdateSection,

    #[serde(default)]
    pub worker: WorkerSection,
}

/// `[artifact]` section: the worker executable and where it comes from.
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactSection {
    pub name: String,

    /// Version the host expects; compared verbatim to `version.txt`.
    pub version: String,

    /// Relative paths are resolved against the config file's directory.
    pub install_dir: PathBuf,

    /// Candidate executables relative to `install_dir`, probed in order.
    pub executables: Vec<PathBuf>,

    #[serde(default)]
    pub bundled_package: Option<PathBuf>,

    #[serde(default)]
    pub remote_url: Option<String>,

    /// BLAKE3 hex digest of the remote package.
    #[serde(default)]
    pub checksum: Option<String>,
}

/// `[update]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSection {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub feed_url: Option<String>,

    #[serde(default = "default_asset_suffix")]
    pub asset_suffix: String,

    /// Extra arguments for the installer (e.g. `["/S"]` for silent NSIS).
    #[serde(default)]
    pub installer_args: Vec<String>,

    /// Overrides the version the host reports about itself.
    #[serde(default)]
    pub current_version: Option<String>,

    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
}

fn default_asset_suffix() -> String {
    ".exe".to_string()
}

impl Default for UpdateSection {
    fn default() -> Self {
        Self {
            enabled: false,
            feed_url: None,
            asset_suffix: default_asset_suffix(),
            installer_args: Vec::new(),
            current_version: None,
            staging_dir: None,
        }
    }
}

/// `[worker]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSection {
    /// Directory challenge images are written to.
    #[serde(default = "default_captcha_dir")]
    pub captcha_dir: PathBuf,
}

fn default_captcha_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            captcha_dir: default_captcha_dir(),
        }
    }
}

/// Validated configuration.
///
/// Relative paths stay relative to `base_dir` (the config file's directory)
/// and are resolved by the accessor methods.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub artifact: ArtifactSection,
    pub update: UpdateSection,
    pub worker: WorkerSection,
    current_version: Version,
    base_dir: PathBuf,
}

impl ConfigFile {
    /// Build from already-validated parts. Used by the `TryFrom` impl.
    pub(crate) fn new_unchecked(raw: RawConfigFile, current_version: Version) -> Self {
        Self {
            artifact: raw.artifact,
            update: raw.update,
            worker: raw.worker,
            current_version,
            base_dir: PathBuf::from("."),
        }
    }

    /// Resolve relative paths against `dir` from now on.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn current_version(&self) -> &Version {
        &self.current_version
    }

    pub fn captcha_dir(&self) -> PathBuf {
        self.resolve(&self.worker.captcha_dir)
    }

    pub fn staging_dir(&self) -> PathBuf {
        let dir = self
            .update
            .staging_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("updates"));
        self.resolve(&dir)
    }

    /// The single artifact description used by provisioning.
    pub fn artifact_descriptor(&self) -> ArtifactDescriptor {
        let artifact = &self.artifact;
        ArtifactDescriptor {
            name: artifact.name.clone(),
            expected_version: artifact.version.clone(),
            install_dir: self.resolve(&artifact.install_dir),
            candidate_executables: artifact.executables.clone(),
            source: PackageSource {
                bundled: artifact.bundled_package.as_deref().map(|p| self.resolve(p)),
                remote: artifact.remote_url.clone().map(|url| RemotePackage {
                    url,
                    checksum: artifact.checksum.clone(),
                }),
            },
        }
    }

    pub fn update_settings(&self) -> UpdateSettings {
        UpdateSettings {
            current_version: self.current_version.clone(),
            asset_suffix: self.update.asset_suffix.clone(),
            staging_dir: self.staging_dir(),
        }
    }
}
