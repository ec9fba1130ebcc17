// src/artifact/mod.rs

//! Worker artifact provisioning.
//!
//! - [`ArtifactDescriptor`] says which artifact/version the host needs and
//!   where it lives.
//! - [`version_store`] owns the `version.txt` marker.
//! - [`extract`] unpacks a package archive into the install directory.
//! - [`hash`] verifies downloaded packages.
//! - [`provisioner`] ties it together behind `ensure_ready()`.

pub mod extract;
pub mod hash;
pub mod provisioner;
pub mod version_store;

use std::path::PathBuf;

use crate::fs::FileSystem;

pub use extract::{Extractor, ZipExtractor};
pub use provisioner::ArtifactProvisioner;
pub use version_store::{VERSION_FILE, VersionStore};

/// Everything needed to decide whether the worker artifact is usable.
///
/// Built once from configuration; the same value drives development and
/// packaged builds.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactDescriptor {
    pub name: String,
    /// Compared to the installed marker by exact string equality.
    ///
    /// Whitespace around the marker contents (a trailing newline left by an
    /// editor, `\r\n` endings) is trimmed before comparing; nothing else is
    /// normalised, so `v1.4.0` never matches `1.4.0`.
    pub expected_version: String,
    pub install_dir: PathBuf,
    /// Relative paths under `install_dir`, probed in order.
    pub candidate_executables: Vec<PathBuf>,
    pub source: PackageSource,
}

/// Where a fresh package comes from when the install is not valid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageSource {
    /// Package shipped next to the application.
    pub bundled: Option<PathBuf>,
    /// Package fetched over the network when nothing is bundled.
    pub remote: Option<RemotePackage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemotePackage {
    pub url: String,
    /// Lowercase hex BLAKE3 digest of the package, if known.
    pub checksum: Option<String>,
}

/// What is currently on disk for an artifact.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstalledState {
    pub found: bool,
    pub executable_path: Option<PathBuf>,
    pub installed_version: Option<String>,
    /// Whether `install_dir` exists at all.
    pub install_dir_present: bool,
}

impl InstalledState {
    pub fn is_valid(&self, expected_version: &str) -> bool {
        self.found && self.installed_version.as_deref() == Some(expected_version)
    }
}

impl ArtifactDescriptor {
    pub fn version_store(&self) -> VersionStore {
        VersionStore::new(&self.install_dir)
    }

    /// Inspect the install directory without modifying it.
    pub fn probe(&self, fs: &dyn FileSystem) -> InstalledState {
        let executable_path = self
            .candidate_executables
            .iter()
            .map(|candidate| self.install_dir.join(candidate))
            .find(|path| fs.is_file(path));

        InstalledState {
            found: executable_path.is_some(),
            executable_path,
            installed_version: self.version_store().read(fs),
            install_dir_present: fs.exists(&self.install_dir),
        }
    }
}
