// src/artifact/version_store.rs

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use crate::fs::FileSystem;

/// Name of the version marker inside the install directory.
pub const VERSION_FILE: &str = "version.txt";

/// Reads and writes `<install_dir>/version.txt`.
///
/// The marker holds the installed version string verbatim; surrounding
/// whitespace is ignored when reading, nothing else is normalised.
#[derive(Debug, Clone)]
pub struct VersionStore {
    marker: PathBuf,
}

impl VersionStore {
    pub fn new(install_dir: &Path) -> Self {
        Self {
            marker: install_dir.join(VERSION_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.marker
    }

    /// Installed version, or `None` if the marker is missing, unreadable or
    /// blank.
    pub fn read(&self, fs: &dyn FileSystem) -> Option<String> {
        match fs.read_to_string(&self.marker) {
            Ok(contents) => {
                let version = contents.trim();
                (!version.is_empty()).then(|| version.to_string())
            }
            Err(err) => {
                debug!(path = ?self.marker, error = %err, "no readable version marker");
                None
            }
        }
    }

    /// Replace the marker with `version`.
    ///
    /// The new contents go to a temporary sibling first and are renamed into
    /// place, so the marker is either the old or the new version, never a
    /// torn write.
    pub fn write(&self, fs: &dyn FileSystem, version: &str) -> Result<()> {
        let staging = self.marker.with_extension("txt.tmp");
        fs.write(&staging, version.as_bytes())?;
        fs.rename(&staging, &self.marker)
    }

    /// Remove the marker if present.
    pub fn clear(&self, fs: &dyn FileSystem) -> Result<()> {
        if fs.is_file(&self.marker) {
            fs.remove_file(&self.marker)?;
        }
        Ok(())
    }
}
