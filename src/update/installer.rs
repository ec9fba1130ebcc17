// src/update/installer.rs

use std::path::Path;
use std::process::Command;

use tracing::info;

use crate::errors::UpdateError;

/// Hands a downloaded application package to the OS installer.
pub trait Installer: Send + Sync {
    /// Launch the installer for `package`.
    ///
    /// Returning `Ok` means the installer is running; the host is expected to
    /// exit right away so the installer can replace it.
    fn hand_off(&self, package: &Path) -> Result<(), UpdateError>;
}

/// Runs the package itself as an installer (e.g. an NSIS `.exe`).
#[derive(Debug, Clone, Default)]
pub struct ProcessInstaller {
    args: Vec<String>,
}

impl ProcessInstaller {
    pub fn new(args: Vec<String>) -> Self {
        Self { args }
    }
}

impl Installer for ProcessInstaller {
    fn hand_off(&self, package: &Path) -> Result<(), UpdateError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(package, std::fs::Permissions::from_mode(0o755))
                .map_err(|err| UpdateError::Install(format!("{:?}: {err}", package)))?;
        }

        // Detached: std children are not killed when the handle is dropped.
        let child = Command::new(package)
            .args(&self.args)
            .spawn()
            .map_err(|err| UpdateError::Install(format!("{:?}: {err}", package)))?;

        info!(pid = child.id(), package = ?package, "installer launched");
        Ok(())
    }
}
