// src/artifact/provisioner.rs

//! Makes the worker artifact usable before anything tries to launch it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use crate::artifact::hash::{compute_file_hash, digest_matches};
use crate::artifact::{ArtifactDescriptor, Extractor, InstalledState, RemotePackage};
use crate::download::Downloader;
use crate::errors::{DownloadError, ProvisionError};
use crate::events::{AppEvent, EventSink};
use crate::fs::FileSystem;

/// Package chosen for an installation run.
#[derive(Debug)]
enum Package {
    /// Shipped with the application; never deleted.
    Bundled(PathBuf),
    /// Fetched for this run; removed once extracted.
    Downloaded(PathBuf),
}

impl Package {
    fn path(&self) -> &Path {
        match self {
            Package::Bundled(path) | Package::Downloaded(path) => path,
        }
    }
}

/// Owns the install directory of one artifact.
///
/// All mutation of `install_dir` goes through [`ArtifactProvisioner::ensure_ready`],
/// which is serialized by an internal guard: a caller arriving while an
/// installation is running waits for it and then re-probes, so it sees the
/// finished install instead of starting a second extraction.
pub struct ArtifactProvisioner {
    descriptor: ArtifactDescriptor,
    fs: Arc<dyn FileSystem>,
    extractor: Arc<dyn Extractor>,
    downloader: Option<Arc<dyn Downloader>>,
    download_dir: PathBuf,
    sink: EventSink,
    in_flight: Mutex<()>,
}

impl ArtifactProvisioner {
    pub fn new(
        descriptor: ArtifactDescriptor,
        fs: Arc<dyn FileSystem>,
        extractor: Arc<dyn Extractor>,
        sink: EventSink,
    ) -> Self {
        Self {
            descriptor,
            fs,
            extractor,
            downloader: None,
            download_dir: std::env::temp_dir(),
            sink,
            in_flight: Mutex::new(()),
        }
    }

    /// Enable the remote package source; downloads land in `download_dir`.
    pub fn with_downloader(
        mut self,
        downloader: Arc<dyn Downloader>,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        self.downloader = Some(downloader);
        self.download_dir = download_dir.into();
        self
    }

    pub fn descriptor(&self) -> &ArtifactDescriptor {
        &self.descriptor
    }

    /// Current on-disk state, without taking the in-flight guard.
    pub fn probe(&self) -> InstalledState {
        self.descriptor.probe(self.fs.as_ref())
    }

    /// Return the executable path, installing the artifact first if needed.
    ///
    /// A valid install returns without touching the filesystem. Otherwise a
    /// stale install is removed, a package is located (bundled, then remote),
    /// extracted and stamped with the expected version.
    pub async fn ensure_ready(&self) -> Result<PathBuf, ProvisionError> {
        let _guard = self.in_flight.lock().await;

        match self.provision().await {
            Ok(path) => {
                self.sink
                    .emit(AppEvent::BackendReady(self.descriptor.expected_version.clone()))
                    .await;
                Ok(path)
            }
            Err(err) => {
                error!(artifact = %self.descriptor.name, error = %err, "provisioning failed");
                self.sink.emit(AppEvent::BackendError(err.to_string())).await;
                Err(err)
            }
        }
    }

    async fn provision(&self) -> Result<PathBuf, ProvisionError> {
        let expected = &self.descriptor.expected_version;
        let state = self.probe_blocking().await?;

        if let (true, Some(path)) = (state.is_valid(expected), state.executable_path.clone()) {
            debug!(artifact = %self.descriptor.name, path = ?path, "artifact already installed");
            return Ok(path);
        }

        info!(
            artifact = %self.descriptor.name,
            installed = ?state.installed_version,
            expected = %expected,
            found = state.found,
            "artifact missing or outdated; installing"
        );
        self.sink
            .emit(AppEvent::BackendStatus(format!(
                "installing {} {}",
                self.descriptor.name, expected
            )))
            .await;

        if state.install_dir_present {
            self.remove_install().await;
        }

        let package = self.locate_package().await?;
        let extracted = self.extract(package.path()).await;
        if let Package::Downloaded(path) = &package {
            self.discard(path);
        }
        extracted?;

        let store = self.descriptor.version_store();
        store
            .write(self.fs.as_ref(), expected)
            .map_err(|err| ProvisionError::IoError(format!("{err:#}")))?;

        let state = self.probe_blocking().await?;
        match (state.is_valid(expected), state.executable_path) {
            (true, Some(path)) => {
                info!(artifact = %self.descriptor.name, version = %expected, path = ?path, "artifact installed");
                Ok(path)
            }
            _ => {
                if let Err(err) = store.clear(self.fs.as_ref()) {
                    warn!(path = ?store.path(), error = %err, "failed to clear version marker");
                }
                Err(ProvisionError::ExtractFailed(format!(
                    "no executable for '{}' found in {:?} after extraction",
                    self.descriptor.name, self.descriptor.install_dir
                )))
            }
        }
    }

    /// [`Self::probe`] on the blocking pool; an install tree can be large.
    async fn probe_blocking(&self) -> Result<InstalledState, ProvisionError> {
        let fs = Arc::clone(&self.fs);
        let descriptor = self.descriptor.clone();
        tokio::task::spawn_blocking(move || descriptor.probe(fs.as_ref()))
            .await
            .map_err(|err| ProvisionError::IoError(format!("probe task failed: {err}")))
    }

    /// Best-effort removal of a stale install. Never aborts provisioning.
    async fn remove_install(&self) {
        let fs = Arc::clone(&self.fs);
        let dir = self.descriptor.install_dir.clone();
        let removal = tokio::task::spawn_blocking({
            let dir = dir.clone();
            move || fs.remove_dir_all(&dir)
        })
        .await;

        match removal {
            Ok(Ok(())) => debug!(path = ?dir, "removed stale install"),
            Ok(Err(err)) => warn!(path = ?dir, error = %err, "could not remove stale install; extracting over it"),
            Err(err) => warn!(path = ?dir, error = %err, "removal task failed; extracting over it"),
        }
    }

    fn discard(&self, path: &Path) {
        if let Err(err) = self.fs.remove_file(path) {
            warn!(path = ?path, error = %err, "failed to delete downloaded package");
        }
    }

    async fn locate_package(&self) -> Result<Package, ProvisionError> {
        let source = &self.descriptor.source;

        if let Some(bundled) = &source.bundled {
            if self.fs.is_file(bundled) {
                debug!(path = ?bundled, "using bundled package");
                return Ok(Package::Bundled(bundled.clone()));
            }
            warn!(path = ?bundled, "bundled package configured but missing");
        }

        if let (Some(remote), Some(downloader)) = (&source.remote, &self.downloader) {
            return self
                .download(remote, downloader.as_ref())
                .await
                .map(Package::Downloaded);
        }

        Err(ProvisionError::NotBundled(self.descriptor.name.clone()))
    }

    async fn download(
        &self,
        remote: &RemotePackage,
        downloader: &dyn Downloader,
    ) -> Result<PathBuf, ProvisionError> {
        let dest = self.download_dir.join(format!(
            "{}-{}.zip",
            self.descriptor.name, self.descriptor.expected_version
        ));

        let (progress_tx, mut progress_rx) = mpsc::channel(16);
        let result = {
            let transfer = downloader.download(&remote.url, &dest, progress_tx);
            tokio::pin!(transfer);
            loop {
                tokio::select! {
                    res = &mut transfer => break res,
                    Some(progress) = progress_rx.recv() => {
                        self.sink.emit(AppEvent::BackendDownloadProgress(progress)).await;
                    }
                }
            }
        };
        while let Ok(progress) = progress_rx.try_recv() {
            self.sink.emit(AppEvent::BackendDownloadProgress(progress)).await;
        }

        let bytes = result.map_err(|err| ProvisionError::DownloadFailed(err.to_string()))?;
        debug!(url = %remote.url, bytes, "package downloaded");

        if let Some(expected) = &remote.checksum {
            let path = dest.clone();
            let actual = tokio::task::spawn_blocking(move || compute_file_hash(&path))
                .await
                .map_err(|err| ProvisionError::IoError(err.to_string()))?
                .map_err(|err| ProvisionError::IoError(format!("{err:#}")))?;

            if !digest_matches(expected, &actual) {
                self.discard(&dest);
                let mismatch = DownloadError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual,
                };
                return Err(ProvisionError::DownloadFailed(mismatch.to_string()));
            }
        }

        Ok(dest)
    }

    async fn extract(&self, package: &Path) -> Result<(), ProvisionError> {
        let install_dir = &self.descriptor.install_dir;
        self.fs
            .create_dir_all(install_dir)
            .map_err(|err| ProvisionError::IoError(format!("{err:#}")))?;

        self.sink.emit(AppEvent::BackendExtractStart).await;
        info!(package = ?package, dest = ?install_dir, "extracting package");

        self.extractor
            .extract(package, install_dir)
            .await
            .map_err(|err| ProvisionError::ExtractFailed(format!("{err:#}")))?;

        self.sink.emit(AppEvent::BackendExtractComplete).await;
        Ok(())
    }
}
