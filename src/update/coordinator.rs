// src/update/coordinator.rs

//! Application self-update state machine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use semver::Version;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::download::Downloader;
use crate::errors::UpdateError;
use crate::events::{AppEvent, EventSink};
use crate::types::{DownloadProgress, UpdateState};
use crate::update::{Installer, ReleaseAsset, ReleaseFeed, ReleaseInfo};

/// Static inputs of the update flow.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSettings {
    pub current_version: Version,
    /// Suffix identifying the installer asset of a release (e.g. `.exe`).
    pub asset_suffix: String,
    /// Directory downloaded installers are written to.
    pub staging_dir: PathBuf,
}

/// A newer release with a usable installer asset.
#[derive(Debug, Clone, PartialEq)]
struct PendingRelease {
    version: Version,
    asset: ReleaseAsset,
}

/// Drives `Idle → Checking → Available → Downloading → Downloaded → Installing`.
///
/// Any failure moves to `Failed` and emits `update-error`; a new check is the
/// only way out of `Failed`. The "no published releases" case is not a
/// failure: it is logged and the coordinator returns to `Idle`.
pub struct UpdateCoordinator {
    feed: Arc<dyn ReleaseFeed>,
    downloader: Arc<dyn Downloader>,
    installer: Arc<dyn Installer>,
    settings: UpdateSettings,
    sink: EventSink,
    state: UpdateState,
    pending: Option<PendingRelease>,
    downloaded: Option<PathBuf>,
}

impl UpdateCoordinator {
    pub fn new(
        feed: Arc<dyn ReleaseFeed>,
        downloader: Arc<dyn Downloader>,
        installer: Arc<dyn Installer>,
        settings: UpdateSettings,
        sink: EventSink,
    ) -> Self {
        Self {
            feed,
            downloader,
            installer,
            settings,
            sink,
            state: UpdateState::Idle,
            pending: None,
            downloaded: None,
        }
    }

    pub fn state(&self) -> &UpdateState {
        &self.state
    }

    /// Ask the feed for a newer release.
    ///
    /// Returns the available version, or `None` when up to date.
    pub async fn check_for_updates(&mut self) -> Result<Option<String>, UpdateError> {
        match self.state {
            UpdateState::Idle | UpdateState::Failed(_) | UpdateState::Available(_) => {}
            _ => return Err(self.invalid("check for updates")),
        }

        self.set_state(UpdateState::Checking);
        self.pending = None;
        self.downloaded = None;

        let latest = match self.feed.latest().await {
            Ok(latest) => latest,
            Err(err) if err.is_suppressed() => {
                info!(reason = %err, "no update feed entries; staying idle");
                self.set_state(UpdateState::Idle);
                return Ok(None);
            }
            Err(err) => return Err(self.fail(err).await),
        };

        match select_update(&self.settings, latest) {
            Some(pending) => {
                let version = pending.version.to_string();
                info!(current = %self.settings.current_version, available = %version, "update available");
                self.pending = Some(pending);
                self.set_state(UpdateState::Available(version.clone()));
                self.sink
                    .emit(AppEvent::UpdateAvailable {
                        version: version.clone(),
                    })
                    .await;
                Ok(Some(version))
            }
            None => {
                info!(current = %self.settings.current_version, "application is up to date");
                self.set_state(UpdateState::Idle);
                Ok(None)
            }
        }
    }

    /// Download the installer of the available release.
    pub async fn download_update(&mut self) -> Result<PathBuf, UpdateError> {
        let pending = match (&self.state, &self.pending) {
            (UpdateState::Available(_), Some(pending)) => pending.clone(),
            _ => return Err(self.invalid("download update")),
        };

        let file_name = Path::new(&pending.asset.name)
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| format!("update-{}", pending.version).into());
        let dest = self.settings.staging_dir.join(file_name);
        let size = Some(pending.asset.size).filter(|size| *size > 0);

        self.set_state(UpdateState::Downloading(DownloadProgress::new(0, size)));

        let (progress_tx, mut progress_rx) = mpsc::channel(16);
        let downloader = Arc::clone(&self.downloader);
        let result = {
            let transfer =
                downloader.download(&pending.asset.browser_download_url, &dest, progress_tx);
            tokio::pin!(transfer);
            loop {
                tokio::select! {
                    res = &mut transfer => break res,
                    Some(progress) = progress_rx.recv() => self.on_progress(progress).await,
                }
            }
        };
        while let Ok(progress) = progress_rx.try_recv() {
            self.on_progress(progress).await;
        }

        match result {
            Ok(bytes) => {
                let version = pending.version.to_string();
                info!(version = %version, bytes, path = ?dest, "update downloaded");
                self.downloaded = Some(dest.clone());
                self.set_state(UpdateState::Downloaded(version.clone()));
                self.sink.emit(AppEvent::UpdateDownloaded { version }).await;
                Ok(dest)
            }
            Err(err) => Err(self.fail(err.into()).await),
        }
    }

    /// Launch the installer for the downloaded release.
    ///
    /// On `Ok` the installer owns the machine: the caller must terminate the
    /// host immediately.
    pub async fn install_update(&mut self) -> Result<(), UpdateError> {
        let package = match (&self.state, &self.downloaded) {
            (UpdateState::Downloaded(_), Some(package)) => package.clone(),
            _ => return Err(self.invalid("install update")),
        };

        self.set_state(UpdateState::Installing);
        match self.installer.hand_off(&package) {
            Ok(()) => {
                info!(package = ?package, "handed off to installer");
                Ok(())
            }
            Err(err) => Err(self.fail(err).await),
        }
    }

    async fn on_progress(&mut self, progress: DownloadProgress) {
        self.state = UpdateState::Downloading(progress.clone());
        self.sink.emit(AppEvent::UpdateDownloadProgress(progress)).await;
    }

    async fn fail(&mut self, err: UpdateError) -> UpdateError {
        error!(error = %err, "update failed");
        self.set_state(UpdateState::Failed(err.to_string()));
        self.sink.emit(AppEvent::UpdateError(err.to_string())).await;
        err
    }

    fn invalid(&self, operation: &'static str) -> UpdateError {
        warn!(operation, state = %self.state, "update operation rejected");
        UpdateError::InvalidState {
            operation,
            state: self.state.to_string(),
        }
    }

    fn set_state(&mut self, next: UpdateState) {
        debug!(from = %self.state, to = %next, "update state transition");
        self.state = next;
    }
}

/// Pick the release to offer, if it is newer and has an installer asset.
fn select_update(settings: &UpdateSettings, latest: Option<ReleaseInfo>) -> Option<PendingRelease> {
    let release = latest?;
    let Some(version) = release.version() else {
        warn!(tag = %release.tag_name, "ignoring release with non-semver tag");
        return None;
    };
    if version <= settings.current_version {
        return None;
    }
    let Some(asset) = release.asset_with_suffix(&settings.asset_suffix) else {
        warn!(tag = %release.tag_name, suffix = %settings.asset_suffix, "newer release has no installer asset");
        return None;
    };
    Some(PendingRelease {
        version,
        asset: asset.clone(),
    })
}
