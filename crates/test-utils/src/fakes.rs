use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bollettino_host::artifact::Extractor;
use bollettino_host::download::Downloader;
use bollettino_host::errors::{DownloadError, UpdateError};
use bollettino_host::fs::mock::MockFileSystem;
use bollettino_host::types::DownloadProgress;
use bollettino_host::update::{Installer, ReleaseFeed, ReleaseInfo};
use tokio::sync::mpsc;

/// A fake extractor that:
/// - records how many extractions ran, and how many overlapped
/// - writes a fixed set of files under the destination in a mock filesystem
/// - optionally sleeps or fails
#[derive(Debug, Clone)]
pub struct FakeExtractor {
    fs: MockFileSystem,
    files: Vec<PathBuf>,
    delay: Duration,
    failure: Option<String>,
    calls: Arc<AtomicUsize>,
    running: Arc<AtomicUsize>,
    max_running: Arc<AtomicUsize>,
}

impl FakeExtractor {
    /// Extracts `backend.exe` into the destination.
    pub fn new(fs: MockFileSystem) -> Self {
        Self {
            fs,
            files: vec![PathBuf::from("backend.exe")],
            delay: Duration::ZERO,
            failure: None,
            calls: Arc::new(AtomicUsize::new(0)),
            running: Arc::new(AtomicUsize::new(0)),
            max_running: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_files(mut self, files: &[&str]) -> Self {
        self.files = files.iter().map(PathBuf::from).collect();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self, reason: &str) -> Self {
        self.failure = Some(reason.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of extractions observed running at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

impl Extractor for FakeExtractor {
    fn extract<'a>(
        &'a self,
        _package: &'a Path,
        dest: &'a Path,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let result = match &self.failure {
                Some(reason) => Err(anyhow::anyhow!("{reason}")),
                None => {
                    for file in &self.files {
                        self.fs.add_file(dest.join(file), b"fake binary".to_vec());
                    }
                    Ok(())
                }
            };

            self.running.fetch_sub(1, Ordering::SeqCst);
            result
        })
    }
}

/// A fake downloader that serves a fixed body in a few progress steps.
///
/// With a mock filesystem the body is stored there; otherwise it is written
/// to the real destination path.
#[derive(Debug, Clone)]
pub struct FakeDownloader {
    fs: Option<MockFileSystem>,
    body: Vec<u8>,
    steps: u64,
    fail_status: Option<u16>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeDownloader {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            fs: None,
            body: body.into(),
            steps: 4,
            fail_status: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn into_mock(mut self, fs: MockFileSystem) -> Self {
        self.fs = Some(fs);
        self
    }

    pub fn failing_with_status(mut self, status: u16) -> Self {
        self.fail_status = Some(status);
        self
    }

    /// URLs requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl Downloader for FakeDownloader {
    fn download<'a>(
        &'a self,
        url: &'a str,
        dest: &'a Path,
        progress: mpsc::Sender<DownloadProgress>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, DownloadError>> + Send + 'a>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(url.to_string());

            if let Some(status) = self.fail_status {
                return Err(DownloadError::Status(status));
            }

            let total = self.body.len() as u64;
            for step in 1..=self.steps {
                let _ = progress
                    .send(DownloadProgress::new(total * step / self.steps, Some(total)))
                    .await;
            }

            match &self.fs {
                Some(fs) => fs.add_file(dest, self.body.clone()),
                None => {
                    if let Some(parent) = dest.parent() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                    tokio::fs::write(dest, &self.body).await?;
                }
            }
            Ok(total)
        })
    }
}

/// Scripted feed answer.
#[derive(Debug, Clone)]
pub enum FeedReply {
    Release(ReleaseInfo),
    /// The feed exists but lists nothing.
    Empty,
    /// The feed endpoint does not exist (HTTP 404).
    NotPublished,
    NetworkDown,
}

/// A fake release feed returning a configurable reply.
#[derive(Debug, Clone)]
pub struct FakeFeed {
    reply: Arc<Mutex<FeedReply>>,
    calls: Arc<AtomicUsize>,
}

impl FakeFeed {
    pub fn new(reply: FeedReply) -> Self {
        Self {
            reply: Arc::new(Mutex::new(reply)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_reply(&self, reply: FeedReply) {
        *self.reply.lock().unwrap() = reply;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ReleaseFeed for FakeFeed {
    fn latest(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ReleaseInfo>, UpdateError>> + Send + '_>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.reply.lock().unwrap().clone();

        Box::pin(async move {
            match reply {
                FeedReply::Release(release) => Ok(Some(release)),
                FeedReply::Empty => Ok(None),
                FeedReply::NotPublished => Err(UpdateError::NoPublishedReleases),
                FeedReply::NetworkDown => {
                    Err(UpdateError::Network("connection refused".to_string()))
                }
            }
        })
    }
}

/// An installer that records hand-offs instead of launching anything.
#[derive(Debug, Clone, Default)]
pub struct RecordingInstaller {
    handed_off: Arc<Mutex<Vec<PathBuf>>>,
    fail: bool,
}

impl RecordingInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn handed_off(&self) -> Vec<PathBuf> {
        self.handed_off.lock().unwrap().clone()
    }
}

impl Installer for RecordingInstaller {
    fn hand_off(&self, package: &Path) -> Result<(), UpdateError> {
        if self.fail {
            return Err(UpdateError::Install("installer refused to start".to_string()));
        }
        self.handed_off.lock().unwrap().push(package.to_path_buf());
        Ok(())
    }
}
