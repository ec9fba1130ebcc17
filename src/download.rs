// src/download.rs

//! Streaming HTTP downloads with progress reporting.
//!
//! Used by remote artifact provisioning and by the update coordinator. Bytes
//! are streamed into a temporary file next to the destination and only
//! renamed into place once the transfer completed; dropping the future
//! mid-transfer deletes the partial file.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::errors::DownloadError;
use crate::types::DownloadProgress;

/// Fetches a URL into a local file.
pub trait Downloader: Send + Sync {
    /// Download `url` to `dest`, sending progress as bytes arrive.
    ///
    /// Returns the number of bytes written.
    fn download<'a>(
        &'a self,
        url: &'a str,
        dest: &'a Path,
        progress: mpsc::Sender<DownloadProgress>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, DownloadError>> + Send + 'a>>;
}

/// `reqwest`-based downloader used in production.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Client with a product user agent (GitHub rejects anonymous agents).
    pub fn with_user_agent(user_agent: &str) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self::new(client))
    }
}

impl Downloader for HttpDownloader {
    fn download<'a>(
        &'a self,
        url: &'a str,
        dest: &'a Path,
        progress: mpsc::Sender<DownloadProgress>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, DownloadError>> + Send + 'a>> {
        Box::pin(async move {
            info!(%url, dest = ?dest, "starting download");

            let response = self.client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(DownloadError::Status(status.as_u16()));
            }
            let total = response.content_length();

            let dir = match dest.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => std::env::current_dir()?,
            };
            tokio::fs::create_dir_all(&dir).await?;

            // Deleted on drop unless persisted below.
            let (file, temp_path) = tempfile::Builder::new()
                .prefix(".download-")
                .tempfile_in(&dir)?
                .into_parts();
            let mut file = tokio::fs::File::from_std(file);

            let mut stream = response.bytes_stream();
            let mut transferred = 0u64;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                transferred += chunk.len() as u64;
                // Progress is advisory; a slow consumer must not stall the transfer.
                let _ = progress.try_send(DownloadProgress::new(transferred, total));
            }
            file.sync_all().await?;
            drop(file);

            temp_path
                .persist(dest)
                .map_err(|err| DownloadError::Io(err.error))?;
            let _ = progress.send(DownloadProgress::complete(transferred)).await;

            debug!(%url, bytes = transferred, "download complete");
            Ok(transferred)
        })
    }
}
