// src/artifact/extract.rs

//! Pluggable archive extraction.
//!
//! The provisioner talks to an `Extractor` instead of unpacking archives
//! itself, so tests can swap in a fake that records calls and writes into a
//! mock filesystem.

use std::fs::{self, File};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use anyhow::{Context, Result};
use tracing::{debug, warn};
use zip::ZipArchive;

/// Unpacks a package archive into a directory.
pub trait Extractor: Send + Sync {
    /// Extract `package` into `dest`, overwriting files that already exist.
    fn extract<'a>(
        &'a self,
        package: &'a Path,
        dest: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Zip extractor used in production.
///
/// Runs on the blocking thread pool. Every entry is written to a hidden
/// sibling and renamed over its final name, so a file in `dest` is always
/// either the old or the complete new version.
#[derive(Debug, Clone, Default)]
pub struct ZipExtractor;

impl Extractor for ZipExtractor {
    fn extract<'a>(
        &'a self,
        package: &'a Path,
        dest: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        let package = package.to_path_buf();
        let dest = dest.to_path_buf();

        Box::pin(async move {
            let entries = tokio::task::spawn_blocking(move || extract_zip(&package, &dest))
                .await
                .context("extraction task panicked")??;
            debug!(entries, "zip extraction finished");
            Ok(())
        })
    }
}

fn extract_zip(package: &Path, dest: &Path) -> Result<usize> {
    let file = File::open(package).with_context(|| format!("opening package {:?}", package))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("reading zip archive {:?}", package))?;

    let mut written = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            warn!(index = i, name = entry.name(), "skipping archive entry with unsafe path");
            continue;
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target).with_context(|| format!("creating dir {:?}", target))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating dir {:?}", parent))?;
        }

        let staging = staging_path(&target);
        {
            let mut out =
                File::create(&staging).with_context(|| format!("creating {:?}", staging))?;
            io::copy(&mut entry, &mut out).with_context(|| format!("writing {:?}", staging))?;
            out.sync_all()?;
        }

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&staging, fs::Permissions::from_mode(mode & 0o7777))?;
        }

        fs::rename(&staging, &target)
            .with_context(|| format!("moving {:?} into place", target))?;
        written += 1;
    }

    Ok(written)
}

fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.partial"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_zip(path: &Path) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.add_directory("backend/", SimpleFileOptions::default()).unwrap();
        zip.start_file(
            "backend/backend",
            SimpleFileOptions::default().unix_permissions(0o755),
        )
        .unwrap();
        zip.write_all(b"#!/bin/sh\n").unwrap();
        zip.start_file("backend/data.txt", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"data").unwrap();
        zip.finish().unwrap();
    }

    #[tokio::test]
    async fn extracts_entries_and_overwrites_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let package = dir.path().join("backend.zip");
        build_zip(&package);

        let dest = dir.path().join("install");
        fs::create_dir_all(dest.join("backend")).unwrap();
        fs::write(dest.join("backend/data.txt"), b"stale").unwrap();

        ZipExtractor.extract(&package, &dest).await.unwrap();

        assert_eq!(fs::read(dest.join("backend/data.txt")).unwrap(), b"data");
        assert!(dest.join("backend/backend").is_file());
        assert!(!dest.join("backend/.data.txt.partial").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(dest.join("backend/backend")).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[tokio::test]
    async fn corrupt_archive_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let package = dir.path().join("broken.zip");
        fs::write(&package, b"not a zip").unwrap();

        let result = ZipExtractor.extract(&package, &dir.path().join("out")).await;
        assert!(result.is_err());
    }
}
