#![allow(dead_code)]

use std::path::PathBuf;

use bollettino_host::artifact::{ArtifactDescriptor, PackageSource, RemotePackage};
use bollettino_host::config::{
    ArtifactSection, ConfigFile, RawConfigFile, UpdateSection, WorkerSection,
};
use bollettino_host::update::{ReleaseAsset, ReleaseInfo};

/// Builder for `ArtifactDescriptor`.
///
/// Defaults: artifact `backend` version `1.4.0` in `install/`, executable
/// `backend.exe`, bundled package `resources/backend.zip`.
pub struct DescriptorBuilder {
    descriptor: ArtifactDescriptor,
}

impl DescriptorBuilder {
    pub fn new() -> Self {
        Self {
            descriptor: ArtifactDescriptor {
                name: "backend".to_string(),
                expected_version: "1.4.0".to_string(),
                install_dir: PathBuf::from("install"),
                candidate_executables: vec![PathBuf::from("backend.exe")],
                source: PackageSource {
                    bundled: Some(PathBuf::from("resources/backend.zip")),
                    remote: None,
                },
            },
        }
    }

    pub fn version(mut self, version: &str) -> Self {
        self.descriptor.expected_version = version.to_string();
        self
    }

    pub fn install_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.descriptor.install_dir = dir.into();
        self
    }

    /// Replace the candidate list with a single executable.
    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.descriptor.candidate_executables = vec![path.into()];
        self
    }

    pub fn bundled(mut self, path: impl Into<PathBuf>) -> Self {
        self.descriptor.source.bundled = Some(path.into());
        self
    }

    pub fn no_bundled(mut self) -> Self {
        self.descriptor.source.bundled = None;
        self
    }

    pub fn remote(mut self, url: &str, checksum: Option<&str>) -> Self {
        self.descriptor.source.remote = Some(RemotePackage {
            url: url.to_string(),
            checksum: checksum.map(str::to_string),
        });
        self
    }

    pub fn build(self) -> ArtifactDescriptor {
        self.descriptor
    }
}

impl Default for DescriptorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                artifact: ArtifactSection {
                    name: "backend".to_string(),
                    version: "1.4.0".to_string(),
                    install_dir: PathBuf::from("runtime/backend"),
                    executables: vec![PathBuf::from("backend.exe")],
                    bundled_package: None,
                    remote_url: None,
                    checksum: None,
                },
                update: UpdateSection::default(),
                worker: WorkerSection::default(),
            },
        }
    }

    pub fn with_executable(mut self, path: &str) -> Self {
        self.config.artifact.executables.push(PathBuf::from(path));
        self
    }

    pub fn with_bundled_package(mut self, path: &str) -> Self {
        self.config.artifact.bundled_package = Some(PathBuf::from(path));
        self
    }

    pub fn with_updates(mut self, feed_url: &str, current_version: &str) -> Self {
        self.config.update.enabled = true;
        self.config.update.feed_url = Some(feed_url.to_string());
        self.config.update.current_version = Some(current_version.to_string());
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A release with one asset per name; URLs are derived from the names.
pub fn release(tag: &str, assets: &[&str]) -> ReleaseInfo {
    ReleaseInfo {
        tag_name: tag.to_string(),
        name: None,
        assets: assets
            .iter()
            .map(|name| ReleaseAsset {
                name: name.to_string(),
                browser_download_url: format!("https://downloads.example.org/{tag}/{name}"),
                size: 1024,
            })
            .collect(),
    }
}
