// src/config/validate.rs

use std::path::{Component, Path};

use semver::Version;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{HostError, Result};
use crate::update::parse_version;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::HostError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;
        let current_version = current_version(&raw)?;
        Ok(ConfigFile::new_unchecked(raw, current_version))
    }
}

/// Check every section of a raw config.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_artifact(cfg)?;
    validate_update(cfg)?;
    Ok(())
}

fn config_error(msg: impl Into<String>) -> HostError {
    HostError::ConfigError(msg.into())
}

fn validate_artifact(cfg: &RawConfigFile) -> Result<()> {
    let artifact = &cfg.artifact;

    if artifact.name.trim().is_empty() {
        return Err(config_error("[artifact].name must not be empty"));
    }
    if artifact.version.trim().is_empty() {
        return Err(config_error("[artifact].version must not be empty"));
    }
    if artifact.executables.is_empty() {
        return Err(config_error(
            "[artifact].executables must list at least one candidate path",
        ));
    }
    for exe in &artifact.executables {
        if !is_plain_relative(exe) {
            return Err(config_error(format!(
                "[artifact].executables entry {:?} must be a relative path inside install_dir",
                exe
            )));
        }
    }

    if let Some(checksum) = &artifact.checksum {
        if artifact.remote_url.is_none() {
            return Err(config_error(
                "[artifact].checksum requires [artifact].remote_url",
            ));
        }
        if checksum.len() != 64 || !checksum.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(config_error(format!(
                "[artifact].checksum must be a 64-character BLAKE3 hex digest (got {:?})",
                checksum
            )));
        }
    }

    if let Some(url) = &artifact.remote_url {
        if !is_http_url(url) {
            return Err(config_error(format!(
                "[artifact].remote_url must be an http(s) URL (got {:?})",
                url
            )));
        }
    }

    Ok(())
}

fn validate_update(cfg: &RawConfigFile) -> Result<()> {
    let update = &cfg.update;

    if update.enabled {
        match &update.feed_url {
            Some(url) if is_http_url(url) => {}
            Some(url) => {
                return Err(config_error(format!(
                    "[update].feed_url must be an http(s) URL (got {:?})",
                    url
                )));
            }
            None => {
                return Err(config_error(
                    "[update].feed_url is required when [update].enabled = true",
                ));
            }
        }
    }

    if update.asset_suffix.trim().is_empty() {
        return Err(config_error("[update].asset_suffix must not be empty"));
    }

    if let Some(version) = &update.current_version {
        if parse_version(version).is_none() {
            return Err(config_error(format!(
                "[update].current_version {:?} is not a semantic version",
                version
            )));
        }
    }

    Ok(())
}

fn current_version(cfg: &RawConfigFile) -> Result<Version> {
    let text = cfg
        .update
        .current_version
        .as_deref()
        .unwrap_or(env!("CARGO_PKG_VERSION"));
    parse_version(text)
        .ok_or_else(|| config_error(format!("invalid application version {:?}", text)))
}

fn is_plain_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_relative_paths() {
        assert!(is_plain_relative(Path::new("backend/backend.exe")));
        assert!(is_plain_relative(Path::new("./backend")));
        assert!(!is_plain_relative(Path::new("../backend")));
        assert!(!is_plain_relative(Path::new("/usr/bin/backend")));
        assert!(!is_plain_relative(Path::new("")));
    }
}
