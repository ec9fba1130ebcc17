// tests/config_loading.rs

mod common;

use std::fs;
use std::path::{Path, PathBuf};

use bollettino_host::config::{ConfigFile, load_and_validate};
use bollettino_host::errors::HostError;
use common::*;
use semver::Version;
use tempfile::TempDir;

fn write_config(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("Bollettino.toml");
    fs::write(&path, contents).unwrap();
    path
}

const FULL: &str = r#"
[artifact]
name = "backend"
version = "1.4.0"
install_dir = "runtime/backend"
executables = ["backend.exe", "backend"]
bundled_package = "resources/backend.zip"

[update]
enabled = true
feed_url = "https://api.github.com/repos/acme/bollettini/releases/latest"
installer_args = ["/S"]
current_version = "1.2.0"

[worker]
captcha_dir = "tmp"
"#;

#[test]
fn relative_paths_resolve_against_config_dir() {
    let dir = TempDir::new().unwrap();
    let path = write_config(dir.path(), FULL);

    let cfg = load_and_validate(&path).unwrap();

    assert_eq!(cfg.base_dir(), dir.path());
    let descriptor = cfg.artifact_descriptor();
    assert_eq!(descriptor.install_dir, dir.path().join("runtime/backend"));
    assert_eq!(
        descriptor.candidate_executables,
        vec![PathBuf::from("backend.exe"), PathBuf::from("backend")]
    );
    assert_eq!(
        descriptor.source.bundled,
        Some(dir.path().join("resources/backend.zip"))
    );
    assert!(descriptor.source.remote.is_none());

    assert_eq!(cfg.captcha_dir(), dir.path().join("tmp"));
    let settings = cfg.update_settings();
    assert_eq!(settings.current_version, Version::new(1, 2, 0));
    assert_eq!(settings.asset_suffix, ".exe");
    assert_eq!(settings.staging_dir, dir.path().join("updates"));
    assert_eq!(cfg.update.installer_args, vec!["/S"]);
}

#[test]
fn minimal_config_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        dir.path(),
        r#"
[artifact]
name = "backend"
version = "1.4.0"
install_dir = "/opt/backend"
executables = ["backend.exe"]
"#,
    );

    let cfg = load_and_validate(&path).unwrap();

    assert!(!cfg.update.enabled);
    assert_eq!(cfg.captcha_dir(), dir.path().join("."));
    assert_eq!(cfg.artifact_descriptor().install_dir, PathBuf::from("/opt/backend"));
    assert_eq!(
        cfg.current_version(),
        &Version::parse(env!("CARGO_PKG_VERSION")).unwrap()
    );
}

#[test]
fn missing_executables_is_rejected() {
    let mut raw = ConfigFileBuilder::new().raw();
    raw.artifact.executables.clear();

    let err = ConfigFile::try_from(raw).unwrap_err();
    assert!(matches!(err, HostError::ConfigError(ref msg) if msg.contains("executables")));
}

#[test]
fn executable_escaping_install_dir_is_rejected() {
    let raw = ConfigFileBuilder::new().with_executable("../evil.exe").raw();

    assert!(matches!(
        ConfigFile::try_from(raw),
        Err(HostError::ConfigError(_))
    ));
}

#[test]
fn checksum_without_remote_is_rejected() {
    let mut raw = ConfigFileBuilder::new().raw();
    raw.artifact.checksum = Some("a".repeat(64));

    let err = ConfigFile::try_from(raw).unwrap_err();
    assert!(matches!(err, HostError::ConfigError(ref msg) if msg.contains("remote_url")));
}

#[test]
fn malformed_checksum_is_rejected() {
    let mut raw = ConfigFileBuilder::new().raw();
    raw.artifact.remote_url = Some("https://downloads.example.org/backend.zip".into());
    raw.artifact.checksum = Some("not-a-digest".into());

    assert!(matches!(
        ConfigFile::try_from(raw),
        Err(HostError::ConfigError(_))
    ));
}

#[test]
fn enabled_updates_need_a_feed() {
    let mut raw = ConfigFileBuilder::new().raw();
    raw.update.enabled = true;

    let err = ConfigFile::try_from(raw).unwrap_err();
    assert!(matches!(err, HostError::ConfigError(ref msg) if msg.contains("feed_url")));

    let mut raw = ConfigFileBuilder::new().raw();
    raw.update.enabled = true;
    raw.update.feed_url = Some("ftp://example.org/feed".into());
    assert!(ConfigFile::try_from(raw).is_err());
}

#[test]
fn invalid_current_version_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_updates("https://example.org/releases", "one.two")
        .raw();

    assert!(matches!(
        ConfigFile::try_from(raw),
        Err(HostError::ConfigError(_))
    ));
}

#[test]
fn builder_with_updates_is_valid() {
    let cfg = ConfigFileBuilder::new()
        .with_bundled_package("resources/backend.zip")
        .with_updates("https://example.org/releases", "v2.0.1")
        .build();

    assert!(cfg.update.enabled);
    assert_eq!(cfg.current_version(), &Version::new(2, 0, 1));
}

#[test]
fn bad_toml_is_a_toml_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(dir.path(), "[artifact\nname = ");

    assert!(matches!(load_and_validate(&path), Err(HostError::TomlError(_))));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = TempDir::new().unwrap();

    assert!(matches!(
        load_and_validate(dir.path().join("absent.toml")),
        Err(HostError::IoError(_))
    ));
}
