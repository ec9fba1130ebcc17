// src/config/mod.rs

//! Configuration loading and validation for bollettino-host.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate paths, URLs and versions (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{config_root_dir, default_config_path, load_and_validate, load_from_path};
pub use model::{ArtifactSection, ConfigFile, RawConfigFile, UpdateSection, WorkerSection};
pub use validate::validate_config;
