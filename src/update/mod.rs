// src/update/mod.rs

//! Self-update of the host application.
//!
//! - [`feed`] reads "latest release" metadata.
//! - [`coordinator`] is the update state machine.
//! - [`installer`] launches the downloaded OS installer.

pub mod coordinator;
pub mod feed;
pub mod installer;

pub use coordinator::{UpdateCoordinator, UpdateSettings};
pub use feed::{GitHubReleaseFeed, ReleaseAsset, ReleaseFeed, ReleaseInfo, parse_version};
pub use installer::{Installer, ProcessInstaller};
