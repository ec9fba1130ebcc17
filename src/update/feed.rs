// src/update/feed.rs

//! Release metadata for the application itself.

use std::future::Future;
use std::pin::Pin;

use reqwest::StatusCode;
use semver::Version;
use serde::Deserialize;
use tracing::debug;

use crate::errors::UpdateError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReleaseInfo {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

impl ReleaseInfo {
    /// Semantic version of the tag, ignoring a leading `v`.
    pub fn version(&self) -> Option<Version> {
        parse_version(&self.tag_name)
    }

    /// First asset whose file name ends with `suffix` (case-insensitive).
    pub fn asset_with_suffix(&self, suffix: &str) -> Option<&ReleaseAsset> {
        let suffix = suffix.to_ascii_lowercase();
        self.assets
            .iter()
            .find(|asset| asset.name.to_ascii_lowercase().ends_with(&suffix))
    }
}

/// Parse `v1.2.3` / `1.2.3` into a [`Version`].
pub fn parse_version(tag: &str) -> Option<Version> {
    let tag = tag.trim();
    Version::parse(tag.strip_prefix('v').unwrap_or(tag)).ok()
}

/// Source of "latest release" metadata.
pub trait ReleaseFeed: Send + Sync {
    /// Latest published release, or `None` when the feed lists none.
    ///
    /// A feed endpoint that does not exist yet reports
    /// [`UpdateError::NoPublishedReleases`].
    fn latest(&self) -> Pin<Box<dyn Future<Output = Result<Option<ReleaseInfo>, UpdateError>> + Send + '_>>;
}

/// GitHub-style releases endpoint.
#[derive(Debug, Clone)]
pub struct GitHubReleaseFeed {
    client: reqwest::Client,
    url: String,
}

impl GitHubReleaseFeed {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl ReleaseFeed for GitHubReleaseFeed {
    fn latest(&self) -> Pin<Box<dyn Future<Output = Result<Option<ReleaseInfo>, UpdateError>> + Send + '_>> {
        Box::pin(async move {
            debug!(url = %self.url, "querying release feed");

            let response = self
                .client
                .get(&self.url)
                .header("Accept", "application/vnd.github+json")
                .send()
                .await
                .map_err(|err| UpdateError::Network(err.to_string()))?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Err(UpdateError::NoPublishedReleases);
            }
            if !status.is_success() {
                return Err(UpdateError::Network(format!("feed returned HTTP {status}")));
            }

            let body = response
                .text()
                .await
                .map_err(|err| UpdateError::Network(err.to_string()))?;
            parse_feed(&body)
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FeedBody {
    One(ReleaseInfo),
    Many(Vec<ReleaseInfo>),
}

/// Decode a feed body holding either one release or a list of releases.
///
/// From a list, the release with the highest parseable version wins.
pub fn parse_feed(body: &str) -> Result<Option<ReleaseInfo>, UpdateError> {
    let parsed: FeedBody =
        serde_json::from_str(body).map_err(|err| UpdateError::Feed(err.to_string()))?;

    Ok(match parsed {
        FeedBody::One(release) => Some(release),
        FeedBody::Many(releases) => releases.into_iter().max_by_key(ReleaseInfo::version),
    })
}
