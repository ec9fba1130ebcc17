use std::fmt;

use serde::Serialize;

/// Progress of a streaming download.
///
/// `bytes_total` is `None` when the server sent no `Content-Length`; `percent`
/// then stays at `0.0` until the download finishes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    pub bytes_transferred: u64,
    pub bytes_total: Option<u64>,
    pub percent: f64,
}

impl DownloadProgress {
    pub fn new(bytes_transferred: u64, bytes_total: Option<u64>) -> Self {
        let percent = match bytes_total {
            Some(0) | None => 0.0,
            Some(total) => ((bytes_transferred as f64 / total as f64) * 100.0).min(100.0),
        };
        Self {
            bytes_transferred,
            bytes_total,
            percent,
        }
    }

    /// Progress value reported once a download is known to be complete.
    pub fn complete(bytes_transferred: u64) -> Self {
        Self {
            bytes_transferred,
            bytes_total: Some(bytes_transferred),
            percent: 100.0,
        }
    }
}

/// State of the application self-update flow.
///
/// Transitions within one check cycle:
///
/// `Idle -> Checking -> {Available | Idle} -> Downloading -> Downloaded -> Installing`
///
/// `Failed` is reachable from any non-terminal state and is left only through
/// a fresh check.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateState {
    Idle,
    Checking,
    Available(String),
    Downloading(DownloadProgress),
    Downloaded(String),
    Installing,
    Failed(String),
}

impl Default for UpdateState {
    fn default() -> Self {
        UpdateState::Idle
    }
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateState::Idle => write!(f, "idle"),
            UpdateState::Checking => write!(f, "checking"),
            UpdateState::Available(v) => write!(f, "available({v})"),
            UpdateState::Downloading(p) => write!(f, "downloading({:.0}%)", p.percent),
            UpdateState::Downloaded(v) => write!(f, "downloaded({v})"),
            UpdateState::Installing => write!(f, "installing"),
            UpdateState::Failed(reason) => write!(f, "failed({reason})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_capped_and_handles_unknown_total() {
        assert_eq!(DownloadProgress::new(50, Some(200)).percent, 25.0);
        assert_eq!(DownloadProgress::new(300, Some(200)).percent, 100.0);
        assert_eq!(DownloadProgress::new(300, None).percent, 0.0);
        assert_eq!(DownloadProgress::new(0, Some(0)).percent, 0.0);
    }
}
