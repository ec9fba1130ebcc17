// tests/update_coordinator.rs

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use bollettino_host::errors::UpdateError;
use bollettino_host::events::{AppEvent, EventSink};
use bollettino_host::fs::mock::MockFileSystem;
use bollettino_host::types::UpdateState;
use bollettino_host::update::{UpdateCoordinator, UpdateSettings};
use common::*;
use semver::Version;
use tokio::sync::mpsc;

struct Harness {
    coordinator: UpdateCoordinator,
    events: mpsc::Receiver<AppEvent>,
    feed: FakeFeed,
    downloader: FakeDownloader,
    installer: RecordingInstaller,
    fs: MockFileSystem,
}

fn harness(reply: FeedReply) -> Harness {
    harness_with(reply, FakeDownloader::new(vec![1u8; 2048]), RecordingInstaller::new())
}

fn harness_with(reply: FeedReply, downloader: FakeDownloader, installer: RecordingInstaller) -> Harness {
    init_tracing();
    let fs = MockFileSystem::new();
    let downloader = downloader.into_mock(fs.clone());
    let feed = FakeFeed::new(reply);
    let (sink, events) = EventSink::channel(256);
    let coordinator = UpdateCoordinator::new(
        Arc::new(feed.clone()),
        Arc::new(downloader.clone()),
        Arc::new(installer.clone()),
        UpdateSettings {
            current_version: Version::new(1, 2, 0),
            asset_suffix: ".exe".into(),
            staging_dir: PathBuf::from("updates"),
        },
        sink,
    );
    Harness {
        coordinator,
        events,
        feed,
        downloader,
        installer,
        fs,
    }
}

fn newer_release() -> FeedReply {
    FeedReply::Release(release("v1.3.0", &["latest.yml", "Bollettini-Setup-1.3.0.exe"]))
}

#[tokio::test]
async fn zero_releases_return_to_idle_silently() {
    let mut h = harness(FeedReply::Empty);

    assert_eq!(h.coordinator.check_for_updates().await.unwrap(), None);
    assert_eq!(h.coordinator.state(), &UpdateState::Idle);
    assert!(drain_events(&mut h.events).is_empty());
}

#[tokio::test]
async fn missing_feed_is_suppressed() {
    let mut h = harness(FeedReply::NotPublished);

    assert_eq!(h.coordinator.check_for_updates().await.unwrap(), None);
    assert_eq!(h.coordinator.state(), &UpdateState::Idle);
    assert!(drain_events(&mut h.events).is_empty());
}

#[tokio::test]
async fn same_version_is_up_to_date() {
    let mut h = harness(FeedReply::Release(release("v1.2.0", &["Setup.exe"])));

    assert_eq!(h.coordinator.check_for_updates().await.unwrap(), None);
    assert_eq!(h.coordinator.state(), &UpdateState::Idle);
}

#[tokio::test]
async fn full_update_flow() {
    let mut h = harness(newer_release());

    let available = h.coordinator.check_for_updates().await.unwrap();
    assert_eq!(available.as_deref(), Some("1.3.0"));
    assert_eq!(h.coordinator.state(), &UpdateState::Available("1.3.0".into()));
    assert_eq!(
        drain_events(&mut h.events),
        vec![AppEvent::UpdateAvailable {
            version: "1.3.0".into()
        }]
    );

    let path = h.coordinator.download_update().await.unwrap();
    assert_eq!(path, PathBuf::from("updates/Bollettini-Setup-1.3.0.exe"));
    assert_eq!(h.fs.contents(&path).map(|c| c.len()), Some(2048));
    assert_eq!(
        h.downloader.requests(),
        vec!["https://downloads.example.org/v1.3.0/Bollettini-Setup-1.3.0.exe"]
    );
    assert_eq!(h.coordinator.state(), &UpdateState::Downloaded("1.3.0".into()));

    let names: Vec<String> = drain_events(&mut h.events)
        .iter()
        .map(|e| e.name().to_string())
        .collect();
    assert!(names.len() >= 2);
    assert!(names[..names.len() - 1].iter().all(|n| n == "update-download-progress"));
    assert_eq!(names.last().map(String::as_str), Some("update-downloaded"));

    h.coordinator.install_update().await.unwrap();
    assert_eq!(h.coordinator.state(), &UpdateState::Installing);
    assert_eq!(h.installer.handed_off(), vec![path]);
}

#[tokio::test]
async fn operations_from_wrong_state_are_rejected() {
    let mut h = harness(newer_release());

    let err = h.coordinator.download_update().await.unwrap_err();
    assert!(matches!(err, UpdateError::InvalidState { operation: "download update", .. }));
    assert_eq!(h.coordinator.state(), &UpdateState::Idle);

    h.coordinator.check_for_updates().await.unwrap();
    let err = h.coordinator.install_update().await.unwrap_err();
    assert!(matches!(err, UpdateError::InvalidState { .. }));
    assert_eq!(h.coordinator.state(), &UpdateState::Available("1.3.0".into()));
    assert!(h.installer.handed_off().is_empty());
}

#[tokio::test]
async fn feed_failure_is_reported_and_recoverable() {
    let mut h = harness(FeedReply::NetworkDown);

    let err = h.coordinator.check_for_updates().await.unwrap_err();
    assert!(matches!(err, UpdateError::Network(_)));
    assert!(matches!(h.coordinator.state(), UpdateState::Failed(_)));
    assert!(matches!(
        drain_events(&mut h.events).as_slice(),
        [AppEvent::UpdateError(msg)] if msg.contains("connection refused")
    ));

    h.feed.set_reply(newer_release());
    assert!(h.coordinator.check_for_updates().await.unwrap().is_some());
    assert_eq!(h.feed.calls(), 2);
}

#[tokio::test]
async fn download_failure_moves_to_failed() {
    let mut h = harness_with(
        newer_release(),
        FakeDownloader::new(Vec::new()).failing_with_status(500),
        RecordingInstaller::new(),
    );
    h.coordinator.check_for_updates().await.unwrap();
    drain_events(&mut h.events);

    let err = h.coordinator.download_update().await.unwrap_err();

    assert!(matches!(err, UpdateError::Download(_)));
    assert!(matches!(h.coordinator.state(), UpdateState::Failed(_)));
    assert_eq!(drain_event_names(&mut h.events), vec!["update-error"]);
}

#[tokio::test]
async fn installer_failure_moves_to_failed() {
    let mut h = harness_with(
        newer_release(),
        FakeDownloader::new(vec![0u8; 16]),
        RecordingInstaller::failing(),
    );
    h.coordinator.check_for_updates().await.unwrap();
    h.coordinator.download_update().await.unwrap();

    let err = h.coordinator.install_update().await.unwrap_err();
    assert!(matches!(err, UpdateError::Install(_)));
    assert!(matches!(h.coordinator.state(), UpdateState::Failed(_)));
}
