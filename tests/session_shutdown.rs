// tests/session_shutdown.rs
//
// Ctrl-C while the worker artifact is still being provisioned.

mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bollettino_host::artifact::ArtifactProvisioner;
use bollettino_host::engine::{HostEvent, SessionCore, SessionMode, SessionOutcome, SessionRuntime};
use bollettino_host::events::EventSink;
use bollettino_host::exec::ProcessSupervisor;
use bollettino_host::fs::FileSystem;
use bollettino_host::fs::mock::MockFileSystem;
use common::*;
use tokio::sync::mpsc;
use tokio::time::Instant;

#[tokio::test]
async fn shutdown_during_provisioning_abandons_the_launch() {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file("resources/backend.zip", b"zip".to_vec());
    let extractor = FakeExtractor::new(fs.clone()).with_delay(Duration::from_secs(3));

    let (sink, events_rx) = EventSink::channel(256);
    let provisioner = ArtifactProvisioner::new(
        DescriptorBuilder::new().build(),
        Arc::new(fs.clone()),
        Arc::new(extractor.clone()),
        sink.clone(),
    );
    let supervisor = Arc::new(ProcessSupervisor::new(Arc::new(provisioner), sink));

    let (control_tx, control_rx) = mpsc::channel(8);
    control_tx.send(HostEvent::ShutdownRequested).await.unwrap();

    let runtime = SessionRuntime::new(
        SessionCore::new(SessionMode::Run),
        Arc::clone(&supervisor),
        PathBuf::from("bollettini.xlsx"),
        PathBuf::from("captcha"),
        events_rx,
        control_rx,
        Vec::<u8>::new(),
    );

    let started = Instant::now();
    let (outcome, _output) = with_timeout(runtime.run()).await.unwrap();

    assert_eq!(outcome, SessionOutcome::Interrupted);
    assert!(started.elapsed() < Duration::from_secs(1), "launch was not abandoned");
    assert!(!fs.exists(Path::new("install/version.txt")));
    assert!(!supervisor.is_running().await);
}
