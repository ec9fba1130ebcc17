// tests/supervisor.rs
//
// Runs /bin/sh as the worker executable through a symlink in a temporary
// install directory.
#![cfg(unix)]

mod common;

use std::fs;
use std::sync::Arc;

use bollettino_host::artifact::{ArtifactProvisioner, ZipExtractor};
use bollettino_host::errors::{LaunchError, ProvisionError};
use bollettino_host::events::{AppEvent, EventSink};
use bollettino_host::exec::ProcessSupervisor;
use bollettino_host::fs::RealFileSystem;
use bollettino_host::protocol::Message;
use common::*;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::mpsc;

struct Harness {
    _dir: TempDir,
    supervisor: Arc<ProcessSupervisor>,
    events: mpsc::Receiver<AppEvent>,
}

fn harness() -> Harness {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let install = dir.path().join("install");
    fs::create_dir_all(install.join("bin")).unwrap();
    std::os::unix::fs::symlink("/bin/sh", install.join("bin/worker")).unwrap();
    fs::write(install.join("version.txt"), "1.4.0").unwrap();

    let descriptor = DescriptorBuilder::new()
        .install_dir(&install)
        .executable("bin/worker")
        .no_bundled()
        .build();

    let (sink, events) = EventSink::channel(256);
    let provisioner = ArtifactProvisioner::new(
        descriptor,
        Arc::new(RealFileSystem),
        Arc::new(ZipExtractor),
        sink.clone(),
    );
    Harness {
        _dir: dir,
        supervisor: Arc::new(ProcessSupervisor::new(Arc::new(provisioner), sink)),
        events,
    }
}

fn script(body: &str) -> Vec<String> {
    vec!["-c".to_string(), body.to_string()]
}

/// Receive events until one satisfies `done`; returns everything received.
async fn recv_until(
    rx: &mut mpsc::Receiver<AppEvent>,
    done: impl Fn(&AppEvent) -> bool,
) -> Vec<AppEvent> {
    with_timeout(async {
        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            let stop = done(&event);
            seen.push(event);
            if stop {
                break;
            }
        }
        seen
    })
    .await
}

fn is_exit(event: &AppEvent) -> bool {
    matches!(event, AppEvent::WorkerExited { .. })
}

fn worker_messages(events: &[AppEvent]) -> Vec<Message> {
    events
        .iter()
        .filter_map(|event| match event {
            AppEvent::Worker(msg) => Some(msg.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn split_line_then_finished_arrive_in_order_before_exit() {
    let mut h = harness();

    let mut handle = h
        .supervisor
        .start(&script(
            r#"printf '{"type":"main_status","pay'; sleep 0.1; printf 'load":"Working"}\n{"type":"finished","payload":"Completed 12 items"}\n'"#,
        ))
        .await
        .unwrap();

    let events = recv_until(&mut h.events, is_exit).await;
    assert_eq!(
        worker_messages(&events),
        vec![
            Message::new("main_status", "Working"),
            Message::new("finished", "Completed 12 items"),
        ]
    );
    assert_eq!(events.first().map(AppEvent::name), Some("backend-ready"));

    let exit = with_timeout(handle.wait()).await;
    assert!(exit.success());
    assert!(!h.supervisor.is_running().await);
}

#[tokio::test]
async fn challenge_response_round_trip() {
    let mut h = harness();

    h.supervisor
        .start(&script(
            r#"echo '{"type":"captcha_required","payload":"iVBORw0KGgo="}'; read code; echo "{\"type\":\"finished\",\"payload\":\"$code\"}""#,
        ))
        .await
        .unwrap();

    recv_until(&mut h.events, |event| {
        matches!(event, AppEvent::Worker(msg) if msg.kind == "captcha_required")
    })
    .await;

    h.supervisor.send("XK42").await;

    let events = recv_until(&mut h.events, is_exit).await;
    assert_eq!(
        worker_messages(&events),
        vec![Message::new("finished", json!("XK42"))]
    );
}

#[tokio::test]
async fn stderr_is_forwarded_and_exit_code_reported() {
    let mut h = harness();

    let mut handle = h
        .supervisor
        .start(&script("echo 'Traceback: boom' >&2; exit 3"))
        .await
        .unwrap();

    let exit = with_timeout(handle.wait()).await;
    assert_eq!(exit.code, Some(3));
    assert!(!exit.success());

    // Stderr is drained before the exit is published.
    let events = recv_until(&mut h.events, is_exit).await;
    assert!(events.iter().any(|event| matches!(
        event,
        AppEvent::WorkerExited { code: Some(3), .. }
    )));
    assert!(
        worker_messages(&events)
            .iter()
            .any(|m| m.kind == "error" && m.payload.as_str().is_some_and(|t| t.contains("boom")))
    );
}

#[tokio::test]
async fn stderr_written_just_before_exit_precedes_the_exit_event() {
    let mut h = harness();

    h.supervisor
        .start(&script(r#"echo '{"type":"causali_count","payload":{"count":1}}'; sleep 0.05; echo 'late warning' >&2; exit 0"#))
        .await
        .unwrap();

    let events = recv_until(&mut h.events, is_exit).await;
    let kinds: Vec<String> = worker_messages(&events).into_iter().map(|m| m.kind).collect();
    assert_eq!(kinds, vec!["causali_count", "error"]);
    assert!(drain_events(&mut h.events).is_empty());
}

#[tokio::test]
async fn stop_kills_and_is_idempotent() {
    let mut h = harness();

    let mut handle = h.supervisor.start(&script("exec sleep 30")).await.unwrap();
    assert_eq!(h.supervisor.current_worker().await, Some(handle.id()));

    with_timeout(h.supervisor.stop()).await;
    let exit = with_timeout(handle.wait()).await;
    assert!(exit.killed);
    assert!(!h.supervisor.is_running().await);

    with_timeout(h.supervisor.stop()).await;
    let events = recv_until(&mut h.events, is_exit).await;
    assert!(events.iter().any(|event| matches!(
        event,
        AppEvent::WorkerExited { worker, code: None } if *worker == handle.id()
    )));
}

#[tokio::test]
async fn stop_is_not_blocked_by_a_stalled_write() {
    let h = harness();

    // The worker never reads, so a large line fills the pipe and the write parks.
    let mut handle = h.supervisor.start(&script("exec sleep 30")).await.unwrap();
    let writer = {
        let supervisor = Arc::clone(&h.supervisor);
        tokio::spawn(async move { supervisor.send(&"A".repeat(1024 * 1024)).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    with_timeout(h.supervisor.stop()).await;
    assert!(with_timeout(handle.wait()).await.killed);
    assert!(!h.supervisor.is_running().await);

    // The broken pipe ends the parked write.
    with_timeout(writer).await.unwrap();
}

#[tokio::test]
async fn starting_again_replaces_the_running_worker() {
    let h = harness();

    let mut first = h.supervisor.start(&script("exec sleep 30")).await.unwrap();
    let second = h.supervisor.start(&script("exec sleep 30")).await.unwrap();

    assert!(with_timeout(first.wait()).await.killed);
    assert_ne!(first.id(), second.id());
    assert_eq!(h.supervisor.current_worker().await, Some(second.id()));

    h.supervisor.stop().await;
}

#[tokio::test]
async fn send_without_worker_is_a_no_op() {
    let mut h = harness();

    h.supervisor.send("ABC123").await;

    assert!(!h.supervisor.is_running().await);
    assert!(drain_events(&mut h.events).is_empty());
}

#[tokio::test]
async fn missing_artifact_fails_before_spawning() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let descriptor = DescriptorBuilder::new()
        .install_dir(dir.path().join("install"))
        .no_bundled()
        .build();
    let (sink, mut events) = EventSink::channel(16);
    let provisioner = ArtifactProvisioner::new(
        descriptor,
        Arc::new(RealFileSystem),
        Arc::new(ZipExtractor),
        sink.clone(),
    );
    let supervisor = ProcessSupervisor::new(Arc::new(provisioner), sink);

    let err = supervisor.start(&script("true")).await.unwrap_err();

    assert!(matches!(
        err,
        LaunchError::Provision(ProvisionError::NotBundled(_))
    ));
    assert!(!supervisor.is_running().await);
    assert!(
        drain_event_names(&mut events)
            .iter()
            .any(|name| name == "backend-error")
    );
}
