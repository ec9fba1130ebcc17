// src/events.rs

//! Events surfaced to the presentation layer.
//!
//! Producers (supervisor, provisioner, update coordinator) push typed
//! [`AppEvent`]s into an [`EventSink`]; the presentation layer owns the
//! receiving end and pulls them in arrival order.

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::debug;

use crate::protocol::Message;
use crate::types::DownloadProgress;

/// Identifier of one spawned worker process within a host run.
pub type WorkerId = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// A decoded worker stdout line, or a stderr burst wrapped as `error`.
    Worker(Message),
    /// Lifecycle notification: the worker process is gone.
    ///
    /// `code` is `None` when the process was killed by a signal.
    WorkerExited { worker: WorkerId, code: Option<i32> },
    BackendStatus(String),
    BackendError(String),
    BackendExtractStart,
    BackendExtractComplete,
    /// The artifact is installed; carries its version.
    BackendReady(String),
    BackendDownloadProgress(DownloadProgress),
    UpdateAvailable { version: String },
    UpdateDownloadProgress(DownloadProgress),
    UpdateDownloaded { version: String },
    UpdateError(String),
}

impl AppEvent {
    /// Wire name of the event (`type` field of [`AppEvent::to_message`]).
    pub fn name(&self) -> &str {
        match self {
            AppEvent::Worker(msg) => &msg.kind,
            AppEvent::WorkerExited { .. } => "worker-exited",
            AppEvent::BackendStatus(_) => "backend-status",
            AppEvent::BackendError(_) => "backend-error",
            AppEvent::BackendExtractStart => "backend-extract-start",
            AppEvent::BackendExtractComplete => "backend-extract-complete",
            AppEvent::BackendReady(_) => "backend-ready",
            AppEvent::BackendDownloadProgress(_) => "backend-download-progress",
            AppEvent::UpdateAvailable { .. } => "update-available",
            AppEvent::UpdateDownloadProgress(_) => "update-download-progress",
            AppEvent::UpdateDownloaded { .. } => "update-downloaded",
            AppEvent::UpdateError(_) => "update-error",
        }
    }

    /// Render the event in the uniform `{type, payload}` wire shape.
    pub fn to_message(&self) -> Message {
        let payload = match self {
            AppEvent::Worker(msg) => return msg.clone(),
            AppEvent::WorkerExited { worker, code } => json!({ "worker": worker, "code": code }),
            AppEvent::BackendStatus(text)
            | AppEvent::BackendError(text)
            | AppEvent::UpdateError(text) => Value::String(text.clone()),
            AppEvent::BackendExtractStart | AppEvent::BackendExtractComplete => Value::Null,
            AppEvent::BackendReady(version) => Value::String(version.clone()),
            AppEvent::BackendDownloadProgress(progress)
            | AppEvent::UpdateDownloadProgress(progress) => {
                serde_json::to_value(progress).unwrap_or_default()
            }
            AppEvent::UpdateAvailable { version } | AppEvent::UpdateDownloaded { version } => {
                json!({ "version": version })
            }
        };
        Message::new(self.name(), payload)
    }
}

/// Sending half of the presentation event channel.
///
/// Cheap to clone; every producer holds its own copy. Emitting never fails:
/// once the presentation layer is gone, events are dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<AppEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<AppEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiver the presentation layer reads.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AppEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    pub async fn emit(&self, event: AppEvent) {
        if let Err(err) = self.tx.send(event).await {
            debug!(event = err.0.name(), "event receiver dropped; discarding event");
        }
    }
}
