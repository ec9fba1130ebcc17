// src/engine/runtime.rs

use std::collections::VecDeque;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::events::AppEvent;
use crate::exec::{Operation, ProcessSupervisor};
use crate::protocol::Message;

use super::core::SessionCore;
use super::{CoreCommand, HostEvent, SessionOutcome};

/// File name of the stored challenge image inside the capture directory.
pub const CHALLENGE_FILE: &str = "captcha.png";

/// Drives a [`SessionCore`] with events from the worker and the user, and
/// performs the commands it returns.
///
/// Every [`AppEvent`] ends up on `output` as one JSON line in the
/// `{"type", "payload"}` shape, in the order it was emitted.
pub struct SessionRuntime<W> {
    core: SessionCore,
    supervisor: Arc<ProcessSupervisor>,
    input: PathBuf,
    captcha_dir: PathBuf,
    events_rx: mpsc::Receiver<AppEvent>,
    control_rx: mpsc::Receiver<HostEvent>,
    output: W,
    pending: VecDeque<HostEvent>,
}

impl<W: AsyncWrite + Unpin + Send> SessionRuntime<W> {
    pub fn new(
        core: SessionCore,
        supervisor: Arc<ProcessSupervisor>,
        input: PathBuf,
        captcha_dir: PathBuf,
        events_rx: mpsc::Receiver<AppEvent>,
        control_rx: mpsc::Receiver<HostEvent>,
        output: W,
    ) -> Self {
        Self {
            core,
            supervisor,
            input,
            captcha_dir,
            events_rx,
            control_rx,
            output,
            pending: VecDeque::new(),
        }
    }

    /// Main event loop.
    ///
    /// - Launches the counting worker.
    /// - Feeds every event into the core.
    /// - Executes commands returned by the core until it asks to stop.
    /// - Stops the worker unconditionally on the way out.
    pub async fn run(mut self) -> Result<(SessionOutcome, W)> {
        info!(input = ?self.input, "session started");

        self.launch(Operation::CountCausali(self.input.clone())).await;

        loop {
            let event = match self.pending.pop_front() {
                Some(event) => event,
                None => tokio::select! {
                    Some(event) = self.events_rx.recv() => HostEvent::App(event),
                    Some(control) = self.control_rx.recv() => control,
                    else => {
                        info!("all event sources closed; exiting");
                        break;
                    }
                },
            };

            let step = self.core.step(event);
            for command in step.commands {
                self.execute(command).await?;
            }

            if !step.keep_running {
                debug!("core requested exit; stopping session");
                break;
            }
        }

        self.stop_worker().await;
        self.flush().await?;

        let outcome = self
            .core
            .outcome()
            .cloned()
            .unwrap_or(SessionOutcome::Interrupted);
        info!(?outcome, "session finished");
        Ok((outcome, self.output))
    }

    async fn execute(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::Emit(msg) => write_message(&mut self.output, &msg).await?,
            CoreCommand::SaveChallenge(image) => self.save_challenge(&image).await?,
            CoreCommand::SendToWorker(line) => self.supervisor.send(&line).await,
            CoreCommand::StartAutomation => {
                self.launch(Operation::RunAutomation(self.input.clone()))
                    .await
            }
            CoreCommand::StopWorker => self.stop_worker().await,
            CoreCommand::Finish(outcome) => debug!(?outcome, "core issued Finish"),
        }
        Ok(())
    }

    /// Provision and spawn the worker for `operation`.
    ///
    /// A shutdown request arriving meanwhile abandons the launch; dropping
    /// the future cancels any extraction or download in progress.
    async fn launch(&mut self, operation: Operation) {
        let supervisor = Arc::clone(&self.supervisor);
        let result = {
            let fut = supervisor.run(&operation);
            tokio::pin!(fut);
            loop {
                tokio::select! {
                    out = &mut fut => break Some(out),
                    Some(event) = self.events_rx.recv() => {
                        self.pending.push_back(HostEvent::App(event));
                    }
                    Some(control) = self.control_rx.recv() => match control {
                        HostEvent::ShutdownRequested => break None,
                        other => self.pending.push_back(other),
                    },
                }
            }
        };

        match result {
            Some(Ok(handle)) => {
                debug!(worker = handle.id(), flag = operation.flag(), "worker launched")
            }
            Some(Err(err)) => {
                warn!(error = %err, flag = operation.flag(), "worker launch failed");
                self.pending.push_back(HostEvent::LaunchFailed(err.to_string()));
            }
            None => {
                info!(flag = operation.flag(), "shutdown requested; launch abandoned");
                self.pending.push_back(HostEvent::ShutdownRequested);
            }
        }
    }

    async fn stop_worker(&mut self) {
        let supervisor = Arc::clone(&self.supervisor);
        buffer_events_while(&mut self.events_rx, &mut self.pending, supervisor.stop()).await;
    }

    async fn save_challenge(&mut self, image: &str) -> Result<()> {
        let bytes = match decode_image(image) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "challenge image is not valid base64");
                let msg = Message::error(format!("invalid challenge image: {err}"));
                return Ok(write_message(&mut self.output, &msg).await?);
            }
        };

        tokio::fs::create_dir_all(&self.captcha_dir).await?;
        let path = self.captcha_dir.join(CHALLENGE_FILE);
        tokio::fs::write(&path, bytes).await?;
        info!(path = ?path, "challenge image saved; waiting for code on stdin");

        let msg = Message::new("captcha-saved", json!({ "path": path.display().to_string() }));
        write_message(&mut self.output, &msg).await?;
        Ok(())
    }

    /// Print whatever is still buffered once the loop is over.
    async fn flush(&mut self) -> Result<()> {
        while let Some(event) = self.pending.pop_front() {
            if let HostEvent::App(event) = event {
                write_message(&mut self.output, &event.to_message()).await?;
            }
        }
        while let Ok(event) = self.events_rx.try_recv() {
            write_message(&mut self.output, &event.to_message()).await?;
        }
        self.output.flush().await?;
        Ok(())
    }
}

/// Poll `fut` to completion while moving incoming events into `pending`.
///
/// Producers block when the event channel is full; draining it here keeps a
/// launch or stop from waiting on its own events.
async fn buffer_events_while<F: Future>(
    events_rx: &mut mpsc::Receiver<AppEvent>,
    pending: &mut VecDeque<HostEvent>,
    fut: F,
) -> F::Output {
    tokio::pin!(fut);
    loop {
        tokio::select! {
            out = &mut fut => return out,
            Some(event) = events_rx.recv() => pending.push_back(HostEvent::App(event)),
        }
    }
}

/// Write one message as a JSON line.
pub async fn write_message<W: AsyncWrite + Unpin>(output: &mut W, msg: &Message) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(msg)?;
    line.push(b'\n');
    output.write_all(&line).await?;
    output.flush().await
}

/// Decode a base64 image, with or without a `data:` URL prefix.
fn decode_image(image: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    let data = match image.split_once(";base64,") {
        Some((_, data)) => data,
        None => image,
    };
    STANDARD.decode(data.trim())
}
