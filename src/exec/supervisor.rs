// src/exec/supervisor.rs

//! Owner of the single worker process.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::artifact::ArtifactProvisioner;
use crate::errors::LaunchError;
use crate::events::{AppEvent, EventSink, WorkerId};
use crate::exec::Operation;
use crate::protocol::{LineProtocolChannel, Message, pump_stderr, pump_stdout, write_line};

/// Upper bound on waiting for stdout and stderr to close after the process
/// is gone.
///
/// Only reached when a grandchild inherited a pipe and outlives the worker.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// How a worker process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    /// The process was killed through [`ProcessSupervisor::stop`].
    pub killed: bool,
}

impl WorkerExit {
    pub fn success(&self) -> bool {
        !self.killed && self.code == Some(0)
    }
}

/// Caller's view of a started worker.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    id: WorkerId,
    exit_rx: watch::Receiver<Option<WorkerExit>>,
}

impl WorkerHandle {
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Resolve once the process has exited and its stdout has been drained.
    pub async fn wait(&mut self) -> WorkerExit {
        let exit = match self.exit_rx.wait_for(Option::is_some).await {
            Ok(exit) => *exit,
            Err(_) => None,
        };
        // The monitor always publishes before it finishes; a closed channel
        // without a value means it was aborted with the runtime.
        exit.unwrap_or(WorkerExit {
            code: None,
            killed: true,
        })
    }
}

/// Internal handle for the running worker.
///
/// - `stdin` has its own lock so a write blocked on a full pipe never holds
///   the supervisor slot.
/// - `kill` asks the monitor task to kill the process.
/// - `monitor` waits for exit, drains stdout and publishes the result.
struct ActiveWorker {
    id: WorkerId,
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    kill: Option<oneshot::Sender<()>>,
    monitor: JoinHandle<()>,
}

impl ActiveWorker {
    fn request_kill(&mut self) {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
    }
}

/// Starts, feeds and stops the worker executable.
///
/// There is never more than one worker process: starting a new one stops the
/// previous one first. Stdout is decoded into [`Message`]s, stderr bursts are
/// wrapped as `error` messages, and the end of the process is reported as
/// [`AppEvent::WorkerExited`] after its last message.
pub struct ProcessSupervisor {
    provisioner: Arc<ArtifactProvisioner>,
    sink: EventSink,
    active: Arc<Mutex<Option<ActiveWorker>>>,
    next_id: AtomicU64,
}

impl ProcessSupervisor {
    pub fn new(provisioner: Arc<ArtifactProvisioner>, sink: EventSink) -> Self {
        Self {
            provisioner,
            sink,
            active: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn provisioner(&self) -> &Arc<ArtifactProvisioner> {
        &self.provisioner
    }

    /// Start the worker for a known operation.
    pub async fn run(&self, operation: &Operation) -> Result<WorkerHandle, LaunchError> {
        self.start(&operation.args()).await
    }

    /// Make the artifact ready and spawn the worker with `args`.
    pub async fn start(&self, args: &[String]) -> Result<WorkerHandle, LaunchError> {
        let executable = self.provisioner.ensure_ready().await?;

        self.stop().await;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        info!(worker = id, path = ?executable, args = ?args, "starting worker process");

        let mut cmd = Command::new(&executable);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                let err = if source.kind() == std::io::ErrorKind::NotFound {
                    LaunchError::ExecutableMissing(executable)
                } else {
                    LaunchError::Spawn {
                        path: executable,
                        source,
                    }
                };
                error!(worker = id, error = %err, "failed to launch worker");
                self.sink
                    .emit(AppEvent::Worker(Message::error(err.to_string())))
                    .await;
                return Err(err);
            }
        };

        let stdin = child.stdin.take();
        let stdout_task = child
            .stdout
            .take()
            .map(|stdout| tokio::spawn(pump_stdout(id, stdout, self.sink.clone())));
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(pump_stderr(id, stderr, self.sink.clone())));

        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel(None);

        // Hold the slot while the monitor is spawned so its cleanup cannot run
        // before the worker is registered.
        let mut slot = self.active.lock().await;
        let monitor = tokio::spawn(monitor_worker(
            id,
            child,
            kill_rx,
            stdout_task,
            stderr_task,
            exit_tx,
            self.sink.clone(),
            Arc::clone(&self.active),
        ));
        let previous = slot.replace(ActiveWorker {
            id,
            stdin: Arc::new(Mutex::new(stdin)),
            kill: Some(kill_tx),
            monitor,
        });
        drop(slot);

        if let Some(mut previous) = previous {
            warn!(worker = previous.id, "concurrent start; killing previous worker");
            previous.request_kill();
        }

        Ok(WorkerHandle { id, exit_rx })
    }

    /// Write one line to the worker's stdin.
    ///
    /// Does nothing when no worker is running; write failures are logged.
    pub async fn send(&self, line: &str) {
        let (id, stdin) = {
            let slot = self.active.lock().await;
            let Some(worker) = slot.as_ref() else {
                debug!("no active worker; input discarded");
                return;
            };
            (worker.id, Arc::clone(&worker.stdin))
        };

        let mut stdin = stdin.lock().await;
        let Some(pipe) = stdin.as_mut() else {
            warn!(worker = id, "worker stdin already closed; input discarded");
            return;
        };
        if let Err(err) = write_line(pipe, line).await {
            warn!(worker = id, error = %err, "failed to write to worker stdin");
        }
    }

    /// Kill the worker if one is running and wait until it is gone.
    ///
    /// Safe to call at any time, any number of times.
    pub async fn stop(&self) {
        let worker = self.active.lock().await.take();
        let Some(mut worker) = worker else {
            return;
        };

        info!(worker = worker.id, "stopping worker process");
        // A writer blocked on a full pipe keeps the lock; the kill below
        // breaks the pipe and releases it.
        if let Ok(mut stdin) = worker.stdin.try_lock() {
            stdin.take();
        }
        worker.request_kill();
        if let Err(err) = worker.monitor.await {
            warn!(worker = worker.id, error = %err, "worker monitor task failed");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.active.lock().await.is_some()
    }

    pub async fn current_worker(&self) -> Option<WorkerId> {
        self.active.lock().await.as_ref().map(|worker| worker.id)
    }
}

/// Wait for the process to exit (or a kill request), then report the exit.
async fn monitor_worker(
    id: WorkerId,
    mut child: Child,
    mut kill_rx: oneshot::Receiver<()>,
    stdout_task: Option<JoinHandle<LineProtocolChannel>>,
    stderr_task: Option<JoinHandle<()>>,
    exit_tx: watch::Sender<Option<WorkerExit>>,
    sink: EventSink,
    active: Arc<Mutex<Option<ActiveWorker>>>,
) {
    let exit = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => {
                info!(worker = id, code = ?status.code(), success = status.success(), "worker process exited");
                WorkerExit { code: status.code(), killed: false }
            }
            Err(err) => {
                error!(worker = id, error = %err, "waiting for worker process failed");
                WorkerExit { code: None, killed: false }
            }
        },

        cancel = &mut kill_rx => {
            if cancel.is_err() {
                debug!(worker = id, "supervisor dropped; killing worker");
            }
            if let Err(err) = child.kill().await {
                warn!(worker = id, error = %err, "failed to kill worker process");
            }
            info!(worker = id, "worker process killed");
            WorkerExit { code: None, killed: true }
        }
    };

    // Everything the worker wrote is published before its exit event.
    let deadline = tokio::time::Instant::now() + OUTPUT_DRAIN_TIMEOUT;
    if let Some(mut task) = stdout_task {
        match tokio::time::timeout_at(deadline, &mut task).await {
            Ok(Ok(channel)) => debug!(worker = id, dropped = channel.dropped(), "stdout drained"),
            Ok(Err(err)) => warn!(worker = id, error = %err, "stdout pump failed"),
            Err(_) => {
                warn!(worker = id, "stdout still open after exit; abandoning pump");
                task.abort();
            }
        }
    }
    if let Some(mut task) = stderr_task {
        match tokio::time::timeout_at(deadline, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(worker = id, error = %err, "stderr pump failed"),
            Err(_) => {
                warn!(worker = id, "stderr still open after exit; abandoning pump");
                task.abort();
            }
        }
    }

    {
        let mut slot = active.lock().await;
        if slot.as_ref().is_some_and(|worker| worker.id == id) {
            *slot = None;
        }
    }

    sink.emit(AppEvent::WorkerExited {
        worker: id,
        code: exit.code,
    })
    .await;
    let _ = exit_tx.send(Some(exit));
}
