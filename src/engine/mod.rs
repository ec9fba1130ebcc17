// src/engine/mod.rs

//! Orchestration of one host session.
//!
//! A session runs the worker once in counting mode and, for `run`, a second
//! time in automation mode. It reacts to:
//! - worker messages and exits
//! - provisioning / update events
//! - lines typed on stdin (challenge codes)
//! - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use crate::events::AppEvent;
use crate::protocol::Message;

/// What the session was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Count the causali in the input and stop.
    Count,
    /// Count, then run the automation if the input is usable.
    Run,
}

/// Events flowing into the session core.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// Anything the supervisor, provisioner or updater emitted.
    App(AppEvent),
    /// One line read from the host's stdin.
    UserInput(String),
    /// The worker could not be started.
    LaunchFailed(String),
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Counting finished with a positive count.
    Counted(u64),
    /// The automation reported `finished`.
    Completed { processed: Option<u64> },
    /// Zero causali in the input.
    NoValidInput,
    /// Column B already has values; the listed rows must be cleared first.
    ColumnBNotEmpty { rows: Vec<u64> },
    Failed(String),
    Interrupted,
}

impl SessionOutcome {
    /// Process exit code of the host binary for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionOutcome::Counted(_) | SessionOutcome::Completed { .. } => 0,
            SessionOutcome::Failed(_) => 1,
            SessionOutcome::NoValidInput => 3,
            SessionOutcome::ColumnBNotEmpty { .. } => 4,
            SessionOutcome::Interrupted => 130,
        }
    }
}

/// Commands the core asks the IO shell to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreCommand {
    /// Print a message on the presentation stream.
    Emit(Message),
    /// Decode and store a base64 challenge image.
    SaveChallenge(String),
    /// Forward a line to the worker's stdin.
    SendToWorker(String),
    /// Launch the worker in automation mode.
    StartAutomation,
    StopWorker,
    Finish(SessionOutcome),
}

/// Result of feeding one event into the core.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    pub keep_running: bool,
}

impl CoreStep {
    pub fn proceed(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }

    pub fn stop(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: false,
        }
    }
}

pub mod core;
pub mod runtime;

pub use self::core::{Phase, SessionCore};
pub use runtime::SessionRuntime;
