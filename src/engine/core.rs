// src/engine/core.rs

//! Pure session state machine.
//!
//! This module contains a synchronous, deterministic core that consumes
//! [`HostEvent`]s and produces:
//! - an updated session state
//! - a list of commands describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::SessionRuntime`) is responsible for:
//! - reading events from channels
//! - launching / feeding / stopping the worker
//! - writing the presentation stream and challenge images
//!
//! The core has no Tokio types, channels, filesystem or processes, so it is
//! unit tested directly.

use serde_json::Value;
use tracing::debug;

use crate::engine::{CoreCommand, CoreStep, HostEvent, SessionMode, SessionOutcome};
use crate::events::AppEvent;
use crate::protocol::{Message, WorkerEvent, completed_count};

/// Which worker invocation is currently expected to be running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Counting,
    Automating,
    Done,
}

#[derive(Debug)]
pub struct SessionCore {
    mode: SessionMode,
    phase: Phase,
    count: Option<u64>,
    column_b_rows: Option<Vec<u64>>,
    finished: Option<Value>,
    last_error: Option<String>,
    awaiting_code: bool,
    outcome: Option<SessionOutcome>,
}

impl SessionCore {
    pub fn new(mode: SessionMode) -> Self {
        Self {
            mode,
            phase: Phase::Counting,
            count: None,
            column_b_rows: None,
            finished: None,
            last_error: None,
            awaiting_code: false,
            outcome: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn count(&self) -> Option<u64> {
        self.count
    }

    /// Whether the worker asked for a challenge code that was not sent yet.
    pub fn awaiting_code(&self) -> bool {
        self.awaiting_code
    }

    pub fn outcome(&self) -> Option<&SessionOutcome> {
        self.outcome.as_ref()
    }

    /// Handle a single event, updating state and returning the resulting
    /// commands for the IO shell.
    pub fn step(&mut self, event: HostEvent) -> CoreStep {
        if self.phase == Phase::Done {
            debug!(?event, "session already finished; ignoring event");
            return CoreStep::stop(Vec::new());
        }

        match event {
            HostEvent::App(AppEvent::Worker(msg)) => self.on_worker_message(msg),
            HostEvent::App(AppEvent::WorkerExited { worker, code }) => {
                let exited = AppEvent::WorkerExited { worker, code };
                self.on_worker_exit(code, vec![CoreCommand::Emit(exited.to_message())])
            }
            HostEvent::App(other) => CoreStep::proceed(vec![CoreCommand::Emit(other.to_message())]),
            HostEvent::UserInput(line) => self.on_user_input(line),
            HostEvent::LaunchFailed(reason) => self.finish(SessionOutcome::Failed(reason), Vec::new()),
            HostEvent::ShutdownRequested => {
                self.finish(SessionOutcome::Interrupted, vec![CoreCommand::StopWorker])
            }
        }
    }

    fn on_worker_message(&mut self, msg: Message) -> CoreStep {
        let event = msg.event();
        let mut commands = vec![CoreCommand::Emit(msg)];

        match event {
            WorkerEvent::CausaliCount(count) => self.count = Some(count),
            WorkerEvent::ColumnBNotEmpty { filled_rows, .. } => {
                self.column_b_rows = Some(filled_rows)
            }
            WorkerEvent::CaptchaRequired(image) => {
                self.awaiting_code = true;
                commands.push(CoreCommand::SaveChallenge(image));
            }
            WorkerEvent::Finished(payload) => self.finished = Some(payload),
            WorkerEvent::Error(text) => self.last_error = Some(text),
            _ => {}
        }

        CoreStep::proceed(commands)
    }

    fn on_user_input(&mut self, line: String) -> CoreStep {
        if !self.awaiting_code {
            debug!("no challenge pending; ignoring input line");
            return CoreStep::proceed(Vec::new());
        }
        self.awaiting_code = false;
        CoreStep::proceed(vec![CoreCommand::SendToWorker(line.trim().to_string())])
    }

    fn on_worker_exit(&mut self, code: Option<i32>, mut commands: Vec<CoreCommand>) -> CoreStep {
        self.awaiting_code = false;

        match self.phase {
            Phase::Counting => {
                let count = match self.count {
                    Some(0) => return self.finish(SessionOutcome::NoValidInput, commands),
                    Some(count) => count,
                    None => {
                        let reason = self.failure_reason(code, "no causali count reported");
                        return self.finish(SessionOutcome::Failed(reason), commands);
                    }
                };
                if let Some(rows) = self.column_b_rows.take() {
                    return self.finish(SessionOutcome::ColumnBNotEmpty { rows }, commands);
                }
                match self.mode {
                    SessionMode::Count => self.finish(SessionOutcome::Counted(count), commands),
                    SessionMode::Run => {
                        self.phase = Phase::Automating;
                        self.last_error = None;
                        commands.push(CoreCommand::StartAutomation);
                        CoreStep::proceed(commands)
                    }
                }
            }
            Phase::Automating => match self.finished.take() {
                Some(payload) => {
                    let processed = completed_count(&payload);
                    self.finish(SessionOutcome::Completed { processed }, commands)
                }
                None => {
                    let reason = self.failure_reason(code, "automation ended without finishing");
                    self.finish(SessionOutcome::Failed(reason), commands)
                }
            },
            Phase::Done => CoreStep::stop(commands),
        }
    }

    fn failure_reason(&self, code: Option<i32>, fallback: &str) -> String {
        if let Some(err) = &self.last_error {
            return err.trim().to_string();
        }
        match code {
            Some(code) => format!("{fallback} (exit code {code})"),
            None => format!("{fallback} (worker terminated)"),
        }
    }

    fn finish(&mut self, outcome: SessionOutcome, mut commands: Vec<CoreCommand>) -> CoreStep {
        self.phase = Phase::Done;
        self.outcome = Some(outcome.clone());
        commands.push(CoreCommand::Finish(outcome));
        CoreStep::stop(commands)
    }
}
