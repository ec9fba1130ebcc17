// src/protocol/mod.rs

//! Worker line protocol.
//!
//! The worker writes one JSON object per line on stdout, each shaped as
//! `{"type": "<kind>", "payload": <any>}`. The host writes single free-form
//! lines to the worker's stdin (challenge-response codes).
//!
//! - [`line_buffer`] reassembles arbitrary stdout chunks into complete lines.
//! - [`channel`] decodes lines into [`Message`]s and pumps the child streams
//!   into the event sink.

pub mod channel;
pub mod line_buffer;

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProtocolDecodeError;

pub use channel::{LineProtocolChannel, pump_stderr, pump_stdout, write_line};
pub use line_buffer::LineBuffer;

/// One decoded worker message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl Message {
    pub fn new(kind: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            kind: kind.into(),
            payload: payload.into(),
        }
    }

    /// An `error` message carrying free text.
    pub fn error(text: impl Into<String>) -> Self {
        Self::new(kinds::ERROR, Value::String(text.into()))
    }

    /// Typed view of this message.
    pub fn event(&self) -> WorkerEvent {
        WorkerEvent::from(self)
    }
}

/// Decode one complete (already trimmed) stdout line.
pub fn decode_line(line: &str) -> Result<Message, ProtocolDecodeError> {
    serde_json::from_str(line).map_err(|source| ProtocolDecodeError {
        line: line.to_string(),
        source,
    })
}

/// Message `type` values the worker is known to emit.
pub mod kinds {
    pub const EXCEL_FILE_SELECTED: &str = "excel-file-selected";
    pub const CAUSALI_COUNT: &str = "causali_count";
    pub const COLUMN_B_NOT_EMPTY: &str = "column_b_not_empty";
    pub const MAIN_STATUS: &str = "main_status";
    pub const GLOBAL_PROGRESS: &str = "global_progress";
    pub const CURRENT_TASK: &str = "current_task";
    pub const TASK_PROGRESS: &str = "task_progress";
    pub const CAPTCHA_REQUIRED: &str = "captcha_required";
    pub const FINISHED: &str = "finished";
    pub const ERROR: &str = "error";
    pub const INFO: &str = "info";
    pub const WARNING: &str = "warning";
}

/// Typed view of a [`Message`] for the kinds listed in [`kinds`].
///
/// Unknown kinds are kept as [`WorkerEvent::Other`] so newer workers don't
/// break older hosts.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    ExcelFileSelected(String),
    CausaliCount(u64),
    ColumnBNotEmpty {
        filled_count: u64,
        filled_rows: Vec<u64>,
    },
    MainStatus(String),
    /// 0–100.
    GlobalProgress(f64),
    CurrentTask(String),
    /// 0–100.
    TaskProgress(f64),
    /// Base64-encoded challenge image.
    CaptchaRequired(String),
    Finished(Value),
    Error(String),
    Info(String),
    Warning(String),
    Other(Message),
}

impl From<&Message> for WorkerEvent {
    fn from(msg: &Message) -> Self {
        let payload = &msg.payload;
        match msg.kind.as_str() {
            kinds::EXCEL_FILE_SELECTED => WorkerEvent::ExcelFileSelected(text_of(payload)),
            kinds::CAUSALI_COUNT => {
                let count = payload
                    .get("count")
                    .and_then(Value::as_u64)
                    .or_else(|| payload.as_u64())
                    .unwrap_or(0);
                WorkerEvent::CausaliCount(count)
            }
            kinds::COLUMN_B_NOT_EMPTY => WorkerEvent::ColumnBNotEmpty {
                filled_count: payload
                    .get("filled_count")
                    .and_then(Value::as_u64)
                    .unwrap_or(0),
                filled_rows: payload
                    .get("filled_rows")
                    .and_then(Value::as_array)
                    .map(|rows| rows.iter().filter_map(Value::as_u64).collect())
                    .unwrap_or_default(),
            },
            kinds::MAIN_STATUS => WorkerEvent::MainStatus(text_of(payload)),
            kinds::GLOBAL_PROGRESS => WorkerEvent::GlobalProgress(percent_of(payload)),
            kinds::CURRENT_TASK => WorkerEvent::CurrentTask(text_of(payload)),
            kinds::TASK_PROGRESS => WorkerEvent::TaskProgress(percent_of(payload)),
            kinds::CAPTCHA_REQUIRED => WorkerEvent::CaptchaRequired(text_of(payload)),
            kinds::FINISHED => WorkerEvent::Finished(payload.clone()),
            kinds::ERROR => WorkerEvent::Error(text_of(payload)),
            kinds::INFO => WorkerEvent::Info(text_of(payload)),
            kinds::WARNING => WorkerEvent::Warning(text_of(payload)),
            _ => WorkerEvent::Other(msg.clone()),
        }
    }
}

static FIRST_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("static regex is valid"));

/// Number of completed items reported by a `finished` payload.
///
/// A numeric payload is the count itself; a text payload such as
/// `"Completed 12 items"` yields its first run of digits.
pub fn completed_count(payload: &Value) -> Option<u64> {
    match payload {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => FIRST_NUMBER
            .find(s)
            .and_then(|m| m.as_str().parse().ok()),
        _ => None,
    }
}

fn text_of(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn percent_of(payload: &Value) -> f64 {
    payload.as_f64().unwrap_or(0.0).clamp(0.0, 100.0)
}
