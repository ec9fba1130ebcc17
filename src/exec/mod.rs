// src/exec/mod.rs

//! Worker process execution.
//!
//! - [`supervisor`] owns the single worker process: it provisions the
//!   artifact, spawns the executable, pumps its streams into the event sink
//!   and kills it on request.
//! - [`operation`] maps the two worker invocations to command-line arguments.

pub mod operation;
pub mod supervisor;

pub use operation::Operation;
pub use supervisor::{ProcessSupervisor, WorkerExit, WorkerHandle};
