// src/exec/operation.rs

use std::path::{Path, PathBuf};

/// Worker invocations the host knows how to drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// One-shot: reports `causali_count` (or an error) and exits.
    CountCausali(PathBuf),
    /// Long-running: streams progress, may ask for a challenge code on stdin,
    /// ends with `finished` or `error`.
    RunAutomation(PathBuf),
}

impl Operation {
    pub const COUNT_FLAG: &'static str = "--count-causali";
    pub const RUN_FLAG: &'static str = "--run-automation";

    pub fn flag(&self) -> &'static str {
        match self {
            Operation::CountCausali(_) => Self::COUNT_FLAG,
            Operation::RunAutomation(_) => Self::RUN_FLAG,
        }
    }

    pub fn input(&self) -> &Path {
        match self {
            Operation::CountCausali(input) | Operation::RunAutomation(input) => input,
        }
    }

    /// Command-line arguments for the worker executable.
    pub fn args(&self) -> Vec<String> {
        vec![
            self.flag().to_string(),
            self.input().to_string_lossy().into_owned(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_worker_arguments() {
        let op = Operation::RunAutomation(PathBuf::from("data/bollettini.xlsx"));
        assert_eq!(op.args(), vec!["--run-automation", "data/bollettini.xlsx"]);

        let op = Operation::CountCausali(PathBuf::from("in.xlsx"));
        assert_eq!(op.args()[0], "--count-causali");
    }
}
