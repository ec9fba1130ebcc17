// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `bollettino-host`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "bollettino-host",
    version,
    about = "Provision and supervise the bollettini automation worker.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Bollettino.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Bollettino.toml", global = true)]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `BOLLETTINO_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the resolved artifact, but don't touch anything.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Make sure the worker artifact is installed and print its path.
    Provision,

    /// Count the causali in an input workbook.
    Count {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },

    /// Count, then run the automation for an input workbook.
    ///
    /// Challenge images are written to `[worker].captcha_dir`; type the code
    /// on stdin when asked.
    Run {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },

    /// Check for a newer release of the application.
    Update {
        /// Download the installer when a newer release exists.
        #[arg(long)]
        download: bool,

        /// Launch the downloaded installer and exit (implies --download).
        #[arg(long)]
        install: bool,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
