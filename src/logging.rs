// src/logging.rs

//! Diagnostics on stderr; stdout is reserved for the JSON event stream.
//!
//! The filter comes from, in order:
//! 1. `--log-level`, applied to the host with the HTTP stack held at `warn`
//! 2. `BOLLETTINO_LOG`, either a bare level (`debug`, `warning`) or full
//!    `EnvFilter` directives such as `bollettino_host::exec=trace,info`
//! 3. `info` for the host, HTTP stack at `warn`

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

/// Environment variable consulted when no `--log-level` is given.
pub const LOG_ENV: &str = "BOLLETTINO_LOG";

/// Crates that log every connection and frame at `debug` while the
/// artifact or an update is downloaded.
const HTTP_STACK: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "rustls"];

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env = std::env::var(LOG_ENV).ok();
    let directives = filter_directives(cli_level, env.as_deref());
    let filter = EnvFilter::try_new(&directives)
        .or_else(|_| EnvFilter::try_new(level_directives("info")))
        .map_err(|err| anyhow::anyhow!("building log filter: {err}"))?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("installing log subscriber: {err}"))?;

    tracing::debug!(%directives, "logging initialised");
    Ok(())
}

/// Directive string for the given CLI level and `BOLLETTINO_LOG` value.
fn filter_directives(cli_level: Option<LogLevel>, env: Option<&str>) -> String {
    if let Some(level) = cli_level {
        return level_directives(level_name(level));
    }
    match env.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => match parse_level_str(value) {
            Some(level) => level_directives(level),
            None => value.to_string(),
        },
        None => level_directives("info"),
    }
}

/// `level` for everything except the HTTP stack, which stays at `warn`
/// unless tracing everything.
fn level_directives(level: &str) -> String {
    if level == "trace" {
        return level.to_string();
    }
    let mut directives = level.to_string();
    for target in HTTP_STACK {
        directives.push_str(&format!(",{target}=warn"));
    }
    directives
}

fn level_name(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

fn parse_level_str(s: &str) -> Option<&'static str> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some("error"),
        "warn" | "warning" => Some("warn"),
        "info" => Some("info"),
        "debug" => Some("debug"),
        "trace" => Some("trace"),
        _ => None,
    }
}
