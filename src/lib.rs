// src/lib.rs

pub mod artifact;
pub mod cli;
pub mod config;
pub mod download;
pub mod engine;
pub mod errors;
pub mod events;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod protocol;
pub mod types;
pub mod update;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::artifact::{ArtifactProvisioner, ZipExtractor};
use crate::cli::{CliArgs, Command};
use crate::config::ConfigFile;
use crate::config::loader::load_and_validate;
use crate::download::HttpDownloader;
use crate::engine::{HostEvent, SessionCore, SessionMode, SessionRuntime};
use crate::engine::runtime::write_message;
use crate::events::{AppEvent, EventSink};
use crate::exec::ProcessSupervisor;
use crate::fs::RealFileSystem;
use crate::update::{GitHubReleaseFeed, ProcessInstaller, UpdateCoordinator};

/// Capacity of the presentation event channel.
const EVENT_CAPACITY: usize = 256;

const USER_AGENT: &str = concat!("bollettino-host/", env!("CARGO_PKG_VERSION"));

/// High-level entry point used by `main.rs`.
///
/// Loads the config and dispatches the subcommand. Returns the process exit
/// code.
pub async fn run(args: CliArgs) -> Result<i32> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config {:?}", config_path))?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(0);
    }

    match args.command {
        Command::Provision => provision(&cfg).await,
        Command::Count { input } => run_session(&cfg, SessionMode::Count, input).await,
        Command::Run { input } => run_session(&cfg, SessionMode::Run, input).await,
        Command::Update { download, install } => update(&cfg, download || install, install).await,
    }
}

/// Production provisioner for the configured artifact.
pub fn build_provisioner(cfg: &ConfigFile, sink: EventSink) -> Result<ArtifactProvisioner> {
    let provisioner = ArtifactProvisioner::new(
        cfg.artifact_descriptor(),
        Arc::new(RealFileSystem),
        Arc::new(ZipExtractor),
        sink,
    );

    if cfg.artifact.remote_url.is_none() {
        return Ok(provisioner);
    }
    let downloader = HttpDownloader::with_user_agent(USER_AGENT)?;
    let download_dir = cfg.resolve(&cfg.artifact.install_dir).with_extension("download");
    Ok(provisioner.with_downloader(Arc::new(downloader), download_dir))
}

async fn provision(cfg: &ConfigFile) -> Result<i32> {
    let (sink, events_rx) = EventSink::channel(EVENT_CAPACITY);
    let printer = spawn_printer(events_rx);

    let provisioner = build_provisioner(cfg, sink)?;
    let result = provisioner.ensure_ready().await;
    drop(provisioner);
    printer.await.context("event printer task failed")?;

    match result {
        Ok(path) => {
            println!("{}", path.display());
            Ok(0)
        }
        Err(err) => {
            warn!(error = %err, "artifact not ready");
            Ok(1)
        }
    }
}

async fn run_session(cfg: &ConfigFile, mode: SessionMode, input: PathBuf) -> Result<i32> {
    let (sink, events_rx) = EventSink::channel(EVENT_CAPACITY);
    let provisioner = Arc::new(build_provisioner(cfg, sink.clone())?);
    let supervisor = Arc::new(ProcessSupervisor::new(provisioner, sink));

    let (control_tx, control_rx) = mpsc::channel::<HostEvent>(16);

    // stdin lines → challenge codes.
    {
        let tx = control_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(HostEvent::UserInput(line)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("stdin closed");
                        break;
                    }
                    Err(err) => {
                        warn!(error = %err, "reading stdin failed");
                        break;
                    }
                }
            }
        });
    }

    // Ctrl-C → graceful shutdown.
    {
        let tx = control_tx;
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            let _ = tx.send(HostEvent::ShutdownRequested).await;
        });
    }

    let runtime = SessionRuntime::new(
        SessionCore::new(mode),
        supervisor,
        input,
        cfg.captcha_dir(),
        events_rx,
        control_rx,
        tokio::io::stdout(),
    );
    let (outcome, _stdout) = runtime.run().await?;
    Ok(outcome.exit_code())
}

async fn update(cfg: &ConfigFile, download: bool, install: bool) -> Result<i32> {
    let Some(feed_url) = cfg.update.feed_url.as_deref().filter(|_| cfg.update.enabled) else {
        info!("updates disabled in config");
        return Ok(0);
    };

    let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
    let (sink, events_rx) = EventSink::channel(EVENT_CAPACITY);
    let printer = spawn_printer(events_rx);

    let mut coordinator = UpdateCoordinator::new(
        Arc::new(GitHubReleaseFeed::new(client.clone(), feed_url)),
        Arc::new(HttpDownloader::new(client)),
        Arc::new(ProcessInstaller::new(cfg.update.installer_args.clone())),
        cfg.update_settings(),
        sink,
    );

    let code = drive_update(&mut coordinator, download, install).await;
    drop(coordinator);
    printer.await.context("event printer task failed")?;
    Ok(code)
}

async fn drive_update(coordinator: &mut UpdateCoordinator, download: bool, install: bool) -> i32 {
    match coordinator.check_for_updates().await {
        Ok(Some(_)) if download => {}
        Ok(_) => return 0,
        Err(_) => return 1,
    }
    if coordinator.download_update().await.is_err() {
        return 1;
    }
    if !install {
        return 0;
    }
    match coordinator.install_update().await {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

/// Print every event as a JSON line on stdout until all senders are gone.
fn spawn_printer(mut events_rx: mpsc::Receiver<AppEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(event) = events_rx.recv().await {
            if let Err(err) = write_message(&mut stdout, &event.to_message()).await {
                warn!(error = %err, "failed to write event to stdout");
                break;
            }
        }
    })
}

/// Simple dry-run output: print the resolved artifact and update settings.
fn print_dry_run(cfg: &ConfigFile) {
    let descriptor = cfg.artifact_descriptor();

    println!("bollettino-host dry-run");
    println!("  config dir = {}", cfg.base_dir().display());
    println!();

    println!("artifact {}:", descriptor.name);
    println!("  expected version: {}", descriptor.expected_version);
    println!("  install dir: {}", descriptor.install_dir.display());
    println!("  executables: {:?}", descriptor.candidate_executables);
    if let Some(ref bundled) = descriptor.source.bundled {
        println!("  bundled package: {}", bundled.display());
    }
    if let Some(ref remote) = descriptor.source.remote {
        println!("  remote package: {}", remote.url);
        if let Some(ref checksum) = remote.checksum {
            println!("  checksum: {checksum}");
        }
    }

    let state = descriptor.probe(&RealFileSystem);
    println!(
        "  installed: {} (version {})",
        state.executable_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "no".to_string()),
        state.installed_version.as_deref().unwrap_or("none")
    );
    println!();

    println!("update:");
    println!("  enabled: {}", cfg.update.enabled);
    println!("  current version: {}", cfg.current_version());
    if let Some(ref url) = cfg.update.feed_url {
        println!("  feed: {url}");
    }
    println!("  asset suffix: {}", cfg.update.asset_suffix);
    println!("  staging dir: {}", cfg.staging_dir().display());
    println!();

    println!("worker:");
    println!("  captcha dir: {}", cfg.captcha_dir().display());

    debug!("dry-run complete (nothing executed)");
}
