//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use crossbeam_channel::bounded;
use serde_json::{Value, json};
use thiserror::Error;

use playerwatch::core::config::Config;
use playerwatch::core::errors::PwError;
use playerwatch::daemon::loop_main::{DaemonArgs, PresenceDaemon};
use playerwatch::logger::activity::ActivityLoggerHandle;
use playerwatch::presence::tracker::{PresenceTracker, spawn_tracker};
use playerwatch::tail::extract::EventExtractor;
use playerwatch::tail::tailer::LogTailer;

/// playerwatch: who is on the server, and for how long.
#[derive(Debug, Parser)]
#[command(
    name = "pwatch",
    author,
    version,
    about = "Game server presence tracker",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Follow the server log and serve the presence feed.
    Run(RunArgs),
    /// Read archives and the live log once, print who is online, and exit.
    Snapshot(SnapshotArgs),
    /// Print the effective configuration.
    Config,
}

#[derive(Debug, Clone, Args, Default)]
struct RunArgs {
    /// Directory holding the live log and its archives.
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
    /// Feed listen address (host:port).
    #[arg(long, value_name = "ADDR", conflicts_with = "no_feed")]
    listen: Option<String>,
    /// Do not start the RSS endpoint.
    #[arg(long)]
    no_feed: bool,
}

#[derive(Debug, Clone, Args, Default)]
struct SnapshotArgs {
    /// Directory holding the live log and its archives.
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input or configuration.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Json(_) | Self::Io(_) => 2,
        }
    }
}

impl From<PwError> for CliError {
    fn from(err: PwError) -> Self {
        match err {
            PwError::InvalidConfig { .. }
            | PwError::MissingConfig { .. }
            | PwError::ConfigParse { .. } => Self::User(err.to_string()),
            _ => Self::Runtime(err.to_string()),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    match &cli.command {
        Command::Run(args) => run_daemon(cli, args),
        Command::Snapshot(args) => run_snapshot(cli, args),
        Command::Config => run_config(cli),
    }
}

fn load_config(cli: &Cli, log_dir: Option<&PathBuf>) -> Result<Config, CliError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = log_dir {
        config.tail.log_dir.clone_from(dir);
        config.normalize_and_validate()?;
    }
    Ok(config)
}

fn run_daemon(cli: &Cli, args: &RunArgs) -> Result<(), CliError> {
    let mut config = load_config(cli, args.log_dir.as_ref())?;
    if let Some(listen) = &args.listen {
        config.feed.listen_addr.clone_from(listen);
    }
    if args.no_feed {
        config.feed.enabled = false;
    }
    config.normalize_and_validate()?;

    let mut daemon = PresenceDaemon::init(config, &DaemonArgs::default())?;
    let report = daemon.run()?;

    if output_mode(cli) == OutputMode::Json {
        write_json_line(&json!({
            "command": "run",
            "uptime_secs": report.uptime_secs,
            "archives": report.tail.archives,
            "lines": report.tail.lines,
            "events": report.tail.events,
            "truncation_resets": report.tail.truncation_resets,
            "applied": report.tracker.applied,
            "stale": report.tracker.stale,
            "feed_requests": report.feed_requests,
        }))?;
    }
    Ok(())
}

fn run_snapshot(cli: &Cli, args: &SnapshotArgs) -> Result<(), CliError> {
    let config = load_config(cli, args.log_dir.as_ref())?;

    let tracker = PresenceTracker::new(&config.presence, ActivityLoggerHandle::noop());
    let view = tracker.view();
    let (tx, rx) = bounded(config.tail.event_channel_capacity);
    let tracker_join = spawn_tracker(tracker, rx)?;

    let extractor = EventExtractor::with_local_zone()?;
    let mut tailer = LogTailer::new(config.tail.clone(), extractor, ActivityLoggerHandle::noop());
    let backfill = tailer.backfill(&tx);
    drop(tx);
    let tracker_stats = tracker_join
        .join()
        .map_err(|_| CliError::Runtime("tracker thread panicked".to_string()))?;
    let tail_stats = backfill?;

    let presence = view.render();
    match output_mode(cli) {
        OutputMode::Human => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{presence}")?;
        }
        OutputMode::Json => {
            let table = serde_json::to_value(view.snapshot())?;
            write_json_line(&json!({
                "command": "snapshot",
                "presence": presence,
                "online": table["online"],
                "offline": table["offline"],
                "archives": tail_stats.archives,
                "events": tail_stats.events,
                "stale": tracker_stats.stale,
            }))?;
        }
    }
    Ok(())
}

fn run_config(cli: &Cli) -> Result<(), CliError> {
    let config = load_config(cli, None)?;
    match output_mode(cli) {
        OutputMode::Human => {
            println!("# {}", config.paths.config_file.display());
            println!("{}", config.to_toml()?);
        }
        OutputMode::Json => {
            let hash = config.stable_hash()?;
            write_json_line(&json!({
                "command": "config",
                "path": config.paths.config_file.to_string_lossy(),
                "hash": hash,
                "config": serde_json::to_value(&config)?,
            }))?;
        }
    }
    Ok(())
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("PW_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
