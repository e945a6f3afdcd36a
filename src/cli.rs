//! Command-line interface for sortify.
//!
//! This module handles:
//! - Command parsing with clap
//! - Wiring configuration, statistics, and the sorter together
//! - The interactive `watch` loop that drives a [`FileMonitor`]

use crate::config::{Config, ConfigHandle, Snapshot};
use crate::error::{ConfigError, SortError};
use crate::monitor::FileMonitor;
use crate::output::{OutputFormatter, Tone};
use crate::scanner;
use crate::schedule::ScanMode;
use crate::sorter::{SortEvent, Sorter};
use crate::stats::{CategoryTotals, SortingStats};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use thiserror::Error;
use tracing::{info, warn};

/// File holding one JSON line per successfully sorted file.
pub const HISTORY_FILE_NAME: &str = "history.jsonl";

/// Sort downloaded files into dated category folders.
#[derive(Debug, Parser)]
#[command(name = "sortify", version, about)]
pub struct Cli {
    /// Configuration file (default: ~/.sortify/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Watch the source folder and sort files as they finish downloading
    Watch {
        /// Do not sort files already in the source folder on startup
        #[arg(long)]
        no_backlog: bool,
    },
    /// Sort every file currently in a directory
    Sort {
        /// Directory to sort (default: the configured source folder)
        dir: Option<PathBuf>,
    },
    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show what has been sorted so far
    Stats,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Print the active configuration
    Show,
    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the configuration file location
    Path,
}

/// Errors surfaced to the user by the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Sort(#[from] SortError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("configuration already exists at {} (use --force to overwrite)", .0.display())]
    AlreadyExists(PathBuf),
}

/// Commands accepted on stdin while watching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchCommand {
    SortNow,
    Reload,
    Pause,
    Resume,
    Status,
    Quit,
}

impl WatchCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "s" | "sort" => Some(Self::SortNow),
            "r" | "reload" => Some(Self::Reload),
            "p" | "pause" | "stop" => Some(Self::Pause),
            "resume" | "start" => Some(Self::Resume),
            "status" => Some(Self::Status),
            "q" | "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Resolves the configuration file location.
pub fn config_path(cli: &Cli) -> Result<PathBuf, ConfigError> {
    match &cli.config {
        Some(path) => Ok(path.clone()),
        None => Config::default_path(),
    }
}

/// Location of the history file that sits next to `config_path`.
pub fn history_path(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(HISTORY_FILE_NAME)
}

/// Runs the CLI application.
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use sortify::cli::{run_cli, Cli};
///
/// let cli = Cli::parse_from(["sortify", "sort", "/path/to/downloads"]);
/// if let Err(e) = run_cli(cli) {
///     eprintln!("Error: {}", e);
/// }
/// ```
pub fn run_cli(cli: Cli) -> Result<(), CliError> {
    let path = config_path(&cli)?;

    match cli.command {
        Command::Watch { no_backlog } => run_watch(&path, no_backlog),
        Command::Sort { dir } => run_sort(&path, dir.as_deref()),
        Command::Config { action } => run_config(&path, action),
        Command::Stats => run_stats(&path),
    }
}

/// Builds a sorter that records every outcome into the history file.
fn open_sorter(config_path: &Path) -> Result<Sorter, CliError> {
    let handle = ConfigHandle::open(config_path);
    let stats = Arc::new(SortingStats::load_history(&history_path(config_path))?);
    Ok(Sorter::new(handle).with_sink(stats))
}

fn run_sort(config_path: &Path, dir: Option<&Path>) -> Result<(), CliError> {
    let sorter = open_sorter(config_path)?;
    let directory = match dir {
        Some(dir) => dir.to_path_buf(),
        None => sorter.config().snapshot().config().source_folder.clone(),
    };

    OutputFormatter::status(
        Tone::Note,
        &format!("Sorting contents of: {}", directory.display()),
    );

    let (files, _) = scanner::collect_candidates(&sorter, &directory)?;
    if files.is_empty() {
        OutputFormatter::plain("Nothing to sort.");
        return Ok(());
    }

    let pb = OutputFormatter::sort_progress(files.len() as u64);
    let mut sorted: BTreeMap<String, CategoryTotals> = BTreeMap::new();
    let mut failures = Vec::new();

    let summary = scanner::sort_directory_with(&sorter, &directory, |outcome| {
        if outcome.success {
            let totals = sorted.entry(outcome.category.clone()).or_default();
            totals.files += 1;
            totals.bytes += outcome.size_bytes;
        } else if outcome.is_failure() {
            failures.push(OutputFormatter::outcome_line(outcome));
        }
        pb.set_message(
            outcome
                .original_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        );
        pb.inc(1);
    })?;
    pb.finish_and_clear();

    for line in &failures {
        OutputFormatter::plain(line);
    }
    if summary.success > 0 {
        OutputFormatter::category_table("SORTED", &sorted);
    }
    OutputFormatter::scan_summary(&summary);
    Ok(())
}

fn run_watch(config_path: &Path, no_backlog: bool) -> Result<(), CliError> {
    let (event_tx, event_rx) = mpsc::channel::<SortEvent>();
    let sorter = Arc::new(open_sorter(config_path)?.with_sink(event_tx));
    let handle = sorter.config().clone();

    // Prints each finished file; ends once the sorter and its sinks are dropped.
    let notifications = handle.clone();
    thread::spawn(move || {
        for event in event_rx {
            if let SortEvent::Sorted(outcome) = event
                && notifications.snapshot().config().show_notifications
                && !outcome.skipped
            {
                println!("{}", OutputFormatter::outcome_line(&outcome));
            }
        }
    });

    let mut monitor = FileMonitor::new(sorter);
    monitor.start()?;

    OutputFormatter::status(Tone::Done, &describe_mode(&handle.snapshot()));

    let sweep = !no_backlog && handle.snapshot().config().run_at_startup;
    if sweep {
        report_sweep(&monitor);
    }

    OutputFormatter::plain("Commands: sort, reload, pause, resume, status, quit");
    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let Some(command) = WatchCommand::parse(&line) else {
            OutputFormatter::status(Tone::Attention, &format!("Unknown command: {}", line.trim()));
            continue;
        };

        match command {
            WatchCommand::SortNow => report_sweep(&monitor),
            WatchCommand::Reload => match monitor.reload_config() {
                Ok(()) => OutputFormatter::status(Tone::Done, "Configuration reloaded"),
                Err(e) => OutputFormatter::status(
                    Tone::Failed,
                    &format!("Reload failed, keeping previous configuration: {}", e),
                ),
            },
            WatchCommand::Pause => {
                monitor.stop();
                OutputFormatter::status(Tone::Note, "Paused");
            }
            WatchCommand::Resume => match monitor.start() {
                Ok(()) => OutputFormatter::status(Tone::Done, "Resumed"),
                Err(e) => OutputFormatter::status(Tone::Failed, &e.to_string()),
            },
            WatchCommand::Status => {
                let state = if monitor.is_running() { "running" } else { "paused" };
                OutputFormatter::plain(&format!(
                    "Monitor {}, {} file(s) pending. {}",
                    state,
                    monitor.debouncer().pending_count(),
                    describe_mode(&handle.snapshot())
                ));
            }
            WatchCommand::Quit => break,
        }
    }

    monitor.stop();
    info!("Watch finished");
    Ok(())
}

/// What the monitor does with the source folder, e.g. `Watching /dl`.
fn describe_mode(snapshot: &Snapshot) -> String {
    let source = snapshot.config().source_folder.display();
    match snapshot.config().scan_mode {
        ScanMode::Regular => format!("Watching {}", source),
        ScanMode::Scheduled if snapshot.scheduled_times().is_empty() => {
            format!("Scheduled sweeps of {}, no times configured", source)
        }
        ScanMode::Scheduled => {
            let times: Vec<String> = snapshot
                .scheduled_times()
                .iter()
                .map(|time| time.format("%H:%M").to_string())
                .collect();
            format!("Sweeping {} at {}", source, times.join(", "))
        }
    }
}

fn report_sweep(monitor: &FileMonitor) {
    match monitor.sort_now(None) {
        Ok(summary) => OutputFormatter::scan_summary(&summary),
        Err(e) => {
            warn!(error = %e, "bulk sort failed");
            OutputFormatter::status(Tone::Failed, &e.to_string());
        }
    }
}

fn run_config(config_path: &Path, action: ConfigAction) -> Result<(), CliError> {
    match action {
        ConfigAction::Path => {
            OutputFormatter::plain(&config_path.display().to_string());
        }
        ConfigAction::Show => {
            let config = Config::load(config_path)?;
            OutputFormatter::plain(&serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Init { force } => {
            if config_path.exists() && !force {
                return Err(CliError::AlreadyExists(config_path.to_path_buf()));
            }
            Config::default().save(config_path)?;
            OutputFormatter::status(
                Tone::Done,
                &format!("Wrote default configuration to {}", config_path.display()),
            );
        }
    }
    Ok(())
}

fn run_stats(config_path: &Path) -> Result<(), CliError> {
    let stats = SortingStats::load_history(&history_path(config_path))?;
    let summary = stats.summary();
    if summary.total_files == 0 {
        OutputFormatter::plain("No files sorted yet.");
        return Ok(());
    }
    OutputFormatter::stats_summary(&summary);
    if summary.failed_files > 0 {
        OutputFormatter::status(
            Tone::Attention,
            &format!("{} failed move(s)", summary.failed_files),
        );
    }
    Ok(())
}
