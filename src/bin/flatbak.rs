//! # flatbak CLI - incremental flat-file backups
//!
//! Command-line front end for the flatbak library.
//!
//! ## Usage
//! ```bash
//! # Run a backup using ./config.yaml (or config.json, or defaults)
//! flatbak
//!
//! # Same, with an explicit config and a progress spinner
//! flatbak --config backup.yaml run --progress
//!
//! # List snapshot archives
//! flatbak list
//!
//! # Preview what retention would delete
//! flatbak prune --dry-run
//! ```
//!
//! ## Exit status
//! - `0`: success (per-file failures are printed but do not fail the run)
//! - `1`: the run failed (metadata directory or archive could not be written)
//! - `2`: fatal configuration error, detected before any file is touched

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::*;
use flatbak::archive::list_archives;
use flatbak::retention::{enforce_retention, plan_retention};
use flatbak::{
    format_bytes, ArchiveOutcome, Backup, BackupConfig, ChangeKind, FlatbakError, RunReport,
    SyncEvent,
};
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, SystemTime};
use tracing_subscriber::EnvFilter;

/// Exit status for a fatal configuration error
const EXIT_CONFIG: u8 = 2;
/// Exit status for a failed run
const EXIT_FAILURE: u8 = 1;

/// flatbak - mirror flat files, log line changes, keep rotating snapshots
#[derive(Parser)]
#[command(name = "flatbak")]
#[command(version)]
#[command(about = "Incremental flat-file backup with change logs and rotating zip snapshots")]
#[command(long_about = None)]
struct Cli {
    /// Config file (YAML or JSON); defaults to config.yaml / config.json
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the source folder
    #[arg(long, global = true)]
    source: Option<PathBuf>,

    /// Override the backup folder
    #[arg(long, global = true)]
    backup: Option<PathBuf>,

    /// Override the number of archives to keep
    #[arg(long, global = true, allow_negative_numbers = true)]
    max_zips: Option<i64>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync, archive and apply retention (default)
    Run {
        /// Show a progress spinner
        #[arg(long)]
        progress: bool,

        /// Store a copy of this program in the metadata folder after syncing
        #[arg(long)]
        trace_program: bool,
    },

    /// List snapshot archives, newest first
    #[command(alias = "ls")]
    List,

    /// Apply the retention policy without running a backup
    Prune {
        /// Only show what would be deleted
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the resolved configuration as YAML
    ShowConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    // any failure to read the configuration is a configuration error
    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e.user_message());
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    match run(cli.command, config) {
        Ok(code) => code,
        Err(e) => {
            let config_error = e
                .downcast_ref::<FlatbakError>()
                .map(FlatbakError::is_config_error)
                .unwrap_or(false);
            let message = e
                .downcast_ref::<FlatbakError>()
                .map(FlatbakError::user_message)
                .unwrap_or_else(|| format!("{:#}", e));
            eprintln!("{}: {}", "Error".red().bold(), message);
            ExitCode::from(if config_error { EXIT_CONFIG } else { EXIT_FAILURE })
        }
    }
}

fn init_logging(verbose: bool) {
    if verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Main command runner
fn run(command: Option<Commands>, config: BackupConfig) -> anyhow::Result<ExitCode> {
    match command.unwrap_or(Commands::Run {
        progress: false,
        trace_program: false,
    }) {
        Commands::Run {
            progress,
            trace_program,
        } => cmd_run(config, progress, trace_program),
        Commands::List => cmd_list(&config).map(|_| ExitCode::SUCCESS),
        Commands::Prune { dry_run } => cmd_prune(&config, dry_run).map(|_| ExitCode::SUCCESS),
        Commands::ShowConfig => {
            print!("{}", config.to_yaml()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Load the config file and apply command-line overrides
fn resolve_config(cli: &Cli) -> flatbak::Result<BackupConfig> {
    let mut config = flatbak::config::load(cli.config.as_deref())?;
    if let Some(source) = &cli.source {
        config.source_folder = source.clone();
    }
    if let Some(backup) = &cli.backup {
        config.backup_folder = backup.clone();
    }
    if let Some(max_zips) = cli.max_zips {
        config.max_zips = max_zips;
    }
    Ok(config.normalized())
}

/// Run a full backup
fn cmd_run(config: BackupConfig, show_progress: bool, trace_program: bool) -> anyhow::Result<ExitCode> {
    let backup = Backup::new(config)?;

    println!("{}", "Running backup...".blue().bold());
    println!("  Source: {}", backup.config().source_folder.display().to_string().cyan());
    println!("  Backup: {}", backup.config().backup_folder.display().to_string().cyan());

    let progress = if show_progress {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message("Scanning files...");
        Some(pb)
    } else {
        None
    };

    let report = backup.run_with_events(|event| {
        let line = match event {
            SyncEvent::Copied { path, kind } => Some(match kind {
                ChangeKind::Created => format!("{} {}", "Copied (new):".green(), path.display()),
                ChangeKind::Modified => format!("{} {}", "Copied:".green(), path.display()),
            }),
            SyncEvent::BinaryCopied { path } => Some(format!(
                "{} {} {}",
                "Copied:".green(),
                path.display(),
                "(binary file, diff/log skipped)".dimmed()
            )),
            SyncEvent::Unchanged { path } => {
                if let Some(pb) = &progress {
                    pb.set_message(format!("Checked {}", path.display()));
                }
                None
            }
            SyncEvent::Failed { path, message } => Some(format!(
                "{} {}: {}",
                "Error processing file".red(),
                path.display(),
                message
            )),
        };
        if let Some(line) = line {
            match &progress {
                Some(pb) => pb.println(line),
                None => println!("{}", line),
            }
        }
    });

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    if trace_program && report.setup_error.is_none() {
        match std::env::current_exe() {
            Ok(exe) => match flatbak::trace::record_program_copy(&backup.meta_dir(), &exe, report.timestamp) {
                Ok(path) => println!("Program backed up to {}", path.display()),
                Err(e) => eprintln!("{} {}", "Error backing up program:".yellow(), e),
            },
            Err(e) => eprintln!("{} {}", "Cannot locate program:".yellow(), e),
        }
    }

    print_summary(&report);

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_FAILURE))
    }
}

fn print_summary(report: &RunReport) {
    if let Some(err) = &report.setup_error {
        println!("{} {}", "✗".red().bold(), err.red());
        return;
    }

    let sync = &report.sync;
    println!(
        "{} Backup finished in {}",
        if report.is_success() { "✓".green().bold() } else { "✗".red().bold() },
        format_duration(Duration::from_millis(report.duration_ms)).to_string().cyan()
    );
    println!(
        "  Files: {} examined, {} copied ({} new, {} changed, {} binary), {} unchanged",
        sync.files_examined,
        sync.copied_count().to_string().yellow(),
        sync.copied_new,
        sync.copied_modified,
        sync.copied_binary,
        sync.unchanged
    );

    match &report.archive {
        ArchiveOutcome::Created(entry) => {
            println!(
                "  Zipped files saved to {} ({})",
                entry.path.display().to_string().cyan(),
                format_bytes(entry.size)
            );
            for skipped in &entry.skipped {
                println!(
                    "  {} {}: {}",
                    "Not archived".yellow(),
                    skipped.path.display(),
                    skipped.message
                );
            }
        }
        ArchiveOutcome::Empty => println!("  {}", "No files to archive".yellow()),
        ArchiveOutcome::Failed(msg) => println!("  {} {}", "Error creating zip file:".red(), msg),
        ArchiveOutcome::NotRun => {}
    }

    if let Some(retention) = &report.retention {
        if !retention.deleted.is_empty() {
            println!("  Removed {} old archive(s)", retention.deleted.len());
        }
        for failure in &retention.failures {
            println!(
                "  {} {}: {}",
                "Error deleting file".red(),
                failure.path.display(),
                failure.message
            );
        }
    }
    if let Some(err) = &report.retention_error {
        println!("  {} {}", "Retention skipped:".yellow(), err);
    }

    if sync.has_failures() {
        println!("  {} {} file(s) failed", "Warning:".yellow().bold(), sync.failures.len());
    }
    println!("  Change log saved to {}", report.change_log.display());
}

/// List archives in the metadata folder
fn cmd_list(config: &BackupConfig) -> anyhow::Result<()> {
    let meta_dir = config.meta_dir();
    if !meta_dir.is_dir() {
        println!("{}", "No archives found.".yellow());
        return Ok(());
    }
    let archives = list_archives(&meta_dir)
        .with_context(|| format!("listing archives in {}", meta_dir.display()))?;
    if archives.is_empty() {
        println!("{}", "No archives found.".yellow());
        return Ok(());
    }

    println!("{}", "Archives:".blue().bold());
    let now = SystemTime::now();
    for archive in &archives {
        let age = now
            .duration_since(archive.modified)
            .map(|d| Duration::from_secs(d.as_secs()))
            .unwrap_or_default();
        println!(
            "  {} {:>10} {}",
            archive.name.yellow(),
            format_bytes(archive.size),
            format!("{} ago", format_duration(age)).dimmed()
        );
    }
    println!(
        "\n{}",
        format!("{} archive(s), keeping at most {}", archives.len(), config.max_zips.max(0)).dimmed()
    );
    Ok(())
}

/// Apply retention only
fn cmd_prune(config: &BackupConfig, dry_run: bool) -> anyhow::Result<()> {
    let meta_dir = config.meta_dir();
    ensure_meta_dir(&meta_dir)?;

    if dry_run {
        let plan = plan_retention(&meta_dir, config.max_zips)?;
        if plan.deleted.is_empty() {
            println!("{}", "Nothing to prune.".green());
        }
        for path in &plan.deleted {
            println!("  would delete {}", path.display().to_string().yellow());
        }
        return Ok(());
    }

    let report = enforce_retention(&meta_dir, config.max_zips)?;
    for path in &report.deleted {
        println!("  deleted {}", path.display().to_string().yellow());
    }
    for failure in &report.failures {
        eprintln!(
            "  {} {}: {}",
            "Error deleting file".red(),
            failure.path.display(),
            failure.message
        );
    }
    println!(
        "{} Kept {} archive(s), deleted {}",
        "✓".green().bold(),
        report.kept.len(),
        report.deleted.len()
    );
    Ok(())
}

fn ensure_meta_dir(meta_dir: &Path) -> anyhow::Result<()> {
    if !meta_dir.is_dir() {
        anyhow::bail!("no metadata folder at {}", meta_dir.display());
    }
    Ok(())
}
