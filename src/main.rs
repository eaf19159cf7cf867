//! mkv-processor - batch audio/subtitle extraction for Matroska folders
//!
//! Entry point: parses arguments, sets up logging, loads settings once and
//! dispatches to the pipeline.

use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use tracing::{info, warn, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mkv_processor::cli::{Args, Commands, ConfigAction};
use mkv_processor::config::Config;
use mkv_processor::context::{CancelFlag, RunLayout};
use mkv_processor::ledger::ProcessedLedger;
use mkv_processor::prompt::operator_prompt;
use mkv_processor::sync::{self, SyncConfig};
use mkv_processor::workflow::{FileOutcome, RunSummary, Workflow};

const LOG_FILE_NAME: &str = "mkv-processor.log";

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = Args::parse();

    setup_logging(args.verbose)?;
    info!("Starting mkv-processor {}", env!("CARGO_PKG_VERSION"));

    let config = Config::load(args.config.as_deref())?;
    let command = args.command.take().unwrap_or_else(|| args.default_command());

    match command {
        Commands::Process { folder } => {
            let folder = resolve_folder(folder)?;
            info!("Processing folder: {}", folder.display());

            let cancel = CancelFlag::default();
            spawn_interrupt_handler(cancel.clone());

            let workflow = Workflow::new(config, operator_prompt(args.unattended));
            let summary = workflow.process_directory(&folder, cancel).await?;
            print_summary(&summary);
        }
        Commands::Resync { folder } => {
            let folder = resolve_folder(folder)?;
            if SyncConfig::from_settings(&config.sync).is_none() {
                println!("Remote sync is not configured; set a token and repo and enable auto_upload.");
                return Ok(());
            }
            let remote = sync::connect(&config.sync).await;
            let workflow = Workflow::new(config, operator_prompt(args.unattended));
            let written = workflow.resync(&folder, remote).await?;
            println!("Added {} records to the remote log", written);
        }
        Commands::Log { folder } => {
            let folder = resolve_folder(folder)?;
            let layout = RunLayout::resolve(&folder, &config.processing)?;
            print_ledger(&layout.ledger_path())?;
        }
        Commands::Check => {
            let workflow = Workflow::new(config, operator_prompt(true));
            workflow.check_toolchain().await?;
            for line in workflow.toolchain_versions().await? {
                println!("{}", line);
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Path => println!("{}", Config::user_config_path()?.display()),
            ConfigAction::Show => print!("{}", toml::to_string_pretty(&config.redacted())?),
            ConfigAction::Init => {
                let path = Config::user_config_path()?;
                config.save_to_file(&path)?;
                println!("Settings written to {}", path.display());
            }
            ConfigAction::Reset => {
                if Config::reset()? {
                    println!("Settings reset to defaults");
                } else {
                    println!("No settings file to reset");
                }
            }
        },
    }

    Ok(())
}

fn resolve_folder(folder: Option<PathBuf>) -> Result<PathBuf> {
    match folder {
        Some(folder) => Ok(folder),
        None => Ok(std::env::current_dir()?),
    }
}

/// Stop between files on the first Ctrl-C
fn spawn_interrupt_handler(cancel: CancelFlag) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, finishing the current file");
                cancel.store(true, Ordering::SeqCst);
            }
            Err(e) => warn!("Cannot listen for interrupts: {}", e),
        }
    });
}

fn print_summary(summary: &RunSummary) {
    println!("\nRun {}", summary.run_id);
    println!("{}", "-".repeat(60));
    for report in &summary.reports {
        let name = report
            .input
            .file_name()
            .unwrap_or_default()
            .to_string_lossy();
        let status = match &report.outcome {
            FileOutcome::Skipped { previous } => format!("skipped (as {})", previous),
            FileOutcome::Remuxed { output, .. } => format!("remuxed -> {}", output.display()),
            FileOutcome::Renamed { renamed } => format!("renamed -> {}", renamed.display()),
            FileOutcome::Failed { reason } => format!("failed: {}", reason),
            FileOutcome::Blocked { reason } => format!("blocked: {}", reason),
        };
        println!("{:<40} {}", name, status);
        for subtitle in &report.subtitles {
            println!("{:<40}   subtitle {}", "", subtitle.display());
        }
    }
    println!("{}", "-".repeat(60));
    println!(
        "Processed: {}  Skipped: {}  Failed: {}",
        summary.processed(),
        summary.skipped(),
        summary.failed()
    );
    if let Some(snapshot) = &summary.snapshot {
        println!("Run log: {}", snapshot.display());
    }
    if let Some(error) = &summary.sync_error {
        println!("Remote log not updated: {}", error);
    }
    if summary.cancelled {
        println!("Stopped early on request");
    }
}

fn print_ledger(path: &Path) -> Result<()> {
    let entries = ProcessedLedger::open(path)?.entries()?;
    if entries.is_empty() {
        println!("No processed files recorded in {}", path.display());
        return Ok(());
    }

    println!("{:<20} {:<40} {:<40}", "Processed", "Old name", "New name");
    println!("{}", "-".repeat(100));
    for entry in entries {
        println!("{:<20} {:<40} {:<40}", entry.timestamp, entry.old_name, entry.new_name);
    }
    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = Config::app_dir()?.join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Daily rotation; the guard must outlive main
    let file_appender = rolling::daily(&log_dir, LOG_FILE_NAME);
    let (non_blocking_file, guard) = non_blocking(file_appender);
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join(LOG_FILE_NAME).display()
    );

    Ok(())
}
