//! jradb-sync - mirror JRA-DB datasets into cloud storage

use anyhow::Result;
use clap::Parser;
use jradb_common::logging::{init_logging, LogConfig, LogLevel};
use jradb_sync::config::SyncConfig;
use jradb_sync::sync::sync_once;
use jradb_sync::{storage, SyncError};
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "jradb-sync")]
#[command(author, version, about = "Incremental JRA-DB dataset sync")]
struct Cli {
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("jradb-sync")
        .build()
        .with_env_overrides()?;
    let _guard = init_logging(&log_config)?;

    // `_guard` has to be dropped before the process ends to flush file logs
    match run().await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            error!(error = %e, fatal = e.is_fatal(), "Sync aborted");
            eprintln!("jradb-sync: {e}");
            Ok(ExitCode::FAILURE)
        },
    }
}

async fn run() -> std::result::Result<(), SyncError> {
    let config = SyncConfig::load()?;
    let enabled: Vec<&str> = config.registry.iter().map(|c| c.code()).collect();
    info!(
        categories = config.registry.len(),
        enabled = %enabled.join(","),
        backend = config.storage.backend(),
        "Configuration loaded"
    );

    let store = storage::connect(&config.storage, &config.http).await?;
    let report = sync_once(&config, store).await?;
    info!(
        watermark = %report.final_watermark,
        files = report.files_published(),
        "Done"
    );
    Ok(())
}
