//! pakexport - Merge base and patch game archives and export selected files
//!
//! Main entry point for the command-line tool.
//!
//! # Overview
//!
//! Each export profile names a paks directory, an output directory and a list
//! of export rules. For every selected profile the tool merges the archives in
//! the paks directory by patch number, exports the files matched by its rules,
//! and optionally records a checkpoint so the next run only exports files
//! whose size changed.
//!
//! # Execution Flow
//!
//! 1. Parse the command line and load settings (`pakexport.yaml`, `PAKEXPORT_*`)
//! 2. Initialize logging → logs/pakexport.<date>
//! 3. Select profiles: named files, `--all`, or the default `config` file
//! 4. Create a tokio runtime and run each profile in sequence
//! 5. Shutdown the runtime with a 5s timeout
//!
//! A failed profile is logged and the next profile still runs. The process
//! exits with an error if any profile failed.
//!
//! # Configuration Files
//!
//! Expected in the configs directory (default `configs/`):
//! - `config.json`: default profile list
//! - any other `*.json`, `*.yaml` or `*.yml`: selectable by name

use anyhow::{Result, bail};
use camino::Utf8PathBuf;
use clap::Parser;
use pakexport::services::CheckpointStore;
use pakexport::{APP_NAME, ConfigManager, ExportPipeline, ExporterRegistry, VERSION};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Export files from merged base and patch game archives.
#[derive(Parser, Debug)]
#[command(name = "pakexport", version, about)]
struct Cli {
    /// Profile files to run, by name (e.g. `mygame` for `configs/mygame.json`)
    names: Vec<String>,

    /// Run every profile file in the configs directory
    #[arg(long, conflicts_with = "names")]
    all: bool,

    /// List profile files and their game titles, then exit
    #[arg(long)]
    list: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Default worker limit for profiles without `maxWorkers`
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    workers: Option<u16>,

    /// Settings file
    #[arg(long, default_value = "pakexport.yaml")]
    settings: Utf8PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = ConfigManager::load_settings(&cli.settings)?;
    if cli.debug {
        settings.debug = true;
    }
    if let Some(workers) = cli.workers {
        settings.max_workers = usize::from(workers);
    }

    // Keep the guard alive until exit so buffered log lines are flushed
    let _guard = pakexport::logging::setup_logging_with_console(
        settings.logs_dir.as_str(),
        APP_NAME,
        settings.debug,
        true,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let config_manager = ConfigManager::new(&settings.configs_dir)?;

    if cli.list {
        for (file_name, titles) in config_manager.describe_profile_files()? {
            if titles.is_empty() {
                println!("{}", file_name);
            } else {
                println!("{}: {}", file_name, titles.join(", "));
            }
        }
        return Ok(());
    }

    let profiles = if cli.all {
        config_manager.load_all()?
    } else if cli.names.is_empty() {
        config_manager.load_default()
    } else {
        config_manager.load_named(&cli.names)
    };

    if profiles.is_empty() {
        tracing::warn!("No export profiles loaded from {}", config_manager.configs_dir());
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("pakexport-worker")
        .build()?;

    let pipeline = ExportPipeline::new(
        CheckpointStore::new(settings.checkpoints_dir.clone()),
        Arc::new(ExporterRegistry::with_defaults()),
    )
    .with_default_workers(settings.max_workers);

    let start = Instant::now();
    let mut failed = 0usize;

    runtime.block_on(async {
        for profile in &profiles {
            if let Err(e) = pipeline.run_profile(profile).await {
                tracing::error!("Profile {} failed: {:#}", profile.label(), e);
                failed += 1;
            }
        }
    });

    tracing::info!(
        "Processed {} profile(s) in {:.2} seconds",
        profiles.len(),
        start.elapsed().as_secs_f64()
    );

    runtime.shutdown_timeout(Duration::from_secs(5));

    if failed > 0 {
        bail!("{} of {} profile(s) failed", failed, profiles.len());
    }
    Ok(())
}
