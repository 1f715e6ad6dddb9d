//! Per-profile export pipeline.
//!
//! One call to [`ExportPipeline::run_profile`] performs a full export pass:
//! mount archives, build the overlay table, compile rules, load the comparison
//! checkpoint, dispatch export jobs, optionally save a fresh checkpoint, and
//! log the run summary. Any error returned here is scoped to that profile.

use crate::metrics::CounterTotals;
use crate::models::ExportProfile;
use crate::services::archive::{ArchiveMount, ArchiveSource, LooseArchiveMount};
use crate::services::checkpoint::CheckpointStore;
use crate::services::dispatch::{DispatchOptions, Dispatcher, ExportFailure, default_worker_count};
use crate::services::exporter::{ExporterRegistry, OutputLayout};
use crate::services::overlay::OverlayTable;
use crate::services::rules::RuleSet;
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use std::sync::Arc;

/// Outcome of one profile run.
#[derive(Debug, Clone)]
pub struct ProfileReport {
    pub game_title: String,
    pub totals: CounterTotals,

    /// Whether a comparison checkpoint was loaded
    pub checkpoint_active: bool,

    /// Checkpoint written by this run, if one was requested and saved
    pub checkpoint_path: Option<Utf8PathBuf>,

    pub failures: Vec<ExportFailure>,
}

/// Runs export profiles against one checkpoint store and exporter registry.
pub struct ExportPipeline {
    mount: Arc<dyn ArchiveMount>,
    registry: Arc<ExporterRegistry>,
    store: CheckpointStore,
    default_workers: usize,
}

impl ExportPipeline {
    /// Pipeline over loose archives with the given store and registry.
    pub fn new(store: CheckpointStore, registry: Arc<ExporterRegistry>) -> Self {
        Self {
            mount: Arc::new(LooseArchiveMount::default()),
            registry,
            store,
            default_workers: default_worker_count(),
        }
    }

    /// Replace the archive mount.
    pub fn with_mount(mut self, mount: impl ArchiveMount + 'static) -> Self {
        self.mount = Arc::new(mount);
        self
    }

    /// Worker limit for profiles that don't set `maxWorkers`.
    pub fn with_default_workers(mut self, workers: usize) -> Self {
        self.default_workers = workers.max(1);
        self
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Mount the profile's paks directory and run it.
    pub async fn run_profile(&self, profile: &ExportProfile) -> Result<ProfileReport> {
        log_profile_header(profile);

        let rules = compile(profile)?;

        let mount = Arc::clone(&self.mount);
        let paks_dir = profile.paks_dir.clone();
        let sources = tokio::task::spawn_blocking(move || mount.mount(&paks_dir))
            .await
            .context("Archive mount task failed")?
            .with_context(|| format!("Failed to mount archives in {}", profile.paks_dir))?;

        self.execute(profile, rules, &sources).await
    }

    /// Run a profile against already opened sources; `paksDir` is not read.
    pub async fn run_sources<S: ArchiveSource>(
        &self,
        profile: &ExportProfile,
        sources: &[S],
    ) -> Result<ProfileReport> {
        log_profile_header(profile);

        let rules = compile(profile)?;
        self.execute(profile, rules, sources).await
    }

    async fn execute<S: ArchiveSource>(
        &self,
        profile: &ExportProfile,
        rules: RuleSet,
        sources: &[S],
    ) -> Result<ProfileReport> {
        let table = OverlayTable::build(sources).context("Failed to merge archives")?;
        if table.is_empty() {
            tracing::warn!("No files found in {} archive(s)", sources.len());
        }

        let checkpoint = Arc::new(
            self.store
                .load(profile.checkpoint_identifier(), &profile.game_title),
        );
        let checkpoint_active = checkpoint.is_active();

        let options = DispatchOptions {
            max_workers: profile.max_workers.unwrap_or(self.default_workers),
            log_outputs: profile.log_outputs,
        };
        let layout = OutputLayout::new(profile.output_dir.clone(), profile.keep_directory_structure);
        let dispatcher = Dispatcher::new(Arc::clone(&self.registry), layout, options);

        let report = dispatcher.run(&table, Arc::new(rules), checkpoint).await;

        let checkpoint_path = if profile.create_new_checkpoint {
            match self.store.save(&report.snapshot, &profile.game_title) {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::error!("Failed to save checkpoint: {}", e);
                    None
                }
            }
        } else {
            None
        };

        report.totals.log_summary(checkpoint_active);
        for failure in &report.failures {
            tracing::debug!("Failed: {} ({})", failure.logical_path, failure.message);
        }

        Ok(ProfileReport {
            game_title: profile.game_title.clone(),
            totals: report.totals,
            checkpoint_active,
            checkpoint_path,
            failures: report.failures,
        })
    }
}

fn compile(profile: &ExportProfile) -> Result<RuleSet> {
    profile
        .validate()
        .with_context(|| format!("Invalid profile {}", profile.label()))?;

    let rules = RuleSet::from_config(&profile.export, &profile.exclude)
        .with_context(|| format!("Invalid export rules in {}", profile.label()))?;

    if rules.is_empty() {
        tracing::warn!("Profile has no export rules; nothing will be exported");
    }
    Ok(rules)
}

fn log_profile_header(profile: &ExportProfile) {
    tracing::info!("Config: {}", profile.label());
    tracing::info!("Game: {}", profile.game_title);
    tracing::info!("Paks directory: {}", profile.paks_dir);
    tracing::info!("Output directory: {}", profile.output_dir);
    tracing::info!("Log outputs: {}", profile.log_outputs);
    tracing::info!("Keep directory structure: {}", profile.keep_directory_structure);
    tracing::info!("Create new checkpoint: {}", profile.create_new_checkpoint);
    tracing::info!(
        "Use checkpoint: {}",
        profile.checkpoint_identifier().unwrap_or("none")
    );
}
