//! Export dispatcher: fans the overlay table out to a bounded worker pool.
//!
//! Every table entry is handled by its own blocking job:
//!
//! 1. Classify it against the loaded checkpoint and record its size in the
//!    new snapshot (always, exported or not)
//! 2. Evaluate the rule set
//! 3. If matched and changed, build an [`ExportJob`] and route it through the
//!    [`ExporterRegistry`]
//!
//! Jobs never wait on each other. A failure or panic inside one exporter is
//! logged with the offending path and counted; sibling jobs carry on.
//! [`Dispatcher::run`] returns once every job has finished.

use crate::metrics::{CounterTotals, RunCounters};
use crate::services::archive::FileHandle;
use crate::services::checkpoint::{Checkpoint, Snapshot};
use crate::services::exporter::{
    ExportError, ExportJob, ExportOutcome, ExporterRegistry, OutputLayout,
};
use crate::services::overlay::OverlayTable;
use crate::services::rules::RuleSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};

/// Worker count used when none is configured.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Maximum number of jobs in flight
    pub max_workers: usize,

    /// Log every written file
    pub log_outputs: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            max_workers: default_worker_count(),
            log_outputs: false,
        }
    }
}

/// A file whose export failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFailure {
    pub logical_path: String,
    pub message: String,
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunReport {
    pub totals: CounterTotals,

    /// Sizes of every scanned file, ready to be saved as the next checkpoint
    pub snapshot: Arc<Snapshot>,

    pub failures: Vec<ExportFailure>,
}

enum JobResult {
    NotSelected,
    Exported,
    Skipped,
    Failed(ExportFailure),
}

/// State shared read-only (or through atomics) by every job of a run.
struct RunContext {
    rules: Arc<RuleSet>,
    checkpoint: Arc<Checkpoint>,
    registry: Arc<ExporterRegistry>,
    layout: Arc<OutputLayout>,
    counters: RunCounters,
    snapshot: Arc<Snapshot>,
    log_outputs: bool,
}

/// Runs the export pass for one profile.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ExporterRegistry>,
    layout: Arc<OutputLayout>,
    options: DispatchOptions,
}

impl Dispatcher {
    pub fn new(registry: Arc<ExporterRegistry>, layout: OutputLayout, options: DispatchOptions) -> Self {
        Self {
            registry,
            layout: Arc::new(layout),
            options,
        }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// Process every entry of `table` and wait for all jobs to finish.
    pub async fn run(
        &self,
        table: &OverlayTable,
        rules: Arc<RuleSet>,
        checkpoint: Arc<Checkpoint>,
    ) -> RunReport {
        let context = Arc::new(RunContext {
            rules,
            checkpoint,
            registry: Arc::clone(&self.registry),
            layout: Arc::clone(&self.layout),
            counters: RunCounters::new(),
            snapshot: Arc::new(Snapshot::new()),
            log_outputs: self.options.log_outputs,
        });

        let limit = self.options.max_workers.max(1);
        let mut jobs = JoinSet::new();
        let mut failures = Vec::new();

        tracing::info!("Scanning {} files with {} workers", table.len(), limit);

        for handle in table.iter() {
            while jobs.len() >= limit {
                if let Some(joined) = jobs.join_next().await {
                    collect(joined, &mut failures);
                }
            }

            let context = Arc::clone(&context);
            let handle = handle.clone();
            jobs.spawn_blocking(move || process_entry(&context, handle));
        }

        while let Some(joined) = jobs.join_next().await {
            collect(joined, &mut failures);
        }

        RunReport {
            totals: context.counters.totals(),
            snapshot: Arc::clone(&context.snapshot),
            failures,
        }
    }
}

fn collect(joined: Result<JobResult, JoinError>, failures: &mut Vec<ExportFailure>) {
    match joined {
        Ok(JobResult::Failed(failure)) => failures.push(failure),
        Ok(JobResult::NotSelected | JobResult::Exported | JobResult::Skipped) => {}
        Err(e) => tracing::error!("Export worker aborted: {}", e),
    }
}

fn process_entry(context: &RunContext, handle: FileHandle) -> JobResult {
    let counters = &context.counters;
    counters.record_scanned();

    let is_changed = context.checkpoint.is_changed(&handle.logical_path, handle.size);
    if is_changed && context.checkpoint.is_active() {
        counters.record_changed();
    }
    context.snapshot.record(&handle.logical_path, handle.size);

    let Some(target_format) = context.rules.matches(&handle.logical_path) else {
        return JobResult::NotSelected;
    };
    if !is_changed {
        return JobResult::NotSelected;
    }

    counters.record_matched();

    let job = ExportJob {
        target_format: target_format.to_string(),
        handle,
        is_changed,
    };
    let path = job.logical_path().to_string();

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        context.registry.export(&job, &context.layout)
    }))
    .unwrap_or_else(|_| Err(ExportError::Panicked(path.clone())));

    match result {
        Ok(ExportOutcome::Exported(destination)) => {
            counters.record_exported();
            if context.log_outputs {
                tracing::info!("=> {}", destination);
            }
            JobResult::Exported
        }
        Ok(ExportOutcome::Skipped(reason)) => {
            counters.record_skipped();
            tracing::debug!("Skipping {}: {}", path, reason);
            JobResult::Skipped
        }
        Err(e) => {
            counters.record_failed();
            tracing::error!("Failed to export {}: {}", path, e);
            JobResult::Failed(ExportFailure {
                logical_path: path,
                message: e.to_string(),
            })
        }
    }
}
