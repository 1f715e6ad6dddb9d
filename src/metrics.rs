// Run counters
//
// Per-run tallies for one export pass. A fresh instance is created by every
// dispatcher run, so profiles processed in the same process never share counts.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live counters for one export run.
///
/// Uses atomic operations so export jobs can record results without locks.
#[derive(Debug)]
pub struct RunCounters {
    /// Files visited in the overlay table
    pub scanned: AtomicU64,

    /// Files whose size differs from the loaded checkpoint (or that are new to it)
    pub changed: AtomicU64,

    /// Files matched by a rule and selected for export
    pub matched: AtomicU64,

    /// Files written successfully
    pub exported: AtomicU64,

    /// Files whose export failed
    pub failed: AtomicU64,

    /// Matched files with no exporter for their source kind and target format
    pub skipped: AtomicU64,

    /// Run start time
    start_time: Instant,
}

impl RunCounters {
    pub fn new() -> Self {
        Self {
            scanned: AtomicU64::new(0),
            changed: AtomicU64::new(0),
            matched: AtomicU64::new(0),
            exported: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_scanned(&self) {
        self.scanned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_changed(&self) {
        self.changed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_matched(&self) {
        self.matched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exported(&self) {
        self.exported.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since the run started
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Copy the current values out of the atomics.
    pub fn totals(&self) -> CounterTotals {
        CounterTotals {
            scanned: self.scanned.load(Ordering::Relaxed),
            changed: self.changed.load(Ordering::Relaxed),
            matched: self.matched.load(Ordering::Relaxed),
            exported: self.exported.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            elapsed: self.elapsed(),
        }
    }
}

impl Default for RunCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Final counter values of a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterTotals {
    pub scanned: u64,
    pub changed: u64,
    pub matched: u64,
    pub exported: u64,
    pub failed: u64,
    pub skipped: u64,
    pub elapsed: Duration,
}

impl CounterTotals {
    /// Scanned files that match the loaded checkpoint
    pub fn unchanged(&self) -> u64 {
        self.scanned.saturating_sub(self.changed)
    }

    /// Matched files that did not end up on disk
    pub fn not_exported(&self) -> u64 {
        self.matched.saturating_sub(self.exported)
    }

    /// Log the end-of-run summary.
    pub fn log_summary(&self, checkpoint_active: bool) {
        if checkpoint_active {
            tracing::info!(
                "Scanned {} files ({} changed, {} unchanged)",
                self.scanned,
                self.changed,
                self.unchanged()
            );
        } else {
            tracing::info!("Scanned {} files", self.scanned);
        }

        if self.not_exported() > 0 {
            tracing::info!(
                "Regex matched {} files (skipped {}: {} unsupported, {} failed)",
                self.matched,
                self.not_exported(),
                self.skipped,
                self.failed
            );
        } else {
            tracing::info!("Regex matched {} files", self.matched);
        }

        tracing::info!(
            "Exported {} files in {:.2} seconds",
            self.exported,
            self.elapsed.as_secs_f64()
        );
    }
}

impl fmt::Display for CounterTotals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scanned {}, changed {}, matched {}, exported {}, failed {}, skipped {}",
            self.scanned, self.changed, self.matched, self.exported, self.failed, self.skipped
        )
    }
}
