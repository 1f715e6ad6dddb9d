//! Services module - the export core.
//!
//! Everything here is free of CLI concerns and takes its inputs as explicit
//! parameters, so each stage can be driven directly from tests.
//!
//! # Components
//!
//! - [`archive`]: the archive source contract ([`ArchiveSource`], [`FileHandle`]) plus
//!   in-memory and loose-directory sources and the [`LooseArchiveMount`] discovery step
//! - [`overlay`]: merges sources into one [`OverlayTable`] by patch-number precedence
//! - [`rules`]: anchored, case-insensitive export rules and exclusions ([`RuleSet`])
//! - [`checkpoint`]: size snapshots for incremental runs ([`CheckpointStore`], [`Snapshot`])
//! - [`exporter`]: the [`Exporter`] trait, the [`ExporterRegistry`] keyed by
//!   `(source kind, target format)` and the [`OutputLayout`] for destination paths
//! - [`dispatch`]: the bounded worker pool that runs one export job per table entry
//! - [`pipeline`]: wires the stages together for one export profile
//!
//! # Run order
//!
//! 1. Mount archives under the profile's paks directory
//! 2. Build the overlay table (highest patch number wins per logical path)
//! 3. Compile rules and load the comparison checkpoint
//! 4. Dispatch every table entry; record sizes, export matched and changed files
//! 5. Save a new checkpoint if requested, then log the summary

pub mod archive;
pub mod checkpoint;
pub mod dispatch;
pub mod exporter;
pub mod overlay;
pub mod pipeline;
pub mod rules;

pub use archive::{
    ArchiveMount, ArchiveSource, FileContent, FileHandle, LooseArchive, LooseArchiveMount, MemoryArchive,
};
pub use checkpoint::{Checkpoint, CheckpointError, CheckpointStore, Snapshot};
pub use dispatch::{DispatchOptions, Dispatcher, ExportFailure, RunReport};
pub use exporter::{
    ExportError, ExportJob, ExportOutcome, Exporter, ExporterRegistry, OutputLayout, RawCopyExporter, SkipReason,
};
pub use overlay::{OverlayError, OverlayTable, parse_patch_number};
pub use pipeline::{ExportPipeline, ProfileReport};
pub use rules::{ExclusionRule, ExportRule, RuleError, RuleSet};
