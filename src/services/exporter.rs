//! Format exporters and their registry.
//!
//! An exporter turns one logical file into one output file. Routing is a
//! lookup on `(source kind, target format)`, where the source kind is the
//! lowercase extension of the logical path:
//!
//! ```text
//! ("ini", "ini")     → RawCopyExporter
//! ("db", "db")       → RawCopyExporter
//! ("uasset", "json") → registered by an asset decoder, if any
//! ```
//!
//! A pair without a registered exporter is a typed skip, not an error.

use crate::services::archive::FileHandle;
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::sync::Arc;
use thiserror::Error;

/// Kinds exported by copying their bytes unchanged when the target format equals the kind.
pub const PASSTHROUGH_KINDS: &[&str] = &[
    "upluginmanifest",
    "uproject",
    "manifest",
    "uplugin",
    "archive",
    "vmodule",
    "verse",
    "html",
    "json",
    "ini",
    "txt",
    "log",
    "bat",
    "dat",
    "cfg",
    "ide",
    "ipl",
    "zon",
    "xml",
    "css",
    "csv",
    "pem",
    "tps",
    "lua",
    "po",
    "h",
    "js",
    "db",
];

/// A single file selected for export.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub handle: FileHandle,
    pub target_format: String,
    pub is_changed: bool,
}

impl ExportJob {
    pub fn logical_path(&self) -> &str {
        &self.handle.logical_path
    }
}

/// Why a matched file was not written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No exporter registered for this pair
    Unsupported {
        source_kind: String,
        target_format: String,
    },

    /// The exporter looked at the file and declined it
    Declined(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unsupported {
                source_kind,
                target_format,
            } => write!(f, "no exporter for {} -> {}", source_kind, target_format),
            SkipReason::Declined(reason) => write!(f, "declined: {}", reason),
        }
    }
}

/// Result of a successful exporter call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Exported(Utf8PathBuf),
    Skipped(SkipReason),
}

/// Per-file export failures. Always contained to the file they occur on.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to read {path} from archive: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode {path}: {message}")]
    Decode { path: String, message: String },

    #[error("Exporter panicked while processing {0}")]
    Panicked(String),

    #[error("Logical path {0} would be written outside the output directory")]
    UnsafePath(String),
}

/// Converts one file into its target format and writes it to `destination`.
///
/// Implementations run on blocking worker threads and may do blocking I/O.
#[cfg_attr(test, mockall::automock)]
pub trait Exporter: Send + Sync {
    fn export(&self, job: &ExportJob, destination: &Utf8Path) -> Result<ExportOutcome, ExportError>;
}

impl<F> Exporter for F
where
    F: Fn(&ExportJob, &Utf8Path) -> Result<ExportOutcome, ExportError> + Send + Sync,
{
    fn export(&self, job: &ExportJob, destination: &Utf8Path) -> Result<ExportOutcome, ExportError> {
        self(job, destination)
    }
}

/// Write output bytes, creating parent directories on first use.
///
/// Directory creation tolerates other jobs creating the same directory concurrently.
pub fn write_output(destination: &Utf8Path, bytes: &[u8]) -> Result<(), ExportError> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|source| ExportError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    fs::write(destination, bytes).map_err(|source| ExportError::Write {
        path: destination.to_path_buf(),
        source,
    })
}

/// Copies the file's bytes unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCopyExporter;

impl Exporter for RawCopyExporter {
    fn export(&self, job: &ExportJob, destination: &Utf8Path) -> Result<ExportOutcome, ExportError> {
        let bytes = job.handle.read().map_err(|source| ExportError::Read {
            path: job.logical_path().to_string(),
            source,
        })?;

        write_output(destination, &bytes)?;
        Ok(ExportOutcome::Exported(destination.to_path_buf()))
    }
}

/// Where exported files land.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: Utf8PathBuf,
    keep_directory_structure: bool,
}

impl OutputLayout {
    pub fn new(root: impl Into<Utf8PathBuf>, keep_directory_structure: bool) -> Self {
        Self {
            root: root.into(),
            keep_directory_structure,
        }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// `<root>[/<logical dir>]/<file stem>.<target format>`
    ///
    /// Only plain path segments are accepted; absolute paths, drive prefixes
    /// and `..` segments are rejected so every output stays under the root.
    pub fn target_path(
        &self,
        logical_path: &str,
        target_format: &str,
    ) -> Result<Utf8PathBuf, ExportError> {
        let mut segments = Vec::new();
        for component in Utf8Path::new(logical_path).components() {
            match component {
                Utf8Component::Normal(segment) => segments.push(segment),
                Utf8Component::CurDir => {}
                Utf8Component::ParentDir | Utf8Component::RootDir | Utf8Component::Prefix(_) => {
                    return Err(ExportError::UnsafePath(logical_path.to_string()));
                }
            }
        }

        let Some(file) = segments.pop() else {
            return Err(ExportError::UnsafePath(logical_path.to_string()));
        };
        let stem = Utf8Path::new(file).file_stem().unwrap_or(file);
        let file_name = format!("{}.{}", stem, target_format);

        let mut destination = self.root.clone();
        if self.keep_directory_structure {
            destination.extend(segments);
        }
        destination.push(file_name);
        Ok(destination)
    }
}

/// Maps `(source kind, target format)` to an exporter.
#[derive(Clone, Default)]
pub struct ExporterRegistry {
    routes: HashMap<(String, String), Arc<dyn Exporter>>,
}

impl ExporterRegistry {
    /// An empty registry; every pair is unsupported.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with [`RawCopyExporter`] for every [`PASSTHROUGH_KINDS`] entry.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let raw: Arc<dyn Exporter> = Arc::new(RawCopyExporter);
        for kind in PASSTHROUGH_KINDS {
            registry.register_shared(kind, kind, Arc::clone(&raw));
        }
        registry
    }

    pub fn register(&mut self, source_kind: &str, target_format: &str, exporter: impl Exporter + 'static) {
        self.register_shared(source_kind, target_format, Arc::new(exporter));
    }

    pub fn register_shared(&mut self, source_kind: &str, target_format: &str, exporter: Arc<dyn Exporter>) {
        self.routes.insert(
            (source_kind.to_lowercase(), target_format.to_lowercase()),
            exporter,
        );
    }

    pub fn lookup(&self, source_kind: &str, target_format: &str) -> Option<&Arc<dyn Exporter>> {
        self.routes
            .get(&(source_kind.to_lowercase(), target_format.to_lowercase()))
    }

    pub fn supports(&self, source_kind: &str, target_format: &str) -> bool {
        self.lookup(source_kind, target_format).is_some()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Route a job to its exporter and run it.
    pub fn export(&self, job: &ExportJob, layout: &OutputLayout) -> Result<ExportOutcome, ExportError> {
        let source_kind = job.handle.source_kind();

        let Some(exporter) = self.lookup(&source_kind, &job.target_format) else {
            return Ok(ExportOutcome::Skipped(SkipReason::Unsupported {
                source_kind,
                target_format: job.target_format.clone(),
            }));
        };

        let destination = layout.target_path(job.logical_path(), &job.target_format)?;
        exporter.export(job, &destination)
    }
}

impl fmt::Debug for ExporterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pairs: Vec<_> = self.routes.keys().collect();
        pairs.sort();
        f.debug_struct("ExporterRegistry").field("routes", &pairs).finish()
    }
}
