// pakexport - Merge base and patch game archives and export selected files
//
// This is the library crate containing the export core and its configuration.
// The binary crate (main.rs) provides the command-line entry point.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::{CounterTotals, RunCounters};
pub use models::{AppSettings, ExportProfile, ProfileError};
pub use services::{ExportPipeline, ExporterRegistry, ProfileReport};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
