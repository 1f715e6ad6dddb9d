//! Data models for pakexport.
//!
//! - [`AppSettings`]: process-wide directories, debug flag and default worker limit
//! - [`ExportProfile`]: one export job as stored in a JSON or YAML profile file
//! - [`ProfileError`]: validation failure for a profile's required fields
//!
//! All of them derive `Serialize`/`Deserialize`; profiles keep the camelCase keys
//! used by existing profile files.

pub mod config;

pub use config::{AppSettings, ExportProfile, ProfileError};
