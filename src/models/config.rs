use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Process-wide settings.
///
/// Layered by [`ConfigManager::load_settings`](crate::config::ConfigManager::load_settings):
/// built-in defaults, then an optional `pakexport.yaml`, then `PAKEXPORT_*`
/// environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Directory holding export profile files
    #[serde(default = "default_configs_dir")]
    pub configs_dir: Utf8PathBuf,

    /// Directory where checkpoint files are read and written
    #[serde(default = "default_checkpoints_dir")]
    pub checkpoints_dir: Utf8PathBuf,

    /// Directory for rolling log files
    #[serde(default = "default_logs_dir")]
    pub logs_dir: Utf8PathBuf,

    #[serde(default)]
    pub debug: bool,

    /// Worker limit used when a profile does not set its own
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            configs_dir: default_configs_dir(),
            checkpoints_dir: default_checkpoints_dir(),
            logs_dir: default_logs_dir(),
            debug: false,
            max_workers: default_max_workers(),
        }
    }
}

fn default_configs_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("configs")
}

fn default_checkpoints_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("checkpoints")
}

fn default_logs_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("logs")
}

fn default_max_workers() -> usize {
    crate::services::dispatch::default_worker_count()
}

/// A profile field that failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error("gameTitle is empty")]
    EmptyGameTitle,

    #[error("paksDir is empty")]
    EmptyPaksDir,

    #[error("outputDir is empty")]
    EmptyOutputDir,

    #[error("maxWorkers must be at least 1")]
    ZeroWorkers,
}

/// One export job description, as stored in a profile file.
///
/// Profile files hold a list of these. Unknown keys are ignored so files
/// written for older tool versions (with `version`, `aes` or `lang` entries)
/// still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportProfile {
    pub game_title: String,

    pub paks_dir: Utf8PathBuf,

    pub output_dir: Utf8PathBuf,

    /// Log every written file
    #[serde(default)]
    pub log_outputs: bool,

    /// Mirror the logical directory tree under `output_dir` instead of writing flat
    #[serde(default)]
    pub keep_directory_structure: bool,

    #[serde(default)]
    pub create_new_checkpoint: bool,

    /// Checkpoint to compare against: a file name, a path, or `latest`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_checkpoint_file: Option<String>,

    /// `"<regex>:<format>"` rule strings, first match wins
    #[serde(default)]
    pub export: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,

    /// File the profile was loaded from
    #[serde(skip)]
    pub config_file_name: String,

    /// Position of the profile inside its file
    #[serde(skip)]
    pub config_object_index: usize,
}

impl ExportProfile {
    /// Minimal profile with the required fields set and everything else defaulted.
    pub fn new(
        game_title: impl Into<String>,
        paks_dir: impl Into<Utf8PathBuf>,
        output_dir: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            game_title: game_title.into(),
            paks_dir: paks_dir.into(),
            output_dir: output_dir.into(),
            log_outputs: false,
            keep_directory_structure: false,
            create_new_checkpoint: false,
            use_checkpoint_file: None,
            export: Vec::new(),
            exclude: Vec::new(),
            max_workers: None,
            config_file_name: String::new(),
            config_object_index: 0,
        }
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.game_title.trim().is_empty() {
            return Err(ProfileError::EmptyGameTitle);
        }
        if self.paks_dir.as_str().trim().is_empty() {
            return Err(ProfileError::EmptyPaksDir);
        }
        if self.output_dir.as_str().trim().is_empty() {
            return Err(ProfileError::EmptyOutputDir);
        }
        if self.max_workers == Some(0) {
            return Err(ProfileError::ZeroWorkers);
        }
        Ok(())
    }

    /// Checkpoint identifier to load, treating a blank entry as none.
    pub fn checkpoint_identifier(&self) -> Option<&str> {
        self.use_checkpoint_file
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// `"<file> (object #<n>)"`, used in log lines.
    pub fn label(&self) -> String {
        format!("{} (object #{})", self.config_file_name, self.config_object_index)
    }
}
