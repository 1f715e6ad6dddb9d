//! Checkpoints: persisted path → size snapshots used to skip unchanged files.
//!
//! A checkpoint is written at the end of a run and records the size of every
//! scanned file, exported or not. The next run compares current sizes against
//! it; size is a cheap change proxy, so a content change that keeps the size
//! identical goes unnoticed.
//!
//! # File Format
//!
//! Checkpoints are JSON files named `<GameTitle> <MM-DD-YYYY HH-MM>.ckpt` in
//! the checkpoints directory:
//!
//! ```json
//! {
//!   "game_title": "Hotta",
//!   "created_at": "2025-03-01T18:22:05Z",
//!   "files": { "Hotta/Content/UI/Icon.uasset": 1024 }
//! }
//! ```
//!
//! Older checkpoints that are a flat `{ path: size }` object are still
//! accepted; their timestamp comes from the file name.
//!
//! Paths are compared case-insensitively, matching the overlay table; files
//! keep the casing of the archive copy that was scanned.
//!
//! Loading never fails a run: any problem disables change detection and is
//! logged as a warning.

use crate::services::overlay::path_key;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use camino::{Utf8Path, Utf8PathBuf};
use dashmap::DashMap;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use thiserror::Error;

/// File extension of checkpoint files.
pub const CHECKPOINT_EXTENSION: &str = "ckpt";

/// Identifier selecting the newest checkpoint for the profile's game title.
pub const LATEST: &str = "latest";

/// Timestamp format embedded in checkpoint file names.
const FILE_TIMESTAMP_FORMAT: &str = "%m-%d-%Y %H-%M";

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoint file at location \"{0}\" does not exist")]
    NotFound(String),

    #[error("Could not find any checkpoints for \"{0}\"")]
    NoneForTitle(String),

    #[error("Failed to access checkpoint {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse checkpoint {path}: {source}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode checkpoint: {0}")]
    Encode(#[from] serde_json::Error),
}

/// On-disk checkpoint body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointFile {
    pub game_title: String,
    pub created_at: DateTime<Utc>,
    pub files: BTreeMap<String, u64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredCheckpoint {
    Structured(CheckpointFile),
    Legacy(HashMap<String, u64>),
}

/// Only the header of a structured checkpoint; the file table is skipped.
#[derive(Deserialize)]
struct CheckpointHeader {
    created_at: DateTime<Utc>,
    #[serde(rename = "files")]
    _files: IgnoredAny,
}

/// True if `path` is absent from `snapshot` or recorded with a different size.
pub fn is_changed(path: &str, size: u64, snapshot: &HashMap<String, u64>) -> bool {
    snapshot.get(path) != Some(&size)
}

/// A loaded checkpoint, read-only for the duration of a run.
///
/// A disabled checkpoint reports every file as changed. Keys are stored
/// case-folded with [`path_key`].
#[derive(Debug, Clone, Default)]
pub struct Checkpoint {
    sizes: HashMap<String, u64>,
    active: bool,
    source: Option<Utf8PathBuf>,
    created_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    /// No change detection: every file is treated as changed.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// An active checkpoint built from an in-memory snapshot.
    pub fn from_sizes(sizes: HashMap<String, u64>) -> Self {
        Self {
            sizes: sizes
                .into_iter()
                .map(|(path, size)| (path_key(&path), size))
                .collect(),
            active: true,
            source: None,
            created_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_changed(&self, path: &str, size: u64) -> bool {
        !self.active || is_changed(&path_key(path), size, &self.sizes)
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// The file this checkpoint was loaded from, if any.
    pub fn source(&self) -> Option<&Utf8Path> {
        self.source.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}

/// The snapshot being built during a run.
///
/// Written concurrently by every export job; entries are overwritten, never merged.
/// Keyed by [`path_key`], with the recorded path's own casing kept for the file.
#[derive(Debug, Default)]
pub struct Snapshot {
    sizes: DashMap<String, (String, u64)>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, path: &str, size: u64) {
        self.sizes.insert(path_key(path), (path.to_string(), size));
    }

    pub fn get(&self, path: &str) -> Option<u64> {
        self.sizes.get(&path_key(path)).map(|entry| entry.value().1)
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Sorted copy of the recorded sizes, for stable checkpoint files.
    pub fn to_sorted(&self) -> BTreeMap<String, u64> {
        self.sizes
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Use this snapshot as the baseline of a following run without a round trip to disk.
    pub fn to_checkpoint(&self) -> Checkpoint {
        Checkpoint::from_sizes(
            self.sizes
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().1))
                .collect(),
        )
    }
}

/// Loads and saves checkpoints in a checkpoints directory.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: Utf8PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Load the checkpoint selected by `identifier`, degrading to
    /// [`Checkpoint::disabled`] on any problem.
    ///
    /// - `None` or empty: no checkpoint
    /// - `"latest"`: newest checkpoint whose file name contains `game_title`
    /// - anything else: a checkpoint file path
    pub fn load(&self, identifier: Option<&str>, game_title: &str) -> Checkpoint {
        match self.try_load(identifier, game_title) {
            Ok(Some(checkpoint)) => {
                tracing::info!(
                    "Using checkpoint: {} ({} files)",
                    checkpoint.source().map(|p| p.as_str()).unwrap_or("<memory>"),
                    checkpoint.len()
                );
                checkpoint
            }
            Ok(None) => {
                tracing::info!("No checkpoint file selected. Ignoring...");
                Checkpoint::disabled()
            }
            Err(e) => {
                tracing::warn!("{}. Ignoring...", e);
                Checkpoint::disabled()
            }
        }
    }

    /// Strict variant of [`load`](Self::load).
    pub fn try_load(
        &self,
        identifier: Option<&str>,
        game_title: &str,
    ) -> Result<Option<Checkpoint>, CheckpointError> {
        let identifier = match identifier.map(str::trim) {
            Some(id) if !id.is_empty() => id,
            _ => return Ok(None),
        };

        let path = if identifier.eq_ignore_ascii_case(LATEST) {
            self.find_latest(game_title)?
        } else {
            self.resolve(identifier)?
        };

        self.read(&path).map(Some)
    }

    fn resolve(&self, identifier: &str) -> Result<Utf8PathBuf, CheckpointError> {
        let direct = Utf8PathBuf::from(identifier);
        if direct.is_file() {
            return Ok(direct);
        }

        let in_dir = self.dir.join(identifier);
        if in_dir.is_file() {
            return Ok(in_dir);
        }

        Err(CheckpointError::NotFound(identifier.to_string()))
    }

    /// Newest checkpoint for a game title, by embedded timestamp.
    pub fn find_latest(&self, game_title: &str) -> Result<Utf8PathBuf, CheckpointError> {
        let mut newest: Option<(DateTime<Utc>, Utf8PathBuf)> = None;

        for path in self.list()? {
            let Some(file_name) = path.file_name() else {
                continue;
            };
            if !file_name.contains(game_title) {
                continue;
            }

            let Some(timestamp) = self.timestamp_of(&path, game_title) else {
                tracing::debug!("Checkpoint {} has no readable timestamp, skipping", path);
                continue;
            };

            if newest.as_ref().is_none_or(|(best, _)| timestamp > *best) {
                newest = Some((timestamp, path));
            }
        }

        newest
            .map(|(_, path)| path)
            .ok_or_else(|| CheckpointError::NoneForTitle(game_title.to_string()))
    }

    /// All checkpoint files in the directory, sorted by name.
    pub fn list(&self) -> Result<Vec<Utf8PathBuf>, CheckpointError> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let entries = self.dir.read_dir_utf8().map_err(|source| CheckpointError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| CheckpointError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_file() && path.extension() == Some(CHECKPOINT_EXTENSION) {
                paths.push(path.to_path_buf());
            }
        }

        paths.sort();
        Ok(paths)
    }

    /// Timestamp from the checkpoint body, falling back to the file name.
    fn timestamp_of(&self, path: &Utf8Path, game_title: &str) -> Option<DateTime<Utc>> {
        let from_body = fs::read_to_string(path)
            .ok()
            .and_then(|text| serde_json::from_str::<CheckpointHeader>(&text).ok())
            .map(|header| header.created_at);

        from_body.or_else(|| parse_file_timestamp(path.file_stem()?, game_title))
    }

    fn read(&self, path: &Utf8Path) -> Result<Checkpoint, CheckpointError> {
        let text = fs::read_to_string(path).map_err(|source| CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let stored: StoredCheckpoint =
            serde_json::from_str(&text).map_err(|source| CheckpointError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let (sizes, created_at): (HashMap<String, u64>, _) = match stored {
            StoredCheckpoint::Structured(file) => {
                (file.files.into_iter().collect(), Some(file.created_at))
            }
            StoredCheckpoint::Legacy(sizes) => (sizes, None),
        };

        Ok(Checkpoint {
            source: Some(path.to_path_buf()),
            created_at,
            ..Checkpoint::from_sizes(sizes)
        })
    }

    /// Persist a snapshot as a new checkpoint for `game_title`.
    pub fn save(&self, snapshot: &Snapshot, game_title: &str) -> Result<Utf8PathBuf, CheckpointError> {
        self.save_at(snapshot, game_title, Local::now())
    }

    /// [`save`](Self::save) with an explicit creation time.
    ///
    /// Two checkpoints for the same title within the same minute share a file name;
    /// the later one replaces the earlier.
    pub fn save_at(
        &self,
        snapshot: &Snapshot,
        game_title: &str,
        now: DateTime<Local>,
    ) -> Result<Utf8PathBuf, CheckpointError> {
        fs::create_dir_all(&self.dir).map_err(|source| CheckpointError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let body = CheckpointFile {
            game_title: game_title.to_string(),
            created_at: now.with_timezone(&Utc),
            files: snapshot.to_sorted(),
        };
        let json = serde_json::to_string_pretty(&body)?;

        let path = self.dir.join(format!(
            "{} {}.{}",
            game_title,
            now.format(FILE_TIMESTAMP_FORMAT),
            CHECKPOINT_EXTENSION
        ));

        fs::write(&path, json).map_err(|source| CheckpointError::Io {
            path: path.clone(),
            source,
        })?;

        tracing::info!("Created checkpoint file: {} ({} files)", path, body.files.len());
        Ok(path)
    }
}

/// Parse the `MM-DD-YYYY HH-MM` part that follows the game title in a
/// checkpoint file stem, interpreted as local time.
fn parse_file_timestamp(stem: &str, game_title: &str) -> Option<DateTime<Utc>> {
    let start = stem.find(game_title)? + game_title.len();
    let stamp = stem[start..].trim();

    let naive = NaiveDateTime::parse_from_str(stamp, FILE_TIMESTAMP_FORMAT).ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}
