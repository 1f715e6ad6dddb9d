//! Patch-ordered overlay merge.
//!
//! Folds a base archive set plus numbered patch archives into a single
//! path → file table, similar to an overlay filesystem:
//!
//! ```text
//!   Game.pak          (base, -1)   x → 1
//!   Game_1_P.pak      (patch 1)    y → 9
//!   Game_2_P.pak      (patch 2)    x → 2, y → 5
//!   ─────────────────────────────────────────
//!   OverlayTable                   x → 2, y → 5
//! ```
//!
//! # Precedence Rules
//!
//! 1. Sources are grouped by patch number, processed in ascending order
//!    (base `-1` first), so the highest patch number wins per path.
//! 2. Within one patch number, sources are processed in the order supplied,
//!    so the last supplied source wins. Such collisions are counted and
//!    reported as a warning.
//! 3. Paths are compared case-insensitively (see [`path_key`]); the winning
//!    handle keeps its own casing for rule matching and output names.

use crate::services::archive::{ArchiveSource, FileHandle};
use indexmap::IndexMap;
use std::collections::BTreeMap;
use thiserror::Error;

/// Patch number of base (unnumbered) archives.
pub const BASE_PATCH_NUMBER: i32 = -1;

/// Suffix marking a patch archive stem: `<base>_<N>_P.<ext>`.
const PATCH_SUFFIX: &str = "_P";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OverlayError {
    #[error("Archive {name} uses the patch naming convention but '{segment}' is not a patch number")]
    PatchNameParse { name: String, segment: String },
}

/// Case-folded form of a logical path used as the overlay and checkpoint key.
pub fn path_key(logical_path: &str) -> String {
    logical_path.to_lowercase()
}

/// Extract the patch number from an archive name.
///
/// `Foo_9_P.pak` → `9`, `Foo.pak` → [`BASE_PATCH_NUMBER`]. A name ending in
/// `_P.<ext>` whose numeric segment does not parse is an error: the archive
/// cannot be ordered safely.
pub fn parse_patch_number(name: &str) -> Result<i32, OverlayError> {
    let file_name = name.rsplit(&['/', '\\'][..]).next().unwrap_or(name);

    let Some((stem, _ext)) = file_name.rsplit_once('.') else {
        return Ok(BASE_PATCH_NUMBER);
    };
    let Some(rest) = stem.strip_suffix(PATCH_SUFFIX) else {
        return Ok(BASE_PATCH_NUMBER);
    };

    let segment = rest.rsplit_once('_').map_or(rest, |(_, segment)| segment);
    segment
        .parse::<i32>()
        .map_err(|_| OverlayError::PatchNameParse {
            name: name.to_string(),
            segment: segment.to_string(),
        })
}

/// A source that contributed to an [`OverlayTable`], in merge order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedSource {
    pub name: String,
    pub patch_number: i32,
    pub entries: usize,
}

/// Counters collected while merging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlayStats {
    /// Entries that replaced an entry from an earlier source
    pub overridden: usize,

    /// Replacements between two sources sharing a patch number
    pub same_patch_conflicts: usize,
}

#[derive(Debug, Clone)]
struct Slot {
    handle: FileHandle,
    source: usize,
}

/// The merged path → file table used for every export decision of a run.
///
/// Built once by [`OverlayTable::build`] and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct OverlayTable {
    files: IndexMap<String, Slot>,
    sources: Vec<MergedSource>,
    stats: OverlayStats,
}

impl OverlayTable {
    /// Merge archive sources by patch precedence.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::PatchNameParse`] if any archive name follows
    /// the patch convention with an unparseable number. Nothing is merged in
    /// that case.
    pub fn build<S: ArchiveSource>(sources: &[S]) -> Result<Self, OverlayError> {
        let mut groups: BTreeMap<i32, Vec<&S>> = BTreeMap::new();
        for source in sources {
            let patch_number = parse_patch_number(source.name())?;
            groups.entry(patch_number).or_default().push(source);
        }

        let mut table = Self::default();

        for (patch_number, group) in groups {
            for source in group {
                let index = table.sources.len();
                table.sources.push(MergedSource {
                    name: source.name().to_string(),
                    patch_number,
                    entries: source.entries().len(),
                });

                for handle in source.entries() {
                    let slot = Slot {
                        handle: handle.clone(),
                        source: index,
                    };

                    let key = path_key(&handle.logical_path);
                    if let Some(previous) = table.files.insert(key, slot) {
                        table.stats.overridden += 1;

                        let previous_source = &table.sources[previous.source];
                        if previous.source != index
                            && previous_source.patch_number == patch_number
                        {
                            table.stats.same_patch_conflicts += 1;
                            tracing::debug!(
                                "{} from {} replaces copy from {} (both patch {})",
                                handle.logical_path,
                                source.name(),
                                previous_source.name,
                                patch_number
                            );
                        }
                    }
                }
            }
        }

        let patch_sources = table
            .sources
            .iter()
            .filter(|s| s.patch_number != BASE_PATCH_NUMBER)
            .count();

        tracing::info!(
            "Merged {} archives ({} patch) into {} files, {} overridden",
            table.sources.len(),
            patch_sources,
            table.files.len(),
            table.stats.overridden
        );

        if table.stats.same_patch_conflicts > 0 {
            tracing::warn!(
                "{} paths exist in several archives with the same patch number; the last supplied archive wins",
                table.stats.same_patch_conflicts
            );
        }

        Ok(table)
    }

    /// Number of unique logical paths.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Resolve a logical path to the winning handle, ignoring case.
    pub fn get(&self, logical_path: &str) -> Option<&FileHandle> {
        self.files.get(&path_key(logical_path)).map(|slot| &slot.handle)
    }

    pub fn contains(&self, logical_path: &str) -> bool {
        self.files.contains_key(&path_key(logical_path))
    }

    /// The archive that supplied the winning handle for a path.
    pub fn source_of(&self, logical_path: &str) -> Option<&MergedSource> {
        self.files
            .get(&path_key(logical_path))
            .map(|slot| &self.sources[slot.source])
    }

    /// Iterate over all winning handles.
    pub fn iter(&self) -> impl Iterator<Item = &FileHandle> {
        self.files.values().map(|slot| &slot.handle)
    }

    /// Sources in merge order (lowest precedence first).
    pub fn sources(&self) -> &[MergedSource] {
        &self.sources
    }

    pub fn stats(&self) -> OverlayStats {
        self.stats
    }
}
