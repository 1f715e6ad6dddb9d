//! Archive sources: the seam between the export core and whatever mounts game archives.
//!
//! The core never parses archive containers. It only needs a named table of
//! logical paths, sizes and a way to read the bytes behind each path. This
//! module defines that contract ([`ArchiveSource`], [`FileHandle`],
//! [`FileContent`]) plus two concrete sources:
//!
//! - [`MemoryArchive`]: entries held in memory (tests, embedding)
//! - [`LooseArchive`]: an unpacked archive directory on disk, e.g. `Game_2_P.pak/`
//!
//! [`LooseArchiveMount`] discovers loose archives under a paks directory.

use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::fs;
use std::sync::Arc;
use walkdir::WalkDir;

/// Opaque reference to the bytes behind a logical file.
pub trait FileContent: Send + Sync + fmt::Debug {
    /// Read the full content of the file.
    fn read(&self) -> std::io::Result<Vec<u8>>;
}

/// Content stored in a file on disk, read lazily.
#[derive(Debug, Clone)]
pub struct DiskContent {
    path: Utf8PathBuf,
}

impl DiskContent {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FileContent for DiskContent {
    fn read(&self) -> std::io::Result<Vec<u8>> {
        fs::read(&self.path)
    }
}

/// Content held in memory.
#[derive(Debug, Clone)]
pub struct MemoryContent {
    bytes: Arc<[u8]>,
}

impl MemoryContent {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Arc::from(bytes.into()),
        }
    }
}

impl FileContent for MemoryContent {
    fn read(&self) -> std::io::Result<Vec<u8>> {
        Ok(self.bytes.to_vec())
    }
}

/// A single logical file exposed by an archive.
///
/// Handles are immutable and cheap to clone; the content reference is shared.
#[derive(Debug, Clone)]
pub struct FileHandle {
    /// Archive-internal path with `/` separators, e.g. `Game/Content/UI/Icon.uasset`
    pub logical_path: String,

    /// Size in bytes as reported by the archive
    pub size: u64,

    content: Arc<dyn FileContent>,
}

impl FileHandle {
    pub fn new(logical_path: impl Into<String>, size: u64, content: Arc<dyn FileContent>) -> Self {
        Self {
            logical_path: logical_path.into(),
            size,
            content,
        }
    }

    /// Create a handle backed by in-memory bytes. The size is the byte length.
    pub fn from_bytes(logical_path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let size = bytes.len() as u64;
        Self::new(logical_path, size, Arc::new(MemoryContent::new(bytes)))
    }

    /// Read the bytes behind this handle.
    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        self.content.read()
    }

    /// Lowercase extension of the logical path (`"uasset"`, `"ini"`), or empty.
    pub fn source_kind(&self) -> String {
        let file_name = self
            .logical_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.logical_path);

        match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext.to_lowercase(),
            _ => String::new(),
        }
    }
}

/// A named, sealed table of logical files.
///
/// Implemented by whatever mounts game archives. The overlay merge only
/// borrows sources and never mutates them.
pub trait ArchiveSource: Send + Sync {
    /// Archive name, e.g. `pakchunk0-Windows_3_P.pak`. Patch precedence is derived from it.
    fn name(&self) -> &str;

    /// All entries of this archive.
    fn entries(&self) -> &[FileHandle];
}

impl<T: ArchiveSource + ?Sized> ArchiveSource for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn entries(&self) -> &[FileHandle] {
        (**self).entries()
    }
}

impl<T: ArchiveSource + ?Sized> ArchiveSource for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn entries(&self) -> &[FileHandle] {
        (**self).entries()
    }
}

/// Discovers and opens the archives found under a paks directory.
pub trait ArchiveMount: Send + Sync {
    fn mount(&self, paks_dir: &Utf8Path) -> Result<Vec<Box<dyn ArchiveSource>>>;
}

/// In-memory archive.
#[derive(Debug, Clone)]
pub struct MemoryArchive {
    name: String,
    entries: Vec<FileHandle>,
}

impl MemoryArchive {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Builder-style variant of [`add_file`](Self::add_file).
    pub fn with_file(mut self, logical_path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.add_file(logical_path, bytes);
        self
    }

    pub fn add_file(&mut self, logical_path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.entries.push(FileHandle::from_bytes(logical_path, bytes));
    }

    pub fn add_handle(&mut self, handle: FileHandle) {
        self.entries.push(handle);
    }
}

impl ArchiveSource for MemoryArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn entries(&self) -> &[FileHandle] {
        &self.entries
    }
}

/// An unpacked archive: a directory whose files are the archive's entries.
///
/// The archive name is the directory name, so `paks/Game_2_P.pak/` is patch 2.
#[derive(Debug, Clone)]
pub struct LooseArchive {
    name: String,
    root: Utf8PathBuf,
    entries: Vec<FileHandle>,
}

impl LooseArchive {
    /// Index every regular file below `root`.
    pub fn open(root: &Utf8Path) -> Result<Self> {
        let name = root
            .file_name()
            .with_context(|| format!("Archive path has no file name: {}", root))?
            .to_string();

        let mut entries = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to scan archive: {}", root))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = Utf8Path::from_path(entry.path())
                .with_context(|| format!("Non UTF-8 path in archive {}: {:?}", name, entry.path()))?;
            let relative = path
                .strip_prefix(root)
                .with_context(|| format!("Entry {} escapes archive root {}", path, root))?;
            let logical_path = relative
                .components()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join("/");

            let size = entry
                .metadata()
                .with_context(|| format!("Failed to stat {}", path))?
                .len();

            entries.push(FileHandle::new(
                logical_path,
                size,
                Arc::new(DiskContent::new(path)),
            ));
        }

        tracing::debug!("Opened loose archive {} ({} entries)", name, entries.len());

        Ok(Self {
            name,
            root: root.to_path_buf(),
            entries,
        })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }
}

impl ArchiveSource for LooseArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn entries(&self) -> &[FileHandle] {
        &self.entries
    }
}

/// Mounts every loose archive directory found (recursively) under a paks directory.
///
/// A directory counts as an archive when its name ends in one of the
/// configured extensions. Packed archive files are not readable without a
/// container reader and are skipped with a warning.
#[derive(Debug, Clone)]
pub struct LooseArchiveMount {
    extensions: Vec<String>,
}

impl LooseArchiveMount {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.into().trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    fn is_archive_name(&self, name: &str) -> bool {
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                let ext = ext.to_lowercase();
                self.extensions.iter().any(|e| *e == ext)
            }
            _ => false,
        }
    }
}

impl Default for LooseArchiveMount {
    fn default() -> Self {
        Self::new(["pak", "utoc"])
    }
}

impl ArchiveMount for LooseArchiveMount {
    fn mount(&self, paks_dir: &Utf8Path) -> Result<Vec<Box<dyn ArchiveSource>>> {
        if !paks_dir.is_dir() {
            bail!("Paks directory does not exist: {}", paks_dir);
        }

        let mut archives: Vec<Box<dyn ArchiveSource>> = Vec::new();
        let mut walker = WalkDir::new(paks_dir)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter();

        while let Some(entry) = walker.next() {
            let entry = entry.with_context(|| format!("Failed to scan paks directory: {}", paks_dir))?;
            let Some(name) = entry.file_name().to_str() else {
                tracing::warn!("Skipping non UTF-8 path: {:?}", entry.path());
                continue;
            };

            if !self.is_archive_name(name) {
                continue;
            }

            if entry.file_type().is_dir() {
                let root = Utf8Path::from_path(entry.path())
                    .with_context(|| format!("Non UTF-8 archive path: {:?}", entry.path()))?;
                archives.push(Box::new(LooseArchive::open(root)?));
                walker.skip_current_dir();
            } else {
                tracing::warn!(
                    "Skipping packed archive {} (no container reader available)",
                    name
                );
            }
        }

        tracing::info!("Mounted {} archives from {}", archives.len(), paks_dir);
        Ok(archives)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn utf8_temp_dir() -> (TempDir, Utf8PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        (temp_dir, path)
    }

    #[test]
    fn test_source_kind() {
        let handle = FileHandle::from_bytes("Game/Content/UI/Icon.UAsset", b"x".to_vec());
        assert_eq!(handle.source_kind(), "uasset");

        let no_ext = FileHandle::from_bytes("Game/LICENSE", Vec::new());
        assert_eq!(no_ext.source_kind(), "");

        let dotfile = FileHandle::from_bytes("Game/.gitignore", Vec::new());
        assert_eq!(dotfile.source_kind(), "");

        let dotted_dir = FileHandle::from_bytes("Game/v1.2/readme", Vec::new());
        assert_eq!(dotted_dir.source_kind(), "");
    }

    #[test]
    fn test_memory_archive_entries() {
        let archive = MemoryArchive::new("Game.pak")
            .with_file("a.ini", b"[a]".to_vec())
            .with_file("b.txt", b"hello".to_vec());

        assert_eq!(archive.name(), "Game.pak");
        assert_eq!(archive.entries().len(), 2);
        assert_eq!(archive.entries()[1].size, 5);
        assert_eq!(archive.entries()[1].read().unwrap(), b"hello");
    }

    #[test]
    fn test_loose_archive_open() {
        let (_temp, root) = utf8_temp_dir();
        let archive_dir = root.join("Game_1_P.pak");
        fs::create_dir_all(archive_dir.join("Game/Config")).unwrap();
        fs::write(archive_dir.join("Game/Config/Default.ini"), "[Core]").unwrap();
        fs::write(archive_dir.join("top.txt"), "t").unwrap();

        let archive = LooseArchive::open(&archive_dir).unwrap();
        assert_eq!(archive.name(), "Game_1_P.pak");

        let paths: Vec<&str> = archive
            .entries()
            .iter()
            .map(|e| e.logical_path.as_str())
            .collect();
        assert_eq!(paths, vec!["Game/Config/Default.ini", "top.txt"]);
        assert_eq!(archive.entries()[0].size, 6);
        assert_eq!(archive.entries()[0].read().unwrap(), b"[Core]");
    }

    #[test]
    fn test_mount_discovers_archive_directories() {
        let (_temp, root) = utf8_temp_dir();
        fs::create_dir_all(root.join("Game.pak/Content")).unwrap();
        fs::write(root.join("Game.pak/Content/a.txt"), "a").unwrap();
        fs::create_dir_all(root.join("nested/Game_2_P.pak")).unwrap();
        fs::write(root.join("nested/Game_2_P.pak/b.txt"), "b").unwrap();
        fs::write(root.join("Packed.pak"), "not a directory").unwrap();
        fs::create_dir_all(root.join("NotAnArchive")).unwrap();

        let archives = LooseArchiveMount::default().mount(&root).unwrap();
        let names: Vec<&str> = archives.iter().map(|a| a.name()).collect();

        assert_eq!(names, vec!["Game.pak", "Game_2_P.pak"]);
    }

    #[test]
    fn test_mount_missing_directory_fails() {
        let (_temp, root) = utf8_temp_dir();
        let result = LooseArchiveMount::default().mount(&root.join("missing"));
        assert!(result.is_err());
    }
}
