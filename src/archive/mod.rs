//! Snapshot container access.
//!
//! Everything above this module talks to archives through [`ArchiveCodec`],
//! so the container format can change without touching the snapshot builder,
//! the diff engine or the restore protocol.

pub mod entry_path;
pub mod tar_gz;

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::AppError;

pub use tar_gz::TarGzCodec;

/// Where the bytes of a new entry come from.
#[derive(Debug, Clone)]
pub enum EntrySource {
    Bytes(Vec<u8>),
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct EntryInput {
    /// Forward-slash relative path inside the archive.
    pub path: String,
    pub source: EntrySource,
}

impl EntryInput {
    pub fn bytes(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            source: EntrySource::Bytes(data.into()),
        }
    }

    pub fn file(path: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            source: EntrySource::File(source.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: String,
    pub size: u64,
    pub is_dir: bool,
    /// Seconds since the epoch as recorded in the entry header, 0 if unknown.
    pub mtime: u64,
}

#[derive(Debug, Clone, Default)]
pub struct WriteSummary {
    pub file_count: u64,
    /// Archive size on disk in bytes.
    pub size: u64,
    /// Entries dropped because their source could not be read.
    pub skipped: Vec<String>,
}

pub type FileVisitor<'a> = dyn FnMut(&ArchiveEntry, &mut dyn Read) -> Result<(), AppError> + 'a;

pub trait ArchiveCodec: Send + Sync {
    /// File extension without the leading dot.
    fn extension(&self) -> &'static str;

    /// Write `entries` in order to `dest`. Nothing appears at `dest` unless
    /// the whole archive was written.
    fn write(&self, dest: &Path, entries: &[EntryInput]) -> Result<WriteSummary, AppError>;

    /// List file and directory entries with normalized paths.
    fn read_all(&self, archive: &Path) -> Result<Vec<ArchiveEntry>, AppError>;

    /// Stream every regular file entry through `visit`.
    fn for_each_file(&self, archive: &Path, visit: &mut FileVisitor<'_>) -> Result<(), AppError>;

    /// Read a single file entry.
    fn read_one(&self, archive: &Path, path: &str) -> Result<Vec<u8>, AppError> {
        let mut found = None;
        self.for_each_file(archive, &mut |entry, reader| {
            if found.is_none() && entry.path == path {
                let mut buf = Vec::with_capacity(entry.size as usize);
                reader.read_to_end(&mut buf)?;
                found = Some(buf);
            }
            Ok(())
        })?;
        found.ok_or_else(|| AppError::NotFound(format!("{} is not in the snapshot", path)))
    }

    /// Check every entry path for escapes. `allow_empty = false` is used for
    /// archives that arrive from outside (uploads, downloads).
    fn validate(&self, archive: &Path, allow_empty: bool) -> Result<Vec<ArchiveEntry>, AppError> {
        let entries = self.read_all(archive)?;
        for entry in &entries {
            entry_path::check_entry_name(&entry.path)?;
            if entry.path.is_empty() && !entry.is_dir {
                return Err(AppError::UnsafeArchive("file entry with an empty name".into()));
            }
        }
        if !allow_empty && entries.is_empty() {
            return Err(AppError::CorruptArchive(format!(
                "{} contains no entries",
                archive.display()
            )));
        }
        Ok(entries)
    }

    /// Extract everything under `dest_root`. Validation runs first, so an
    /// unsafe archive writes nothing.
    fn extract_all(&self, archive: &Path, dest_root: &Path) -> Result<usize, AppError> {
        let entries = self.validate(archive, true)?;
        std::fs::create_dir_all(dest_root)?;
        for dir in entries.iter().filter(|e| e.is_dir && !e.path.is_empty()) {
            std::fs::create_dir_all(entry_path::join_within(dest_root, &dir.path)?)?;
        }

        let mut written = 0usize;
        self.for_each_file(archive, &mut |entry, reader| {
            write_entry(dest_root, entry, reader)?;
            written += 1;
            Ok(())
        })?;
        Ok(written)
    }
}

/// Write one file entry below `dest_root`, creating parents and carrying the
/// header mtime over so a fresh restore does not look locally modified.
pub fn write_entry(
    dest_root: &Path,
    entry: &ArchiveEntry,
    reader: &mut dyn Read,
) -> Result<u64, AppError> {
    let target = entry_path::join_within(dest_root, &entry.path)?;
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
        // A symlinked directory on disk must not redirect the write.
        entry_path::ensure_within_root(dest_root, parent)?;
    }
    let mut file = File::create(&target)?;
    let copied = io::copy(reader, &mut file)?;
    if entry.mtime > 0 {
        let _ = file.set_modified(UNIX_EPOCH + Duration::from_secs(entry.mtime));
    }
    Ok(copied)
}

pub(crate) fn mtime_secs(time: io::Result<SystemTime>) -> u64 {
    time.ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
