//! Snapshot creation: walk a source tree, filter it, and pack the survivors
//! into a timestamp-named archive.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use walkdir::WalkDir;

use crate::archive::{ArchiveCodec, EntryInput};
use crate::error::AppError;
use crate::ignore::IgnoreMatcher;

/// `YYYYMMDD_HHmmss_SSS`, lexicographically sortable.
pub const ARCHIVE_TIME_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibleFile {
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone, Default)]
pub struct EligibleFiles {
    pub files: Vec<EligibleFile>,
    pub oversized: Vec<String>,
    pub unreadable: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltSnapshot {
    pub archive_name: String,
    pub archive_path: PathBuf,
    pub size: u64,
    pub file_count: u64,
}

/// Walk `root` and return every regular file the matcher keeps and whose
/// size is within `max_file_size`, sorted by relative path. Excluded
/// directories are pruned, never entered.
pub fn list_eligible_files(root: &Path, matcher: &IgnoreMatcher, max_file_size: u64) -> EligibleFiles {
    let mut out = EligibleFiles::default();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !matcher.is_excluded(entry.path()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(|p| p.display().to_string()).unwrap_or_default();
                tracing::warn!(path = %path, error = %e, "Cannot read directory entry, skipping");
                out.unreadable.push(path);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(rel_path) = matcher.relative(entry.path()) else {
            continue;
        };

        let size = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::warn!(path = %rel_path, error = %e, "Cannot stat file, skipping");
                out.unreadable.push(rel_path);
                continue;
            }
        };
        if size > max_file_size {
            tracing::warn!(path = %rel_path, size, max_file_size, "File exceeds size ceiling, skipping");
            out.oversized.push(rel_path);
            continue;
        }

        out.files.push(EligibleFile {
            rel_path,
            abs_path: entry.into_path(),
            size,
        });
    }

    out.files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    out
}

pub fn archive_name_for(time: DateTime<Utc>, extension: &str) -> String {
    format!("{}.{}", time.format(ARCHIVE_TIME_FORMAT), extension)
}

/// Pick a timestamp name for a new archive in `versions_dir`, moving
/// forward one millisecond at a time until the name is free and sorts after
/// every existing archive.
pub fn next_archive_name(versions_dir: &Path, extension: &str) -> Result<String, AppError> {
    let suffix = format!(".{}", extension);
    let mut latest: Option<String> = None;
    if versions_dir.is_dir() {
        for entry in std::fs::read_dir(versions_dir)? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if name.ends_with(&suffix) && latest.as_ref().map_or(true, |l| name > *l) {
                latest = Some(name);
            }
        }
    }

    let mut time = Utc::now();
    loop {
        let name = archive_name_for(time, extension);
        let after_latest = latest.as_ref().map_or(true, |l| name > *l);
        if after_latest && !versions_dir.join(&name).exists() {
            return Ok(name);
        }
        time += Duration::milliseconds(1);
    }
}

/// Canonicalize `source_root` and list what a snapshot of it would contain.
/// Returns the canonical root alongside the listing.
pub fn scan_source(source_root: &Path, max_file_size: u64) -> Result<(PathBuf, EligibleFiles), AppError> {
    if !source_root.is_dir() {
        return Err(AppError::InvalidSource(format!(
            "{} does not exist or is not a directory",
            source_root.display()
        )));
    }
    let root = source_root.canonicalize()?;

    let matcher = IgnoreMatcher::resolve(&root);
    tracing::debug!(patterns = ?matcher.patterns(), "Resolved ignore patterns");

    let eligible = list_eligible_files(&root, &matcher, max_file_size);
    Ok((root, eligible))
}

/// Build a snapshot of `source_root` into `versions_dir`.
pub fn build_snapshot(
    codec: &dyn ArchiveCodec,
    source_root: &Path,
    versions_dir: &Path,
    max_file_size: u64,
) -> Result<BuiltSnapshot, AppError> {
    let (root, eligible) = scan_source(source_root, max_file_size)?;
    tracing::info!(
        source = %root.display(),
        files = eligible.files.len(),
        oversized = eligible.oversized.len(),
        unreadable = eligible.unreadable.len(),
        "Collected files for snapshot"
    );
    if eligible.files.is_empty() {
        return Err(AppError::EmptySnapshot(format!(
            "no eligible files under {} (everything is ignored or the directory is empty)",
            root.display()
        )));
    }

    std::fs::create_dir_all(versions_dir)?;
    let archive_name = next_archive_name(versions_dir, codec.extension())?;
    let archive_path = versions_dir.join(&archive_name);

    let entries: Vec<EntryInput> = eligible
        .files
        .iter()
        .map(|f| EntryInput::file(f.rel_path.clone(), f.abs_path.clone()))
        .collect();
    let summary = codec.write(&archive_path, &entries)?;

    if summary.file_count == 0 {
        let _ = std::fs::remove_file(&archive_path);
        return Err(AppError::EmptySnapshot(
            "every eligible file became unreadable while packing".into(),
        ));
    }

    tracing::info!(
        archive = %archive_name,
        size = summary.size,
        files = summary.file_count,
        "Snapshot written"
    );

    Ok(BuiltSnapshot {
        archive_name,
        archive_path,
        size: summary.size,
        file_count: summary.file_count,
    })
}
