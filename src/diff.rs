//! Content diff between a snapshot and its predecessor.

use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::archive::ArchiveCodec;
use crate::error::AppError;
use crate::ledger::{list_archives, resolve_in};
use crate::models::diff::{DiffResult, DiffStats};

/// Relative path to hex SHA-256 of every regular file in one snapshot.
pub type HashMapping = BTreeMap<String, String>;

/// Diff the snapshot named by `target_ref` (or the newest one) against the
/// snapshot whose filename sorts immediately before it.
pub fn diff(
    codec: &dyn ArchiveCodec,
    versions_dir: &Path,
    target_ref: Option<&str>,
) -> Result<DiffResult, AppError> {
    let names = list_archives(versions_dir, codec.extension())?;
    let current = match target_ref {
        None | Some("") | Some("latest") => names
            .last()
            .cloned()
            .ok_or_else(|| AppError::CommitNotFound("no snapshots to diff".into()))?,
        Some(r) => resolve_in(&names, r, codec.extension())?,
    };

    let position = names.iter().position(|n| *n == current).unwrap_or(0);
    if position == 0 {
        return Ok(DiffResult::first_snapshot(current));
    }
    let previous = names[position - 1].clone();

    let mut result = compare_archives(codec, &versions_dir.join(&previous), &versions_dir.join(&current))?;
    result.previous = Some(previous);
    result.current = current;
    Ok(result)
}

/// Compare two archives directly. `previous`/`current` in the result carry
/// the archive file names.
pub fn compare_archives(
    codec: &dyn ArchiveCodec,
    previous: &Path,
    current: &Path,
) -> Result<DiffResult, AppError> {
    let before = hash_archive(codec, previous)?;
    let after = hash_archive(codec, current)?;
    let mut result = classify(&before, &after);
    result.previous = previous.file_name().map(|n| n.to_string_lossy().into_owned());
    result.current = current
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(result)
}

/// Extract `archive` to a scratch directory and hash its files. Damaged
/// archives contribute nothing; unsafe ones abort.
pub fn hash_archive(codec: &dyn ArchiveCodec, archive: &Path) -> Result<HashMapping, AppError> {
    let scratch = tempfile::Builder::new().prefix("snapkeep-diff-").tempdir()?;
    match codec.extract_all(archive, scratch.path()) {
        Ok(_) => {}
        Err(e @ AppError::UnsafeArchive(_)) => return Err(e),
        Err(e @ (AppError::CorruptArchive(_) | AppError::Io(_))) => {
            tracing::warn!(archive = %archive.display(), error = %e, "Cannot extract snapshot, treating it as empty");
            return Ok(HashMapping::new());
        }
        Err(e) => return Err(e),
    }
    let hashes = hash_tree(scratch.path());
    if let Err(e) = scratch.close() {
        tracing::debug!(error = %e, "Scratch directory cleanup failed");
    }
    Ok(hashes)
}

/// Hash every regular file under `root`, keyed by forward-slash relative path.
pub fn hash_tree(root: &Path) -> HashMapping {
    let mut out = HashMapping::new();
    for entry in WalkDir::new(root).follow_links(false).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        match hash_file(entry.path()) {
            Ok(digest) => {
                out.insert(rel, digest);
            }
            Err(e) => tracing::warn!(path = %rel, error = %e, "Cannot hash file"),
        }
    }
    out
}

fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Split two hash mappings into added, removed and modified paths.
pub fn classify(before: &HashMapping, after: &HashMapping) -> DiffResult {
    let added: Vec<String> = after
        .keys()
        .filter(|path| !before.contains_key(*path))
        .cloned()
        .collect();
    let removed: Vec<String> = before
        .keys()
        .filter(|path| !after.contains_key(*path))
        .cloned()
        .collect();
    let modified: Vec<String> = after
        .iter()
        .filter(|(path, hash)| before.get(*path).is_some_and(|old| old != *hash))
        .map(|(path, _)| path.clone())
        .collect();

    let stats = DiffStats {
        added: added.len(),
        removed: removed.len(),
        modified: modified.len(),
        total_changes: added.len() + removed.len() + modified.len(),
    };
    DiffResult {
        added,
        removed,
        modified,
        stats,
        ..Default::default()
    }
}
