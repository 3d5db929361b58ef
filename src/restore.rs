//! Conflict-aware restore of a snapshot into a working directory.
//!
//! A local file conflicts with the snapshot when it was modified after the
//! snapshot was taken. Conflicting files are never overwritten silently: the
//! caller either forces, skips them, or answers through a
//! [`ConflictResolver`]. Overwritten conflicts are backed up first.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::archive::{entry_path, write_entry, ArchiveCodec};
use crate::error::AppError;
use crate::models::restore::{
    BackupManifest, BackupManifestEntry, ConflictDecision, ConflictRecord, RestoreOptions, RestoreReport,
};
use crate::persistence::json_store::save_json;

pub const BACKUP_PREFIX: &str = ".snapkeep-backup-";
pub const BACKUP_MANIFEST: &str = ".backup-manifest.json";

/// Decides what happens when a restore finds conflicts.
pub trait ConflictResolver {
    fn decide(&mut self, conflicts: &[ConflictRecord]) -> ConflictDecision;
}

/// Always gives the same answer. `FixedDecision(ConflictDecision::Defer)`
/// is what headless callers use.
#[derive(Debug, Clone, Copy)]
pub struct FixedDecision(pub ConflictDecision);

impl ConflictResolver for FixedDecision {
    fn decide(&mut self, _conflicts: &[ConflictRecord]) -> ConflictDecision {
        self.0
    }
}

impl<F> ConflictResolver for F
where
    F: FnMut(&[ConflictRecord]) -> ConflictDecision,
{
    fn decide(&mut self, conflicts: &[ConflictRecord]) -> ConflictDecision {
        self(conflicts)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub extracted: usize,
    pub skipped: usize,
    pub bytes: u64,
}

/// Files in `archive` whose local copy under `dest_root` is newer than
/// `snapshot_date`.
pub fn detect_conflicts(
    codec: &dyn ArchiveCodec,
    archive: &Path,
    dest_root: &Path,
    snapshot_date: DateTime<Utc>,
) -> Result<Vec<ConflictRecord>, AppError> {
    let mut conflicts = Vec::new();
    for entry in codec.read_all(archive)?.into_iter().filter(|e| !e.is_dir) {
        let local = entry_path::join_within(dest_root, &entry.path)?;
        let Ok(meta) = std::fs::metadata(&local) else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let Ok(modified) = meta.modified() else {
            continue;
        };
        let local_modified: DateTime<Utc> = modified.into();
        if local_modified > snapshot_date {
            conflicts.push(ConflictRecord {
                path: entry.path,
                local_modified,
                snapshot_date,
                snapshot_size: entry.size,
                local_size: meta.len(),
            });
        }
    }
    Ok(conflicts)
}

/// Copy every conflicting file into a fresh backup directory under
/// `dest_root` and write a manifest next to the copies.
pub fn backup(conflicts: &[ConflictRecord], dest_root: &Path) -> Result<PathBuf, AppError> {
    let now = Utc::now();
    let short_id = uuid::Uuid::new_v4().simple().to_string();
    let dir = dest_root.join(format!(
        "{}{}-{}",
        BACKUP_PREFIX,
        now.timestamp_millis(),
        &short_id[..8]
    ));
    std::fs::create_dir_all(&dir)?;

    let mut backed_up = 0usize;
    let mut total_size = 0u64;
    for conflict in conflicts {
        let copied = entry_path::join_within(dest_root, &conflict.path).and_then(|source| {
            let target = entry_path::join_within(&dir, &conflict.path)?;
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Ok(std::fs::copy(&source, &target)?)
        });
        match copied {
            Ok(bytes) => {
                backed_up += 1;
                total_size += bytes;
            }
            Err(e) => tracing::warn!(path = %conflict.path, error = %e, "Cannot back up file"),
        }
    }

    let manifest = BackupManifest {
        timestamp: now,
        files: conflicts.len(),
        backed_up,
        total_size,
        conflicts: conflicts
            .iter()
            .map(|c| BackupManifestEntry {
                path: c.path.clone(),
                local_modified: c.local_modified,
                snapshot_date: c.snapshot_date,
                size: c.local_size,
            })
            .collect(),
    };
    save_json(&dir.join(BACKUP_MANIFEST), &manifest)?;

    tracing::info!(dir = %dir.display(), backed_up, total_size, "Backup written");
    Ok(dir)
}

/// Extract every file of `archive` under `dest_root` except those in `skip`.
pub fn extract(
    codec: &dyn ArchiveCodec,
    archive: &Path,
    dest_root: &Path,
    skip: &HashSet<String>,
) -> Result<ExtractSummary, AppError> {
    codec.validate(archive, true)?;
    std::fs::create_dir_all(dest_root)?;

    let mut summary = ExtractSummary::default();
    codec.for_each_file(archive, &mut |entry, reader| {
        if skip.contains(&entry.path) {
            summary.skipped += 1;
            return Ok(());
        }
        summary.bytes += write_entry(dest_root, entry, reader)?;
        summary.extracted += 1;
        Ok(())
    })?;
    Ok(summary)
}

/// Restore `archive` into `options.output_dir`.
pub fn restore(
    codec: &dyn ArchiveCodec,
    archive: &Path,
    snapshot_date: DateTime<Utc>,
    options: &RestoreOptions,
    resolver: &mut dyn ConflictResolver,
) -> Result<RestoreReport, AppError> {
    let entries = codec.validate(archive, false)?;
    let file_count = entries.iter().filter(|e| !e.is_dir).count();
    let dest = options.output_dir.as_path();

    let conflicts = detect_conflicts(codec, archive, dest, snapshot_date)?;
    let mut report = RestoreReport {
        conflicts,
        dry_run: options.dry_run,
        ..Default::default()
    };

    let mut skip_conflicts = options.skip_conflicts && !options.force;
    if options.dry_run {
        report.skipped = if skip_conflicts { report.conflicts.len() } else { 0 };
        report.extracted = file_count - report.skipped;
        return Ok(report);
    }

    if !report.conflicts.is_empty() && !options.force && !skip_conflicts {
        match resolver.decide(&report.conflicts) {
            ConflictDecision::Overwrite => {}
            ConflictDecision::SkipConflicts => skip_conflicts = true,
            ConflictDecision::Abort => {
                tracing::info!(conflicts = report.conflicts.len(), "Restore cancelled");
                report.cancelled = true;
                return Ok(report);
            }
            ConflictDecision::Defer => return Err(AppError::ConflictsPending(report.conflicts.len())),
        }
    }

    if options.backup && !skip_conflicts && !report.conflicts.is_empty() {
        report.backup_dir = Some(backup(&report.conflicts, dest)?);
    }

    let skip: HashSet<String> = if skip_conflicts {
        report.conflicts.iter().map(|c| c.path.clone()).collect()
    } else {
        HashSet::new()
    };
    let summary = extract(codec, archive, dest, &skip)?;
    report.extracted = summary.extracted;
    report.skipped = summary.skipped;
    report.bytes_written = summary.bytes;

    tracing::info!(
        dest = %dest.display(),
        extracted = report.extracted,
        skipped = report.skipped,
        bytes = report.bytes_written,
        "Restore complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{EntryInput, TarGzCodec};
    use chrono::Duration;

    fn archive_with(dir: &Path, files: &[(&str, &str)]) -> PathBuf {
        let path = dir.join("snap.tar.gz");
        let entries: Vec<_> = files
            .iter()
            .map(|(p, c)| EntryInput::bytes(*p, c.as_bytes().to_vec()))
            .collect();
        TarGzCodec::default().write(&path, &entries).unwrap();
        path
    }

    fn options(dest: &Path) -> RestoreOptions {
        RestoreOptions {
            output_dir: dest.to_path_buf(),
            ..Default::default()
        }
    }

    /// A snapshot date safely in the past, so every existing local file conflicts.
    fn long_ago() -> DateTime<Utc> {
        Utc::now() - Duration::days(1)
    }

    #[test]
    fn fresh_directory_has_no_conflicts() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = archive_with(tmp.path(), &[("a.txt", "A"), ("d/b.txt", "B")]);
        let dest = tmp.path().join("out");
        let codec = TarGzCodec::default();

        let report = restore(&codec, &archive, Utc::now(), &options(&dest), &mut FixedDecision(ConflictDecision::Defer)).unwrap();
        assert!(report.conflicts.is_empty());
        assert_eq!(report.extracted, 2);
        assert_eq!(std::fs::read_to_string(dest.join("d/b.txt")).unwrap(), "B");
        assert!(report.backup_dir.is_none());
    }

    #[test]
    fn newer_local_files_are_conflicts() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = archive_with(tmp.path(), &[("a.txt", "snapshot"), ("b.txt", "B")]);
        let dest = tmp.path().join("out");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("a.txt"), "local edit").unwrap();

        let codec = TarGzCodec::default();
        let conflicts = detect_conflicts(&codec, &archive, &dest, long_ago()).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].path, "a.txt");
        assert_eq!(conflicts[0].local_size, 10);

        let future = Utc::now() + Duration::days(1);
        assert!(detect_conflicts(&codec, &archive, &dest, future).unwrap().is_empty());
    }

    #[test]
    fn defer_fails_and_abort_cancels_without_writing() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = archive_with(tmp.path(), &[("a.txt", "snapshot"), ("b.txt", "B")]);
        let dest = tmp.path().join("out");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("a.txt"), "local").unwrap();
        let codec = TarGzCodec::default();

        let err = restore(&codec, &archive, long_ago(), &options(&dest), &mut FixedDecision(ConflictDecision::Defer))
            .unwrap_err();
        assert!(matches!(err, AppError::ConflictsPending(1)));

        let report = restore(&codec, &archive, long_ago(), &options(&dest), &mut FixedDecision(ConflictDecision::Abort))
            .unwrap();
        assert!(report.cancelled);
        assert!(!dest.join("b.txt").exists());
        assert_eq!(std::fs::read_to_string(dest.join("a.txt")).unwrap(), "local");
    }

    #[test]
    fn skip_conflicts_keeps_local_edits() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = archive_with(tmp.path(), &[("a.txt", "snapshot"), ("b.txt", "B")]);
        let dest = tmp.path().join("out");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("a.txt"), "local").unwrap();
        let codec = TarGzCodec::default();

        let mut asked = 0;
        let mut resolver = |conflicts: &[ConflictRecord]| {
            asked += conflicts.len();
            ConflictDecision::SkipConflicts
        };
        let report = restore(&codec, &archive, long_ago(), &options(&dest), &mut resolver).unwrap();
        assert_eq!(asked, 1);
        assert_eq!(report.extracted, 1);
        assert_eq!(report.skipped, 1);
        assert!(report.backup_dir.is_none());
        assert_eq!(std::fs::read_to_string(dest.join("a.txt")).unwrap(), "local");
        assert_eq!(std::fs::read_to_string(dest.join("b.txt")).unwrap(), "B");
    }

    #[test]
    fn forced_overwrite_backs_up_first() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = archive_with(tmp.path(), &[("dir/a.txt", "snapshot")]);
        let dest = tmp.path().join("out");
        std::fs::create_dir_all(dest.join("dir")).unwrap();
        std::fs::write(dest.join("dir/a.txt"), "local").unwrap();
        let codec = TarGzCodec::default();

        let opts = RestoreOptions {
            force: true,
            ..options(&dest)
        };
        let report = restore(&codec, &archive, long_ago(), &opts, &mut FixedDecision(ConflictDecision::Defer)).unwrap();
        let backup_dir = report.backup_dir.unwrap();

        assert!(backup_dir
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(BACKUP_PREFIX));
        assert_eq!(std::fs::read_to_string(backup_dir.join("dir/a.txt")).unwrap(), "local");
        assert_eq!(std::fs::read_to_string(dest.join("dir/a.txt")).unwrap(), "snapshot");

        let manifest: BackupManifest =
            serde_json::from_slice(&std::fs::read(backup_dir.join(BACKUP_MANIFEST)).unwrap()).unwrap();
        assert_eq!(manifest.files, 1);
        assert_eq!(manifest.backed_up, 1);
        assert_eq!(manifest.total_size, 5);
        assert_eq!(manifest.conflicts[0].path, "dir/a.txt");
    }

    #[test]
    fn dry_run_touches_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = archive_with(tmp.path(), &[("a.txt", "snapshot"), ("b.txt", "B")]);
        let dest = tmp.path().join("out");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("a.txt"), "local").unwrap();
        let codec = TarGzCodec::default();

        let opts = RestoreOptions {
            dry_run: true,
            skip_conflicts: true,
            ..options(&dest)
        };
        let report = restore(&codec, &archive, long_ago(), &opts, &mut FixedDecision(ConflictDecision::Defer)).unwrap();
        assert!(report.dry_run);
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.extracted, 1);
        assert_eq!(report.skipped, 1);
        assert!(!dest.join("b.txt").exists());
        assert_eq!(std::fs::read_dir(&dest).unwrap().count(), 1);
    }

    #[test]
    fn empty_archive_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = archive_with(tmp.path(), &[]);
        let err = restore(
            &TarGzCodec::default(),
            &archive,
            Utc::now(),
            &options(&tmp.path().join("out")),
            &mut FixedDecision(ConflictDecision::Overwrite),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::CorruptArchive(_)));
    }

    fn set_mtime(path: &Path, time: DateTime<Utc>) {
        std::fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time.into())
            .unwrap();
    }

    #[test]
    fn local_file_as_old_as_the_snapshot_is_not_a_conflict() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = archive_with(tmp.path(), &[("a.txt", "snapshot")]);
        let dest = tmp.path().join("out");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("a.txt"), "local").unwrap();

        let snapshot_date = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        set_mtime(&dest.join("a.txt"), snapshot_date);
        let codec = TarGzCodec::default();
        assert!(detect_conflicts(&codec, &archive, &dest, snapshot_date).unwrap().is_empty());

        set_mtime(&dest.join("a.txt"), snapshot_date + Duration::seconds(1));
        let conflicts = detect_conflicts(&codec, &archive, &dest, snapshot_date).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].snapshot_date, snapshot_date);
    }

    #[test]
    fn dry_run_into_missing_directory_creates_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = archive_with(tmp.path(), &[("a.txt", "A"), ("d/b.txt", "B")]);
        let dest = tmp.path().join("not-yet");
        let opts = RestoreOptions {
            dry_run: true,
            ..options(&dest)
        };

        let report = restore(&TarGzCodec::default(), &archive, Utc::now(), &opts, &mut FixedDecision(ConflictDecision::Abort)).unwrap();
        assert!(report.dry_run);
        assert_eq!(report.extracted, 2);
        assert!(!dest.exists());
    }
}
