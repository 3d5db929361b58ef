use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// A live file that was modified after the snapshot being restored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConflictRecord {
    pub path: String,
    pub local_modified: DateTime<Utc>,
    pub snapshot_date: DateTime<Utc>,
    pub snapshot_size: u64,
    pub local_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupManifest {
    pub timestamp: DateTime<Utc>,
    pub files: usize,
    pub backed_up: usize,
    pub total_size: u64,
    pub conflicts: Vec<BackupManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupManifestEntry {
    pub path: String,
    pub local_modified: DateTime<Utc>,
    pub snapshot_date: DateTime<Utc>,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct RestoreOptions {
    pub force: bool,
    pub backup: bool,
    pub dry_run: bool,
    pub skip_conflicts: bool,
    pub output_dir: PathBuf,
    pub timeout: Duration,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            force: false,
            backup: true,
            dry_run: false,
            skip_conflicts: false,
            output_dir: PathBuf::from("."),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Answer to the question "conflicts were found, what now?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictDecision {
    Overwrite,
    SkipConflicts,
    Abort,
    /// No decision available (headless caller); the restore fails with `ConflictsPending`.
    Defer,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RestoreReport {
    pub conflicts: Vec<ConflictRecord>,
    pub extracted: usize,
    pub skipped: usize,
    pub bytes_written: u64,
    pub backup_dir: Option<PathBuf>,
    pub dry_run: bool,
    pub cancelled: bool,
}
