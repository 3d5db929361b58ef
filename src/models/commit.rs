use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One snapshot in a repository's ledger (`commits.json`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommitRecord {
    pub id: String,
    pub file: String,
    #[serde(default)]
    pub message: String,
    pub size: u64,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub file_count: u64,
}

#[derive(Debug, Deserialize)]
pub struct UploadSnapshotQuery {
    pub message: Option<String>,
}

/// What a client needs to fetch and restore one snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotInfo {
    pub file: String,
    pub size: u64,
    /// Ledger date; absent when the archive has no ledger entry.
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub file_count: Option<u64>,
}
