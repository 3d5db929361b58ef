use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::commit::CommitRecord;

/// Persisted as `meta.json` in the repository directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepoMeta {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_commit: Option<CommitRecord>,
}

impl RepoMeta {
    pub fn new(id: &str, description: String) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            name: id.to_string(),
            description,
            created_at: now,
            updated_at: now,
            last_commit: None,
        }
    }

    /// Fill in fields older documents may have left empty.
    pub fn normalize(mut self, dir_name: &str) -> Self {
        if self.id.is_empty() {
            self.id = dir_name.to_string();
        }
        if self.name.is_empty() {
            self.name = self.id.clone();
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepoStats {
    pub commit_count: usize,
    pub total_size: u64,
    pub average_size: u64,
    pub first_commit: Option<CommitRecord>,
    pub last_commit: Option<CommitRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepoInfo {
    #[serde(flatten)]
    pub meta: RepoMeta,
    pub stats: RepoStats,
}

#[derive(Debug, Deserialize)]
pub struct CreateRepoRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDescriptionRequest {
    #[serde(default)]
    pub description: String,
}
