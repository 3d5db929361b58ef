use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffStats {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub total_changes: usize,
}

/// Changes between a snapshot and its predecessor. Paths are sorted and
/// each path appears in at most one list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffResult {
    pub previous: Option<String>,
    pub current: String,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
    pub stats: DiffStats,
    pub note: Option<String>,
}

impl DiffResult {
    pub fn first_snapshot(current: String) -> Self {
        Self {
            previous: None,
            current,
            note: Some("first snapshot, nothing to compare against".into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stats.total_changes == 0
    }
}
