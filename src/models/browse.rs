use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Dir,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrowseEntry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrowseListing {
    pub commit_file: String,
    pub current_path: String,
    pub files: Vec<BrowseEntry>,
}

#[derive(Debug, Deserialize)]
pub struct BrowseQuery {
    pub path: Option<String>,
    pub commit: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilePreview {
    pub content: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub size: usize,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileCheck {
    pub is_text: bool,
    pub is_content_text: bool,
    pub size: u64,
    pub filename: String,
}
