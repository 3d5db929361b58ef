//! Read-only views into a stored snapshot: directory listings, single files,
//! text previews.

use std::collections::BTreeMap;
use std::path::Path;

use crate::archive::{entry_path, ArchiveEntry};
use crate::error::AppError;
use crate::models::browse::{BrowseEntry, BrowseListing, EntryKind, FileCheck, FilePreview};
use crate::services::{blocking, open_ledger};
use crate::state::AppState;

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "js", "json", "html", "css", "md", "xml", "yml", "yaml", "php", "py", "java", "c",
    "cpp", "h", "cs", "rb", "go", "rs", "ts", "jsx", "tsx", "vue", "svelte", "sql", "ini", "cfg",
    "conf", "log", "sh", "bash", "zsh", "fish", "mjs", "cjs", "env", "toml", "lock", "csv",
];

const TEXT_FILE_NAMES: &[&str] = &[
    "dockerfile", "makefile", "procfile", "gemfile", "license", "readme",
];

const BINARY_DOTFILES: &[&str] = &[".ds_store", ".localized"];

/// Extension and filename heuristic used for previews.
pub fn is_text_file(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path).to_ascii_lowercase();
    if BINARY_DOTFILES.contains(&name.as_str()) {
        return false;
    }
    if let Some(ext) = Path::new(&name).extension().and_then(|e| e.to_str()) {
        if TEXT_EXTENSIONS.contains(&ext) {
            return true;
        }
    }
    if name.starts_with('.') && name.len() > 1 {
        return true;
    }
    TEXT_FILE_NAMES.contains(&name.as_str())
}

/// Content heuristic: fewer than 10% control characters (tab, CR and LF
/// excluded). Empty content counts as text.
pub fn content_is_text(data: &[u8]) -> bool {
    let text = String::from_utf8_lossy(data);
    let total = text.chars().count();
    if total == 0 {
        return true;
    }
    let control = text
        .chars()
        .filter(|c| {
            let code = *c as u32;
            (code < 32 && !matches!(c, '\t' | '\n' | '\r')) || code == 127
        })
        .count();
    (control as f64) / (total as f64) < 0.1
}

/// Collapse duplicate slashes and drop leading/trailing ones. `..` is refused.
pub fn normalize_browse_path(raw: &str) -> Result<String, AppError> {
    let parts: Vec<&str> = raw.split('/').filter(|p| !p.is_empty() && *p != ".").collect();
    if parts.iter().any(|p| *p == "..") {
        return Err(AppError::BadRequest("path may not contain '..'".into()));
    }
    Ok(parts.join("/"))
}

/// Immediate children of `dir` (empty for the root), directories first.
pub fn list_directory(entries: &[ArchiveEntry], dir: &str) -> Vec<BrowseEntry> {
    let prefix = if dir.is_empty() {
        String::new()
    } else {
        format!("{}/", dir)
    };

    let mut children: BTreeMap<String, BrowseEntry> = BTreeMap::new();
    for entry in entries {
        let Some(rest) = entry.path.strip_prefix(prefix.as_str()) else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }
        let mut parts = rest.splitn(2, '/');
        let name = parts.next().unwrap_or(rest);
        let nested = parts.next().is_some_and(|r| !r.is_empty());
        let is_dir = entry.is_dir || nested;

        let path = format!("{}{}{}", prefix, name, if is_dir { "/" } else { "" });
        children
            .entry(name.to_string())
            .and_modify(|existing| {
                if is_dir && existing.kind == EntryKind::File {
                    existing.kind = EntryKind::Dir;
                    existing.path = path.clone();
                }
            })
            .or_insert_with(|| BrowseEntry {
                name: name.to_string(),
                path: path.clone(),
                kind: if is_dir { EntryKind::Dir } else { EntryKind::File },
                size: if is_dir { 0 } else { entry.size },
            });
    }

    let mut listing: Vec<BrowseEntry> = children.into_values().collect();
    listing.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));
    listing
}

pub async fn browse(
    state: &AppState,
    repo_id: &str,
    path: Option<String>,
    commit_ref: Option<String>,
) -> Result<BrowseListing, AppError> {
    let ledger = open_ledger(state, repo_id)?;
    let codec = state.codec.clone();
    let current_path = normalize_browse_path(path.as_deref().unwrap_or(""))?;

    blocking(move || {
        let commit_file = ledger.resolve_or_latest(commit_ref.as_deref())?;
        let entries = codec.read_all(&ledger.archive_path(&commit_file))?;
        let files = list_directory(&entries, &current_path);
        Ok(BrowseListing {
            commit_file,
            current_path,
            files,
        })
    })
    .await
}

pub struct SnapshotFile {
    pub filename: String,
    pub content_type: String,
    pub is_text: bool,
    pub data: Vec<u8>,
}

/// Read one file out of a snapshot.
pub async fn read_file(
    state: &AppState,
    repo_id: &str,
    commit_ref: String,
    file_path: &str,
) -> Result<SnapshotFile, AppError> {
    let rel_path = entry_path::validate_relative_path(file_path)?;
    let ledger = open_ledger(state, repo_id)?;
    let codec = state.codec.clone();

    blocking(move || {
        let commit_file = ledger.resolve(&commit_ref)?;
        let data = codec.read_one(&ledger.archive_path(&commit_file), &rel_path)?;
        Ok(SnapshotFile {
            filename: rel_path.rsplit('/').next().unwrap_or(&rel_path).to_string(),
            content_type: mime_guess::from_path(&rel_path)
                .first_or_octet_stream()
                .to_string(),
            is_text: is_text_file(&rel_path),
            data,
        })
    })
    .await
}

pub async fn preview(
    state: &AppState,
    repo_id: &str,
    commit_ref: String,
    file_path: &str,
) -> Result<FilePreview, AppError> {
    let file = read_file(state, repo_id, commit_ref, file_path).await?;
    if !file.is_text {
        return Err(AppError::BadRequest(format!(
            "{} is not a text file, preview unavailable",
            file.filename
        )));
    }
    let content = String::from_utf8_lossy(&file.data).into_owned();
    Ok(FilePreview {
        size: content.len(),
        content,
        kind: "text",
        filename: file.filename,
    })
}

pub async fn check_file(
    state: &AppState,
    repo_id: &str,
    commit_ref: String,
    file_path: &str,
) -> Result<FileCheck, AppError> {
    let file = read_file(state, repo_id, commit_ref, file_path).await?;
    Ok(FileCheck {
        is_text: file.is_text,
        is_content_text: content_is_text(&file.data),
        size: file.data.len() as u64,
        filename: file.filename,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, size: u64) -> ArchiveEntry {
        ArchiveEntry {
            path: path.into(),
            size,
            is_dir: false,
            mtime: 0,
        }
    }

    #[test]
    fn listing_groups_nested_paths_into_directories() {
        let entries = vec![
            file("README.md", 10),
            file("src/main.rs", 20),
            file("src/lib/mod.rs", 30),
            file("assets/logo.png", 40),
        ];

        let root = list_directory(&entries, "");
        let names: Vec<_> = root.iter().map(|e| (e.name.as_str(), e.kind)).collect();
        assert_eq!(
            names,
            vec![
                ("assets", EntryKind::Dir),
                ("src", EntryKind::Dir),
                ("README.md", EntryKind::File),
            ]
        );
        assert_eq!(root[1].path, "src/");

        let src = list_directory(&entries, "src");
        assert_eq!(src[0].path, "src/lib/");
        assert_eq!(src[1].path, "src/main.rs");
        assert_eq!(src[1].size, 20);
    }

    #[test]
    fn browse_paths_are_cleaned() {
        assert_eq!(normalize_browse_path("//src///lib/").unwrap(), "src/lib");
        assert_eq!(normalize_browse_path("").unwrap(), "");
        assert!(normalize_browse_path("src/../..").is_err());
    }

    #[test]
    fn text_heuristics() {
        assert!(is_text_file("src/main.rs"));
        assert!(is_text_file("Dockerfile"));
        assert!(is_text_file("config/.env"));
        assert!(!is_text_file(".DS_Store"));
        assert!(!is_text_file("logo.png"));

        assert!(content_is_text(b"hello\nworld\t!"));
        assert!(!content_is_text(&[0u8, 1, 2, 3, b'a']));
    }
}
