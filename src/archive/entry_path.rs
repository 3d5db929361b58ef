use crate::error::AppError;
use std::path::{Component, Path, PathBuf};

/// Validate and normalize a relative path supplied by a client.
/// Rejects path traversal attempts and returns a clean forward-slash path.
pub fn validate_relative_path(rel_path: &str) -> Result<String, AppError> {
    if rel_path.is_empty() {
        return Err(AppError::BadRequest("Empty path".into()));
    }
    if rel_path.contains('\0') {
        return Err(AppError::BadRequest("Null bytes not allowed in path".into()));
    }

    let unified = rel_path.replace('\\', "/");
    let mut parts = Vec::new();
    for component in Path::new(&unified).components() {
        match component {
            Component::ParentDir => {
                return Err(AppError::BadRequest("Path traversal not allowed".into()));
            }
            Component::Normal(s) => parts.push(s.to_string_lossy().into_owned()),
            // Leading slashes and "." segments are dropped
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }

    let result = parts.join("/");
    if result.is_empty() {
        return Err(AppError::BadRequest("Path resolves to empty".into()));
    }
    Ok(result)
}

/// Normalize an entry name as stored in an archive: strip a leading `./`
/// and any trailing `/`.
pub fn normalize_entry_name(raw: &str) -> String {
    let mut name = raw;
    while let Some(rest) = name.strip_prefix("./") {
        name = rest;
    }
    name.trim_end_matches('/').to_string()
}

/// Check an archive entry name against the escape rules. Unlike
/// [`validate_relative_path`] nothing is silently dropped: an absolute,
/// drive-rooted or parent-relative name makes the whole archive unsafe.
pub fn check_entry_name(raw: &str) -> Result<(), AppError> {
    if raw.contains('\0') {
        return Err(AppError::UnsafeArchive(format!("entry name contains NUL: {:?}", raw)));
    }
    if raw.starts_with('/') || raw.starts_with('\\') {
        return Err(AppError::UnsafeArchive(format!("absolute entry path: {}", raw)));
    }
    if is_drive_path(raw) {
        return Err(AppError::UnsafeArchive(format!("drive-rooted entry path: {}", raw)));
    }
    if raw.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(AppError::UnsafeArchive(format!("parent-directory segment in entry: {}", raw)));
    }
    Ok(())
}

fn is_drive_path(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Join a checked entry name onto an extraction root.
pub fn join_within(root: &Path, entry: &str) -> Result<PathBuf, AppError> {
    check_entry_name(entry)?;
    let mut out = root.to_path_buf();
    for segment in entry.split('/').filter(|s| !s.is_empty() && *s != ".") {
        out.push(segment);
    }
    Ok(out)
}

/// Validate that a resolved path is within the given root directory.
pub fn ensure_within_root(root: &Path, resolved: &Path) -> Result<(), AppError> {
    let canon_root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let canon_resolved = resolved
        .canonicalize()
        .unwrap_or_else(|_| resolved.to_path_buf());

    if !canon_resolved.starts_with(&canon_root) {
        return Err(AppError::UnsafeArchive(format!(
            "{} escapes {}",
            resolved.display(),
            root.display()
        )));
    }
    Ok(())
}
