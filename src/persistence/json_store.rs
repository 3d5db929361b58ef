use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::AppError;

/// Write a JSON document by rewriting it completely: temp file, then rename.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AppError> {
    let tmp_path = tmp_path(path);
    let data = serde_json::to_vec_pretty(value)
        .map_err(|e| AppError::Internal(format!("Cannot encode {}: {}", path.display(), e)))?;
    std::fs::write(&tmp_path, &data)?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}

/// Read a JSON document. A missing file is `Ok(None)`. A malformed one is
/// `CorruptLedger`: it is never replaced by a default, since the next write
/// would overwrite whatever history it still holds.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, AppError> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read(path)?;
    serde_json::from_slice::<T>(&data).map(Some).map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "Failed to parse document");
        AppError::CorruptLedger(format!("{} is unreadable: {}", path.display(), e))
    })
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_replaces_whole_document() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("doc.json");
        save_json(&path, &vec![1, 2, 3]).unwrap();
        save_json(&path, &vec![4]).unwrap();
        let loaded: Option<Vec<i32>> = load_json(&path).unwrap();
        assert_eq!(loaded, Some(vec![4]));
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn missing_document_is_none_and_malformed_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("doc.json");
        assert_eq!(load_json::<Vec<i32>>(&path).unwrap(), None);
        std::fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(
            load_json::<Vec<i32>>(&path),
            Err(AppError::CorruptLedger(_))
        ));
    }
}
