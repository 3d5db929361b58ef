use std::path::PathBuf;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;

use crate::error::AppError;
use crate::ledger::Ledger;
use crate::models::commit::{CommitRecord, SnapshotInfo};
use crate::services::{blocking, open_ledger};
use crate::snapshot::build_snapshot;
use crate::state::AppState;

pub const DEFAULT_MESSAGE: &str = "snapshot";

pub fn ensure_repo(state: &AppState, repo_id: &str) -> Result<(), AppError> {
    open_ledger(state, repo_id).map(|_| ())
}

/// Snapshot `source` and append it to the repository's ledger.
pub async fn commit_from_source(
    state: &AppState,
    repo_id: &str,
    source: PathBuf,
    message: String,
) -> Result<CommitRecord, AppError> {
    let ledger = open_ledger(state, repo_id)?;
    let codec = state.codec.clone();
    let max_file_size = state.config.max_file_size;

    blocking(move || {
        let built = build_snapshot(codec.as_ref(), &source, &ledger.versions_dir(), max_file_size)?;
        let recorded = ledger.record_snapshot(&built, &message);
        if recorded.is_err() {
            let _ = std::fs::remove_file(&built.archive_path);
        }
        recorded
    })
    .await
}

/// Write an incoming archive body to the uploads directory, enforcing the
/// upload ceiling. Returns the staged path.
pub async fn stage_upload<S, E>(state: &AppState, repo_id: &str, mut body: S) -> Result<PathBuf, AppError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::error::Error + 'static,
{
    let uploads = state.config.uploads_dir();
    tokio::fs::create_dir_all(&uploads).await?;
    let staged = uploads.join(format!(
        "{}_{}.{}",
        repo_id,
        uuid::Uuid::new_v4().simple(),
        state.codec.extension()
    ));

    let limit = state.config.max_upload_size;
    let written = async {
        let mut file = tokio::fs::File::create(&staged).await?;
        let mut total = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| body_error(&e, limit))?;
            total += chunk.len() as u64;
            if total > limit {
                return Err(AppError::PayloadTooLarge(format!(
                    "upload exceeds {} bytes",
                    limit
                )));
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok::<u64, AppError>(total)
    }
    .await;

    match written {
        Ok(0) => {
            let _ = tokio::fs::remove_file(&staged).await;
            Err(AppError::BadRequest("received an empty upload".into()))
        }
        Ok(bytes) => {
            tracing::debug!(repo_id, bytes, "Upload staged");
            Ok(staged)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&staged).await;
            Err(e)
        }
    }
}

/// The body limit layer surfaces as a stream error once the ceiling is hit.
fn body_error(e: &(dyn std::error::Error + 'static), limit: u64) -> AppError {
    let mut cause = Some(e);
    while let Some(err) = cause {
        if err.is::<http_body_util::LengthLimitError>() {
            return AppError::PayloadTooLarge(format!("upload exceeds {} bytes", limit));
        }
        cause = err.source();
    }
    AppError::BadRequest(format!("upload interrupted: {}", e))
}

/// Validate a staged archive and move it into the repository.
pub async fn register_upload(
    state: &AppState,
    repo_id: &str,
    staged: PathBuf,
    message: String,
) -> Result<CommitRecord, AppError> {
    let ledger = match open_ledger(state, repo_id) {
        Ok(ledger) => ledger,
        Err(e) => {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(e);
        }
    };
    let codec = state.codec.clone();

    let record = blocking(move || {
        let registered = codec
            .validate(&staged, false)
            .and_then(|_| ledger.register_archive(codec.as_ref(), &staged, &message));
        if registered.is_err() && staged.exists() {
            let _ = std::fs::remove_file(&staged);
        }
        registered
    })
    .await?;

    tracing::info!(repo_id, file = %record.file, size = record.size, "Snapshot uploaded");
    Ok(record)
}

pub async fn history(state: &AppState, repo_id: &str) -> Result<Vec<CommitRecord>, AppError> {
    let ledger = open_ledger(state, repo_id)?;
    blocking(move || ledger.list()).await
}

fn info_for(ledger: &Ledger, file: String) -> Result<SnapshotInfo, AppError> {
    let size = std::fs::metadata(ledger.archive_path(&file))?.len();
    let record = ledger.find(&file)?;
    Ok(SnapshotInfo {
        size,
        date: record.as_ref().map(|r| r.date),
        message: record.as_ref().map(|r| r.message.clone()),
        file_count: record.as_ref().map(|r| r.file_count),
        file,
    })
}

/// Snapshot metadata by commit ref; `None` or `"latest"` mean the newest.
pub async fn snapshot_info(
    state: &AppState,
    repo_id: &str,
    commit_ref: Option<String>,
) -> Result<SnapshotInfo, AppError> {
    let ledger = open_ledger(state, repo_id)?;
    blocking(move || {
        let file = ledger.resolve_or_latest(commit_ref.as_deref())?;
        info_for(&ledger, file)
    })
    .await
}

/// Resolve a commit ref to its archive on disk.
pub async fn archive_path(
    state: &AppState,
    repo_id: &str,
    commit_ref: String,
) -> Result<(String, PathBuf), AppError> {
    let ledger = open_ledger(state, repo_id)?;
    blocking(move || {
        let file = ledger.resolve_or_latest(Some(&commit_ref))?;
        let path = ledger.archive_path(&file);
        Ok((file, path))
    })
    .await
}

pub async fn delete_commit(state: &AppState, repo_id: &str, commit_ref: String) -> Result<String, AppError> {
    let ledger = open_ledger(state, repo_id)?;
    blocking(move || ledger.remove(&commit_ref)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::models::repo::CreateRepoRequest;
    use crate::services::repo_service;

    async fn setup(tmp: &std::path::Path) -> AppState {
        let state = AppState::new(AppConfig::with_data_dir(tmp.join("data").to_string_lossy()));
        repo_service::create_repo(
            &state,
            CreateRepoRequest {
                name: "proj".into(),
                description: None,
            },
        )
        .await
        .unwrap();
        state
    }

    #[tokio::test]
    async fn commits_show_up_in_history_and_info() {
        let tmp = tempfile::tempdir().unwrap();
        let state = setup(tmp.path()).await;
        let source = tmp.path().join("work");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("a.txt"), "a").unwrap();

        let first = commit_from_source(&state, "proj", source.clone(), "one".into()).await.unwrap();
        std::fs::write(source.join("b.txt"), "b").unwrap();
        let second = commit_from_source(&state, "proj", source, "two".into()).await.unwrap();
        assert_eq!(second.file_count, 2);

        let listed = history(&state, "proj").await.unwrap();
        assert_eq!(listed[0].file, second.file);
        assert_eq!(listed[1].file, first.file);

        let latest = snapshot_info(&state, "proj", None).await.unwrap();
        assert_eq!(latest.file, second.file);
        assert_eq!(latest.message.as_deref(), Some("two"));

        let by_id = snapshot_info(&state, "proj", Some(first.id.clone())).await.unwrap();
        assert_eq!(by_id.file, first.file);
    }

    #[tokio::test]
    async fn oversized_upload_leaves_nothing_behind() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = AppConfig::with_data_dir(tmp.path().to_string_lossy());
        config.max_upload_size = 8;
        let state = AppState::new(config);

        let chunks = futures_util::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"12345")),
            Ok(Bytes::from_static(b"67890")),
        ]);
        let err = stage_upload(&state, "proj", chunks).await.unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge(_)));
        assert_eq!(std::fs::read_dir(state.config.uploads_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn garbage_upload_is_rejected_and_cleaned() {
        let tmp = tempfile::tempdir().unwrap();
        let state = setup(tmp.path()).await;
        let chunks = futures_util::stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(b"not an archive"))]);
        let staged = stage_upload(&state, "proj", chunks).await.unwrap();

        let err = register_upload(&state, "proj", staged.clone(), "m".into()).await.unwrap_err();
        assert!(matches!(err, AppError::CorruptArchive(_)));
        assert!(!staged.exists());
        assert!(history(&state, "proj").await.unwrap().is_empty());
    }
}
