use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use serde_json::{json, Value};
use tokio_util::io::ReaderStream;

use crate::error::AppError;
use crate::models::commit::UploadSnapshotQuery;
use crate::services::commit_service::{self, DEFAULT_MESSAGE};
use crate::state::AppState;
use super::extract::{Json, Path, Query};

/// The request body is the archive itself, streamed to disk.
pub async fn upload_snapshot(
    State(state): State<AppState>,
    Path(repo_id): Path<String>,
    Query(query): Query<UploadSnapshotQuery>,
    body: Body,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let message = query
        .message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MESSAGE.to_string());

    // Fail before reading the body if the repository does not exist.
    commit_service::ensure_repo(&state, &repo_id)?;

    let staged = commit_service::stage_upload(&state, &repo_id, body.into_data_stream()).await?;
    let record = commit_service::register_upload(&state, &repo_id, staged, message).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "data": record, "error": null })),
    ))
}

pub async fn history(
    State(state): State<AppState>,
    Path(repo_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let commits = commit_service::history(&state, &repo_id).await?;
    Ok(Json(json!({ "data": commits, "error": null })))
}

pub async fn latest(
    State(state): State<AppState>,
    Path(repo_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let info = commit_service::snapshot_info(&state, &repo_id, None).await?;
    Ok(Json(json!({ "data": info, "error": null })))
}

pub async fn snapshot_info(
    State(state): State<AppState>,
    Path((repo_id, commit_ref)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let info = commit_service::snapshot_info(&state, &repo_id, Some(commit_ref)).await?;
    Ok(Json(json!({ "data": info, "error": null })))
}

pub async fn download(
    State(state): State<AppState>,
    Path((repo_id, commit_ref)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let (file_name, path) = commit_service::archive_path(&state, &repo_id, commit_ref).await?;

    let file = tokio::fs::File::open(&path).await?;
    let size = file.metadata().await?.len();
    let body = Body::from_stream(ReaderStream::new(file));

    let response = Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/gzip")
        .header("Content-Length", size.to_string())
        .header(
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", file_name),
        )
        .body(body)
        .map_err(|e| AppError::Internal(format!("Cannot build response: {}", e)))?;

    Ok(response)
}

pub async fn delete_commit(
    State(state): State<AppState>,
    Path((repo_id, commit_ref)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let file = commit_service::delete_commit(&state, &repo_id, commit_ref).await?;
    Ok(Json(json!({ "data": { "deleted": file }, "error": null })))
}
