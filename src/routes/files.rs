use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::models::browse::BrowseQuery;
use crate::services::browse_service;
use crate::state::AppState;
use super::extract::{Json, Path, Query};

pub async fn browse(
    State(state): State<AppState>,
    Path(repo_id): Path<String>,
    Query(query): Query<BrowseQuery>,
) -> Result<Json<Value>, AppError> {
    let listing = browse_service::browse(&state, &repo_id, query.path, query.commit).await?;
    Ok(Json(json!({ "data": listing, "error": null })))
}

pub async fn download_file(
    State(state): State<AppState>,
    Path((repo_id, commit_ref, file_path)): Path<(String, String, String)>,
) -> Result<Response, AppError> {
    let file = browse_service::read_file(&state, &repo_id, commit_ref, &file_path).await?;

    let disposition = if file.is_text { "inline" } else { "attachment" };
    let response = Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", &file.content_type)
        .header("Content-Length", file.data.len().to_string())
        .header(
            "Content-Disposition",
            format!("{}; filename=\"{}\"", disposition, file.filename),
        )
        .header("Cache-Control", "max-age=60")
        .body(Body::from(file.data))
        .map_err(|e| AppError::Internal(format!("Cannot build response: {}", e)))?;

    Ok(response)
}

pub async fn preview_file(
    State(state): State<AppState>,
    Path((repo_id, commit_ref, file_path)): Path<(String, String, String)>,
) -> Result<Json<Value>, AppError> {
    let preview = browse_service::preview(&state, &repo_id, commit_ref, &file_path).await?;
    Ok(Json(json!({ "data": preview, "error": null })))
}

pub async fn check_file(
    State(state): State<AppState>,
    Path((repo_id, commit_ref, file_path)): Path<(String, String, String)>,
) -> Result<Json<Value>, AppError> {
    let check = browse_service::check_file(&state, &repo_id, commit_ref, &file_path).await?;
    Ok(Json(json!({ "data": check, "error": null })))
}
