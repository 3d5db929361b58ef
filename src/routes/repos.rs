use axum::extract::State;
use axum::http::StatusCode;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::models::repo::{CreateRepoRequest, UpdateDescriptionRequest};
use crate::services::repo_service;
use crate::state::AppState;
use super::extract::{Json, Path};

pub async fn create_repo(
    State(state): State<AppState>,
    Json(req): Json<CreateRepoRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::InvalidName("name is required".into()));
    }

    let repo = repo_service::create_repo(&state, req).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "data": repo, "error": null })),
    ))
}

pub async fn list_repos(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let repos = repo_service::list_repos(&state).await?;

    Ok(Json(json!({
        "data": {
            "total": repos.len(),
            "repos": repos,
        },
        "error": null
    })))
}

pub async fn repo_info(
    State(state): State<AppState>,
    Path(repo_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let info = repo_service::repo_info(&state, &repo_id).await?;
    Ok(Json(json!({ "data": info, "error": null })))
}

pub async fn update_description(
    State(state): State<AppState>,
    Path(repo_id): Path<String>,
    Json(req): Json<UpdateDescriptionRequest>,
) -> Result<Json<Value>, AppError> {
    let repo = repo_service::update_description(&state, &repo_id, req.description).await?;
    Ok(Json(json!({ "data": repo, "error": null })))
}

pub async fn delete_repo(
    State(state): State<AppState>,
    Path(repo_id): Path<String>,
) -> Result<StatusCode, AppError> {
    repo_service::delete_repo(&state, &repo_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
