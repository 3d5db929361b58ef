use axum::extract::State;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::services::diff_service;
use crate::state::AppState;
use super::extract::{Json, Path};

pub async fn diff_snapshot(
    State(state): State<AppState>,
    Path((repo_id, commit_ref)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let diff = diff_service::diff_snapshot(&state, &repo_id, Some(commit_ref)).await?;
    Ok(Json(json!({ "data": diff, "error": null })))
}
