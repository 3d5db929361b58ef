use crate::diff;
use crate::error::AppError;
use crate::models::diff::DiffResult;
use crate::services::{blocking, open_ledger};
use crate::state::AppState;

/// Diff a snapshot against its predecessor. `"latest"` targets the newest.
pub async fn diff_snapshot(
    state: &AppState,
    repo_id: &str,
    commit_ref: Option<String>,
) -> Result<DiffResult, AppError> {
    let ledger = open_ledger(state, repo_id)?;
    let codec = state.codec.clone();
    let result = blocking(move || diff::diff(codec.as_ref(), &ledger.versions_dir(), commit_ref.as_deref())).await?;

    tracing::info!(
        repo_id,
        current = %result.current,
        previous = ?result.previous,
        changes = result.stats.total_changes,
        "Diff computed"
    );
    Ok(result)
}
