pub mod browse_service;
pub mod commit_service;
pub mod diff_service;
pub mod repo_service;

use crate::error::AppError;
use crate::ledger::Ledger;
use crate::state::AppState;

/// Run filesystem-heavy engine work off the async runtime.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AppError::Internal(format!("Blocking task failed: {}", e)))?
}

pub(crate) fn open_ledger(state: &AppState, repo_id: &str) -> Result<Ledger, AppError> {
    Ledger::open(&state.config.repos_dir(), repo_id, state.codec.extension())
}
