use serde::Serialize;

use crate::error::AppError;
use crate::ledger::{self, Ledger};
use crate::models::repo::{CreateRepoRequest, RepoInfo, RepoMeta};
use crate::services::{blocking, open_ledger};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct StorageTotals {
    pub repo_count: usize,
    pub total_size_bytes: u64,
}

pub async fn create_repo(state: &AppState, req: CreateRepoRequest) -> Result<RepoMeta, AppError> {
    let repos_dir = state.config.repos_dir();
    let extension = state.codec.extension();
    let name = req.name.trim().to_string();
    let description = req.description.unwrap_or_default();

    let meta = blocking(move || {
        std::fs::create_dir_all(&repos_dir)?;
        Ledger::create(&repos_dir, &name, description, extension).map(|(_, meta)| meta)
    })
    .await?;

    tracing::info!(repo_id = %meta.id, "Repository created");
    Ok(meta)
}

pub async fn list_repos(state: &AppState) -> Result<Vec<RepoMeta>, AppError> {
    let repos_dir = state.config.repos_dir();
    blocking(move || ledger::list_repos(&repos_dir)).await
}

pub async fn repo_info(state: &AppState, repo_id: &str) -> Result<RepoInfo, AppError> {
    let ledger = open_ledger(state, repo_id)?;
    blocking(move || {
        Ok(RepoInfo {
            meta: ledger.meta()?,
            stats: ledger.stats()?,
        })
    })
    .await
}

pub async fn update_description(
    state: &AppState,
    repo_id: &str,
    description: String,
) -> Result<RepoMeta, AppError> {
    let ledger = open_ledger(state, repo_id)?;
    let meta = blocking(move || ledger.update_description(description)).await?;
    tracing::info!(repo_id = %meta.id, "Repository description updated");
    Ok(meta)
}

pub async fn delete_repo(state: &AppState, repo_id: &str) -> Result<(), AppError> {
    let ledger = open_ledger(state, repo_id)?;
    blocking(move || ledger.delete()).await
}

/// Number of repositories and bytes held in their archives.
pub async fn storage_totals(state: &AppState) -> Result<StorageTotals, AppError> {
    let repos_dir = state.config.repos_dir();
    let extension = state.codec.extension();
    blocking(move || {
        let repos = ledger::list_repos(&repos_dir)?;
        let mut total_size_bytes = 0u64;
        for repo in &repos {
            if let Ok(ledger) = Ledger::open(&repos_dir, &repo.id, extension) {
                total_size_bytes += ledger.stats().map(|s| s.total_size).unwrap_or(0);
            }
        }
        Ok(StorageTotals {
            repo_count: repos.len(),
            total_size_bytes,
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn state(dir: &std::path::Path) -> AppState {
        AppState::new(AppConfig::with_data_dir(dir.to_string_lossy()))
    }

    #[tokio::test]
    async fn create_list_describe_delete() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state(tmp.path());

        let meta = create_repo(
            &state,
            CreateRepoRequest {
                name: "alpha".into(),
                description: Some("first".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(meta.name, "alpha");
        assert_eq!(meta.description, "first");

        let updated = update_description(&state, "alpha", "second".into()).await.unwrap();
        assert_eq!(updated.description, "second");

        let repos = list_repos(&state).await.unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].description, "second");

        delete_repo(&state, "alpha").await.unwrap();
        assert!(list_repos(&state).await.unwrap().is_empty());
        assert!(matches!(
            repo_info(&state, "alpha").await,
            Err(AppError::RepoNotFound(_))
        ));
    }

    #[tokio::test]
    async fn invalid_names_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let err = create_repo(
            &state(tmp.path()),
            CreateRepoRequest {
                name: "bad name!".into(),
                description: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidName(_)));
    }
}
