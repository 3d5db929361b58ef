pub mod diff;
pub mod extract;
pub mod files;
pub mod health;
pub mod repos;
pub mod snapshots;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let max_upload = usize::try_from(state.config.max_upload_size).unwrap_or(usize::MAX);

    let api_routes = Router::new()
        .route("/status", get(health::status))
        // Repositories
        .route("/repos", post(repos::create_repo).get(repos::list_repos))
        .route("/repos/{repo_id}", delete(repos::delete_repo))
        .route("/repos/{repo_id}/info", get(repos::repo_info))
        .route("/repos/{repo_id}/comment", post(repos::update_description))
        // Snapshots
        .route("/repos/{repo_id}/snapshot", post(snapshots::upload_snapshot))
        .route("/repos/{repo_id}/snapshot/{commit_ref}", get(snapshots::snapshot_info))
        .route("/repos/{repo_id}/latest", get(snapshots::latest))
        .route("/repos/{repo_id}/history", get(snapshots::history))
        .route("/repos/{repo_id}/download/{commit_ref}", get(snapshots::download))
        .route("/repos/{repo_id}/commit/{commit_ref}", delete(snapshots::delete_commit))
        // Snapshot contents
        .route("/repos/{repo_id}/browse", get(files::browse))
        .route("/repos/{repo_id}/file/{commit_ref}/{*file_path}", get(files::download_file))
        .route("/repos/{repo_id}/preview/{commit_ref}/{*file_path}", get(files::preview_file))
        .route("/repos/{repo_id}/checkfile/{commit_ref}/{*file_path}", get(files::check_file))
        .route("/repos/{repo_id}/diff/{commit_ref}", get(diff::diff_snapshot));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let x_request_id = http::HeaderName::from_static("x-request-id");

    Router::new()
        .route("/health", get(health::health))
        .nest("/api", api_routes)
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_upload))
        .layer(middleware::map_response(extract::envelope_payload_limit))
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
