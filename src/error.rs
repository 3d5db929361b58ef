use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Nothing to snapshot: {0}")]
    EmptySnapshot(String),

    #[error("Repository '{0}' does not exist")]
    RepoNotFound(String),

    #[error("Repository '{0}' already exists")]
    RepoAlreadyExists(String),

    #[error("Invalid repository name: {0}")]
    InvalidName(String),

    #[error("Snapshot not found: {0}")]
    CommitNotFound(String),

    #[error("Ledger document unreadable: {0}")]
    CorruptLedger(String),

    #[error("Unsafe archive: {0}")]
    UnsafeArchive(String),

    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("{0} conflicting file(s) need a decision before restoring")]
    ConflictsPending(usize),

    #[error("Transfer timed out after {0}s")]
    TransferTimeout(u64),

    #[error("Transfer too large: {0}")]
    TransferTooLarge(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidSource(_) => "invalid_source",
            AppError::EmptySnapshot(_) => "empty_snapshot",
            AppError::RepoNotFound(_) => "repo_not_found",
            AppError::RepoAlreadyExists(_) => "repo_already_exists",
            AppError::InvalidName(_) => "invalid_name",
            AppError::CommitNotFound(_) => "commit_not_found",
            AppError::CorruptLedger(_) => "corrupt_ledger",
            AppError::UnsafeArchive(_) => "unsafe_archive",
            AppError::CorruptArchive(_) => "corrupt_archive",
            AppError::ConflictsPending(_) => "conflicts_pending",
            AppError::TransferTimeout(_) => "transfer_timeout",
            AppError::TransferTooLarge(_) => "transfer_too_large",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::PayloadTooLarge(_) => "payload_too_large",
            AppError::Internal(_) => "internal",
            AppError::Io(_) => "io_failure",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::RepoNotFound(_) | AppError::CommitNotFound(_) | AppError::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            AppError::RepoAlreadyExists(_) | AppError::ConflictsPending(_) => StatusCode::CONFLICT,
            AppError::InvalidSource(_)
            | AppError::EmptySnapshot(_)
            | AppError::InvalidName(_)
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::UnsafeArchive(_) | AppError::CorruptArchive(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::TransferTooLarge(_) | AppError::PayloadTooLarge(_) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            AppError::TransferTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::CorruptLedger(_) | AppError::Internal(_) | AppError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = %status, kind = self.kind(), error = %message);
        } else {
            tracing::warn!(status = %status, kind = self.kind(), error = %message);
        }

        let body = json!({
            "data": null,
            "error": {
                "code": status.as_u16(),
                "kind": self.kind(),
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_surface_as_io_failure() {
        let err: AppError = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert_eq!(err.kind(), "io_failure");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn lookup_failures_map_to_404() {
        assert_eq!(AppError::RepoNotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::CommitNotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::InvalidName("x".into()).kind(), "invalid_name");
    }
}
