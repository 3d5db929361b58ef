//! Fetching snapshots from a remote server.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use crate::error::AppError;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    error: Option<RemoteError>,
}

#[derive(Debug, Deserialize)]
struct RemoteError {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    message: String,
}

pub fn client() -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .user_agent(concat!("snapkeep/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AppError::Internal(format!("cannot build HTTP client: {}", e)))
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn request_error(url: &str, e: reqwest::Error, timeout: Duration) -> AppError {
    if e.is_timeout() {
        AppError::TransferTimeout(timeout.as_secs())
    } else {
        AppError::Io(std::io::Error::other(format!("request to {} failed: {}", url, e)))
    }
}

/// Turn a non-success response into an error, using the server's envelope
/// when it sent one.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let (kind, message) = match serde_json::from_str::<Envelope<serde_json::Value>>(&body) {
        Ok(Envelope { error: Some(err), .. }) => (err.kind, err.message),
        _ => (String::new(), body),
    };
    Err(remote_error(status, &kind, message))
}

/// Rebuild the server's error from its envelope `kind`, so a remote
/// `commit_not_found` is the same error locally. The message is the server's
/// rendering, so the variant's own wording is stripped back off.
fn remote_error(status: reqwest::StatusCode, kind: &str, message: String) -> AppError {
    let rebuild: Option<fn(String) -> AppError> = match kind {
        "invalid_source" => Some(AppError::InvalidSource),
        "empty_snapshot" => Some(AppError::EmptySnapshot),
        "repo_not_found" => Some(AppError::RepoNotFound),
        "repo_already_exists" => Some(AppError::RepoAlreadyExists),
        "invalid_name" => Some(AppError::InvalidName),
        "commit_not_found" => Some(AppError::CommitNotFound),
        "corrupt_ledger" => Some(AppError::CorruptLedger),
        "unsafe_archive" => Some(AppError::UnsafeArchive),
        "corrupt_archive" => Some(AppError::CorruptArchive),
        "transfer_too_large" => Some(AppError::TransferTooLarge),
        "not_found" => Some(AppError::NotFound),
        "bad_request" => Some(AppError::BadRequest),
        "payload_too_large" => Some(AppError::PayloadTooLarge),
        "internal" => Some(AppError::Internal),
        _ => None,
    };
    if let Some(make) = rebuild {
        let template = make(DETAIL_MARK.to_string()).to_string();
        return make(strip_template(&template, &message));
    }
    match status.as_u16() {
        404 => AppError::NotFound(message),
        400 => AppError::BadRequest(message),
        413 => AppError::PayloadTooLarge(message),
        _ => AppError::Internal(format!("server responded with {}: {}", status, message)),
    }
}

const DETAIL_MARK: &str = "\u{0}";

fn strip_template(template: &str, message: &str) -> String {
    template
        .split_once(DETAIL_MARK)
        .and_then(|(prefix, suffix)| message.strip_prefix(prefix)?.strip_suffix(suffix))
        .unwrap_or(message)
        .to_string()
}

/// GET `url` and unwrap the `data` member of the JSON envelope.
pub async fn fetch_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<T, AppError> {
    let fetch = async {
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error(url, e, timeout))?;
        let response = check_status(response).await?;
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("malformed response from {}: {}", url, e)))?;
        envelope
            .data
            .ok_or_else(|| AppError::Internal(format!("response from {} has no data", url)))
    };
    match tokio::time::timeout(timeout, fetch).await {
        Ok(result) => result,
        Err(_) => Err(AppError::TransferTimeout(timeout.as_secs())),
    }
}

/// Stream `url` into `dest`. The body lands in `<dest>.part` and is renamed
/// only when complete; on any failure no partial file remains.
pub async fn download_to(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    timeout: Duration,
    max_bytes: u64,
) -> Result<u64, AppError> {
    let part = part_path(dest);
    let outcome = tokio::time::timeout(timeout, stream_to(client, url, &part, timeout, max_bytes)).await;
    let result = match outcome {
        Ok(result) => result,
        Err(_) => Err(AppError::TransferTimeout(timeout.as_secs())),
    };

    match result {
        Ok(bytes) => {
            tokio::fs::rename(&part, dest).await?;
            tracing::info!(url, bytes, dest = %dest.display(), "Download complete");
            Ok(bytes)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&part).await;
            tracing::warn!(url, error = %e, "Download failed");
            Err(e)
        }
    }
}

async fn stream_to(
    client: &reqwest::Client,
    url: &str,
    part: &Path,
    timeout: Duration,
    max_bytes: u64,
) -> Result<u64, AppError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| request_error(url, e, timeout))?;
    let response = check_status(response).await?;

    if let Some(length) = response.content_length() {
        if length > max_bytes {
            return Err(AppError::TransferTooLarge(format!(
                "{} bytes announced, limit is {}",
                length, max_bytes
            )));
        }
    }

    if let Some(parent) = part.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(part).await?;
    let mut stream = response.bytes_stream();
    let mut total = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| request_error(url, e, timeout))?;
        total += chunk.len() as u64;
        if total > max_bytes {
            return Err(AppError::TransferTooLarge(format!(
                "more than {} bytes received",
                max_bytes
            )));
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(total)
}
