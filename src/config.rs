use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3350;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
pub const DEFAULT_MAX_TRANSFER_SIZE: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: String,
    pub max_upload_size: u64,
    pub max_file_size: u64,
    pub max_download_size: u64,
    pub transfer_timeout_secs: u64,
    pub server_url: String,
    pub log_level: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: parse_env("PORT", DEFAULT_PORT),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "./data".into()),
            max_upload_size: parse_env("MAX_UPLOAD_SIZE", DEFAULT_MAX_TRANSFER_SIZE),
            max_file_size: parse_env("MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE),
            max_download_size: parse_env("MAX_DOWNLOAD_SIZE", DEFAULT_MAX_TRANSFER_SIZE),
            transfer_timeout_secs: parse_env("TRANSFER_TIMEOUT_SECS", 60),
            server_url: env::var("SNAPKEEP_SERVER")
                .unwrap_or_else(|_| format!("http://localhost:{}", DEFAULT_PORT)),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
        }
    }

    /// Configuration rooted at `data_dir` with every other knob at its default.
    pub fn with_data_dir(data_dir: impl Into<String>) -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            data_dir: data_dir.into(),
            max_upload_size: DEFAULT_MAX_TRANSFER_SIZE,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_download_size: DEFAULT_MAX_TRANSFER_SIZE,
            transfer_timeout_secs: 60,
            server_url: format!("http://localhost:{}", DEFAULT_PORT),
            log_level: "info".into(),
        }
    }

    pub fn repos_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("repos")
    }

    pub fn repo_dir(&self, repo_id: &str) -> PathBuf {
        self.repos_dir().join(repo_id)
    }

    pub fn versions_dir(&self, repo_id: &str) -> PathBuf {
        self.repo_dir(repo_id).join("versions")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("uploads")
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_layout_hangs_off_data_dir() {
        let config = AppConfig::with_data_dir("/srv/snapkeep");
        assert_eq!(config.repos_dir(), PathBuf::from("/srv/snapkeep/repos"));
        assert_eq!(
            config.versions_dir("demo"),
            PathBuf::from("/srv/snapkeep/repos/demo/versions")
        );
        assert_eq!(config.uploads_dir(), PathBuf::from("/srv/snapkeep/uploads"));
        assert_eq!(config.max_file_size, 100 * 1024 * 1024);
    }
}
