use crate::archive::{ArchiveCodec, TarGzCodec};
use crate::config::AppConfig;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub codec: Arc<dyn ArchiveCodec>,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self::with_codec(config, Arc::new(TarGzCodec::default()))
    }

    pub fn with_codec(config: AppConfig, codec: Arc<dyn ArchiveCodec>) -> Self {
        Self {
            config: Arc::new(config),
            codec,
            start_time: chrono::Utc::now(),
        }
    }
}
