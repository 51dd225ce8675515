use std::time::Duration;

use thiserror::Error;

/// Failure resolving a single asset. Never escapes [`crate::Synchronizer::synchronize`].
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("durable cache unavailable: {0}")]
    CacheUnavailable(String),
    #[error("cache io error: {0}")]
    Cache(#[from] std::io::Error),
    #[error("cache index error: {0}")]
    CacheIndex(#[from] serde_json::Error),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("asset timed out after {0:?}")]
    Timeout(Duration),
    #[error("could not read asset body: {0}")]
    Conversion(String),
    #[error("invalid asset url: {0}")]
    InvalidUrl(String),
}

impl AssetError {
    /// Transport errors and server-side statuses are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            AssetError::Network(err) => !err.is_builder(),
            AssetError::Status(code) => *code >= 500,
            AssetError::Timeout(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parsing error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no configuration directory on this platform")]
    NoConfigDir,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("synchronizer task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
