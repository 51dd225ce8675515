use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;

const APP_DIR: &str = "lumine-vault";
const CONFIG_ENV: &str = "LUMINE_VAULT_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub cache: CacheConfig,
    pub fetch: FetchConfig,
    pub sync: SyncConfig,
    /// Replaces the built-in site content when set.
    pub content_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Versioned cache name; bumping it starts from an empty cache.
    pub name: String,
    /// Parent directory of the cache. Defaults to the platform cache dir.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub request_timeout_seconds: u64,
    pub retry_attempts: u8,
    pub retry_backoff_ms: u64,
    pub user_agent: String,
    /// Sent as the `Origin` header so asset hosts apply their CORS rules.
    pub origin: Option<String>,
    pub max_redirects: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Deadline for one asset's lookup and fetch. `None` waits forever.
    pub asset_timeout_seconds: Option<u64>,
    /// Assets resolved at once. 1 keeps the loop strictly sequential.
    pub concurrency: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: "lumine-vault-v1".to_string(),
            dir: None,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 30,
            retry_attempts: 0,
            retry_backoff_ms: 250,
            user_agent: format!("LumineVault/{}", env!("CARGO_PKG_VERSION")),
            origin: None,
            max_redirects: 5,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            asset_timeout_seconds: Some(20),
            concurrency: 1,
        }
    }
}

impl CacheConfig {
    /// Directory holding this cache's index and entries.
    pub fn resolve_dir(&self) -> Option<PathBuf> {
        let parent = match &self.dir {
            Some(dir) => dir.clone(),
            None => dirs::cache_dir()?.join(APP_DIR),
        };
        Some(parent.join(&self.name))
    }
}

impl FetchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl SyncConfig {
    pub fn asset_timeout(&self) -> Option<Duration> {
        self.asset_timeout_seconds.map(Duration::from_secs)
    }
}

impl VaultConfig {
    /// Path of the configuration file, honouring `LUMINE_VAULT_CONFIG`.
    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join(APP_DIR).join("config.json"))
    }

    /// Loads the configuration, falling back to defaults when the file is
    /// missing or unreadable. Never fails startup.
    pub fn load() -> Self {
        let path = match Self::config_file_path() {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "no config path, using defaults");
                return Self::default();
            }
        };
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "failed to load config, using defaults");
                Self::default()
            }
        }
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read(path.as_ref())?;
        Ok(serde_json::from_slice(&content)?)
    }

    /// Writes the configuration atomically (temp file then rename).
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
