use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::asset::{AssetUrl, CachedAsset};
use crate::config::CacheConfig;
use crate::error::AssetError;

/// Durable key/value store of asset bodies, keyed by URL.
#[async_trait]
pub trait AssetCache: Send + Sync {
    async fn lookup(&self, url: &AssetUrl) -> Result<Option<CachedAsset>, AssetError>;
    async fn store(&self, url: &AssetUrl, asset: &CachedAsset) -> Result<(), AssetError>;
}

/// Opens the configured disk cache. When it cannot be opened every lookup
/// misses for the rest of the session.
pub async fn open_cache(config: &CacheConfig) -> Arc<dyn AssetCache> {
    let Some(dir) = config.resolve_dir() else {
        warn!("no cache directory on this platform, running without durable cache");
        return Arc::new(UnavailableCache::new("no cache directory"));
    };
    match DiskCache::open(&dir).await {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            warn!(error = %e, path = %dir.display(), "durable cache unavailable");
            Arc::new(UnavailableCache::new(e.to_string()))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct CacheIndex {
    next_id: u64,
    entries: HashMap<AssetUrl, IndexEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    file: String,
    content_type: Option<String>,
    len: u64,
    stored_at: DateTime<Utc>,
}

/// Cache directory layout: `index.json` plus one `entries/<n>.bin` per URL.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
    index: Arc<RwLock<CacheIndex>>,
}

impl DiskCache {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, AssetError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(dir.join("entries"))
            .await
            .map_err(|e| AssetError::CacheUnavailable(format!("{}: {e}", dir.display())))?;

        let index = read_index_with_tmp_fallback(&dir.join("index.json")).await;
        debug!(path = %dir.display(), entries = index.entries.len(), "opened asset cache");

        Ok(Self {
            dir,
            index: Arc::new(RwLock::new(index)),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn contains(&self, url: &AssetUrl) -> bool {
        self.index.read().await.entries.contains_key(url)
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn entry_path(&self, file: &str) -> PathBuf {
        self.dir.join("entries").join(file)
    }

    async fn persist_index(&self, index: &CacheIndex) -> Result<(), AssetError> {
        let bytes = serde_json::to_vec_pretty(index)?;
        let path = self.dir.join("index.json");
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

async fn read_index_with_tmp_fallback(path: &Path) -> CacheIndex {
    match tokio::fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice::<CacheIndex>(&bytes) {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "corrupted cache index, trying tmp fallback");
                let tmp = path.with_extension("json.tmp");
                match tokio::fs::read(&tmp).await {
                    Ok(tmp_bytes) => serde_json::from_slice(&tmp_bytes).unwrap_or_default(),
                    Err(_) => CacheIndex::default(),
                }
            }
        },
        Err(_) => CacheIndex::default(),
    }
}

#[async_trait]
impl AssetCache for DiskCache {
    async fn lookup(&self, url: &AssetUrl) -> Result<Option<CachedAsset>, AssetError> {
        let entry = match self.index.read().await.entries.get(url) {
            Some(entry) => entry.clone(),
            None => return Ok(None),
        };

        let bytes = match tokio::fs::read(self.entry_path(&entry.file)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(url = %url, file = %entry.file, "cache entry body missing");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        if bytes.len() as u64 != entry.len {
            warn!(url = %url, expected = entry.len, actual = bytes.len(), "truncated cache entry");
            return Ok(None);
        }

        Ok(Some(CachedAsset::new(bytes, entry.content_type)))
    }

    async fn store(&self, url: &AssetUrl, asset: &CachedAsset) -> Result<(), AssetError> {
        // Held across the writes so index updates never interleave.
        let mut index = self.index.write().await;
        let file = match index.entries.get(url) {
            Some(existing) => existing.file.clone(),
            None => {
                let id = index.next_id;
                index.next_id += 1;
                format!("{id}.bin")
            }
        };

        let path = self.entry_path(&file);
        let tmp = path.with_extension("bin.tmp");
        tokio::fs::write(&tmp, &asset.bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        index.entries.insert(
            url.clone(),
            IndexEntry {
                file,
                content_type: asset.content_type.clone(),
                len: asset.len() as u64,
                stored_at: Utc::now(),
            },
        );
        self.persist_index(&index).await
    }
}

/// In-process cache with the same contract, for tests and headless runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    inner: Arc<RwLock<HashMap<AssetUrl, CachedAsset>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, url: &AssetUrl) -> bool {
        self.inner.read().await.contains_key(url)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl AssetCache for MemoryCache {
    async fn lookup(&self, url: &AssetUrl) -> Result<Option<CachedAsset>, AssetError> {
        Ok(self.inner.read().await.get(url).cloned())
    }

    async fn store(&self, url: &AssetUrl, asset: &CachedAsset) -> Result<(), AssetError> {
        self.inner.write().await.insert(url.clone(), asset.clone());
        Ok(())
    }
}

/// Stand-in for a cache that failed to open: a permanent miss.
#[derive(Debug, Clone)]
pub struct UnavailableCache {
    reason: String,
}

impl UnavailableCache {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

#[async_trait]
impl AssetCache for UnavailableCache {
    async fn lookup(&self, _url: &AssetUrl) -> Result<Option<CachedAsset>, AssetError> {
        Ok(None)
    }

    async fn store(&self, url: &AssetUrl, _asset: &CachedAsset) -> Result<(), AssetError> {
        debug!(url = %url, reason = %self.reason, "cache unavailable; skipping store");
        Ok(())
    }
}
