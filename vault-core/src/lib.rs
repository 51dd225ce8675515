pub mod asset;
pub mod cache;
pub mod config;
pub mod content;
pub mod error;
pub mod fetch;
pub mod state;
pub mod synchronizer;

pub use asset::{AssetUrl, CachedAsset, LocalReference, Resolved};
pub use cache::{open_cache, AssetCache, DiskCache, MemoryCache, UnavailableCache};
pub use config::{CacheConfig, FetchConfig, SyncConfig, VaultConfig};
pub use content::ContentStore;
pub use error::{AssetError, ConfigError, SyncError};
pub use fetch::{build_client, AssetFetcher, HttpFetcher};
pub use state::{progress_percent, StatePublisher, Subscription, SyncEvent, SyncPhase, SyncState};
pub use synchronizer::{spawn_synchronizer, SyncHandle, SyncSummary, Synchronizer};
