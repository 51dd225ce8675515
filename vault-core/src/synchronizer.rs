use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{self, StreamExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::asset::{AssetUrl, CachedAsset, LocalReference, Resolved};
use crate::cache::AssetCache;
use crate::config::SyncConfig;
use crate::error::{AssetError, SyncError};
use crate::fetch::AssetFetcher;
use crate::state::StatePublisher;

const DEFAULT_NAMESPACE: &str = "lumine-vault";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub total: usize,
    pub local: usize,
    pub fallback: usize,
    pub duplicates: usize,
    pub elapsed: Duration,
}

/// Walks the known asset URLs once, resolving each to a local handle or
/// falling back to the remote URL, and publishes progress as it goes.
pub struct Synchronizer {
    cache: Arc<dyn AssetCache>,
    fetcher: Arc<dyn AssetFetcher>,
    publisher: StatePublisher,
    config: SyncConfig,
    namespace: String,
    handles: AtomicU64,
}

impl Synchronizer {
    pub fn new(
        cache: Arc<dyn AssetCache>,
        fetcher: Arc<dyn AssetFetcher>,
        publisher: StatePublisher,
        config: SyncConfig,
    ) -> Self {
        Self {
            cache,
            fetcher,
            publisher,
            config,
            namespace: DEFAULT_NAMESPACE.to_string(),
            handles: AtomicU64::new(0),
        }
    }

    /// Prefix of the `blob:` handles this synchronizer hands out.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn publisher(&self) -> &StatePublisher {
        &self.publisher
    }

    /// Resolves one URL: cache first, network on a miss.
    ///
    /// The per-asset deadline covers the lookup and the fetch. Storing the
    /// fetched bytes runs past it, since they are already in hand.
    pub async fn resolve_one(&self, url: &AssetUrl) -> Result<LocalReference, AssetError> {
        let deadline = self
            .config
            .asset_timeout()
            .map(|limit| (tokio::time::Instant::now() + limit, limit));

        let asset = match within(deadline, self.cache.lookup(url)).await {
            Ok(Some(asset)) => {
                debug!(url = %url, bytes = asset.len(), "cache hit");
                asset
            }
            Ok(None) => self.fetch_and_store(url, deadline).await?,
            Err(err @ AssetError::Timeout(_)) => return Err(err),
            Err(err) => {
                warn!(url = %url, error = %err, "cache lookup failed, treating as miss");
                self.fetch_and_store(url, deadline).await?
            }
        };
        Ok(self.local_reference(asset))
    }

    async fn fetch_and_store(
        &self,
        url: &AssetUrl,
        deadline: Option<(tokio::time::Instant, Duration)>,
    ) -> Result<CachedAsset, AssetError> {
        debug!(url = %url, "cache miss, fetching");
        let asset = within(deadline, self.fetcher.fetch(url)).await?;
        // A failed store only costs the durable copy for the next session.
        if let Err(err) = self.cache.store(url, &asset).await {
            warn!(url = %url, error = %err, "failed to store asset in cache");
        }
        Ok(asset)
    }

    fn local_reference(&self, asset: CachedAsset) -> LocalReference {
        let sequence = self.handles.fetch_add(1, Ordering::Relaxed);
        LocalReference::new(&self.namespace, sequence, asset)
    }

    /// Resolves every distinct URL, publishing after each one, then marks the
    /// state ready. Never fails: a broken asset degrades to its remote URL.
    ///
    /// Results are published in input order even when `concurrency > 1`.
    pub async fn synchronize<I>(&self, urls: I) -> SyncSummary
    where
        I: IntoIterator<Item = AssetUrl>,
    {
        let started = Instant::now();
        let mut seen = HashSet::new();
        let mut duplicates = 0;
        let unique: Vec<AssetUrl> = urls
            .into_iter()
            .filter(|url| {
                let fresh = seen.insert(url.clone());
                if !fresh {
                    duplicates += 1;
                }
                fresh
            })
            .collect();

        let total = unique.len();
        let concurrency = self.config.concurrency.max(1);
        info!(total, duplicates, concurrency, "starting asset sync");

        let results = stream::iter(unique)
            .map(|url| async move {
                let outcome = self.resolve_one(&url).await;
                (url, outcome)
            })
            .buffered(concurrency);
        futures_util::pin_mut!(results);

        let mut completed = 0;
        let mut local = 0;
        while let Some((url, outcome)) = results.next().await {
            completed += 1;
            let resolved = match outcome {
                Ok(reference) => {
                    local += 1;
                    Resolved::Local(reference)
                }
                Err(err) => {
                    warn!(url = %url, error = %err, "asset sync failed, using remote url");
                    Resolved::Remote(url.clone())
                }
            };
            self.publisher.record(url, resolved, completed, total);
        }

        self.publisher.mark_ready();

        let summary = SyncSummary {
            total,
            local,
            fallback: total - local,
            duplicates,
            elapsed: started.elapsed(),
        };
        info!(
            total = summary.total,
            local = summary.local,
            fallback = summary.fallback,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "asset sync complete"
        );
        summary
    }
}

async fn within<T, F>(
    deadline: Option<(tokio::time::Instant, Duration)>,
    work: F,
) -> Result<T, AssetError>
where
    F: Future<Output = Result<T, AssetError>>,
{
    match deadline {
        Some((at, limit)) => tokio::time::timeout_at(at, work)
            .await
            .map_err(|_| AssetError::Timeout(limit))?,
        None => work.await,
    }
}

pub struct SyncHandle {
    cancel_tx: broadcast::Sender<()>,
    join: JoinHandle<Option<SyncSummary>>,
}

impl SyncHandle {
    /// Waits for the sync to finish. `None` means it was stopped first.
    pub async fn wait(self) -> Result<Option<SyncSummary>, SyncError> {
        self.join.await.map_err(SyncError::from)
    }

    /// Cancels an unfinished sync; used at application teardown.
    pub async fn stop(self) -> Result<Option<SyncSummary>, SyncError> {
        let _ = self.cancel_tx.send(());
        self.join.await.map_err(SyncError::from)
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Runs [`Synchronizer::synchronize`] on the current Tokio runtime.
pub fn spawn_synchronizer(synchronizer: Synchronizer, urls: Vec<AssetUrl>) -> SyncHandle {
    let (cancel_tx, mut cancel_rx) = broadcast::channel(1);
    let join = tokio::spawn(async move {
        tokio::select! {
            Ok(()) = cancel_rx.recv() => {
                info!("asset sync stopped before completion");
                None
            }
            summary = synchronizer.synchronize(urls) => Some(summary),
        }
    });

    SyncHandle { cancel_tx, join }
}
