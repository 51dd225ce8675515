use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use proptest::prelude::*;
use vault_core::{
    progress_percent, spawn_synchronizer, AssetCache, AssetError, AssetFetcher, AssetUrl,
    CachedAsset, MemoryCache, StatePublisher, Subscription, SyncConfig, SyncEvent, SyncPhase,
    Synchronizer,
};

#[derive(Clone)]
enum Reply {
    Body(&'static [u8]),
    Status(u16),
    Fail,
    Hang,
    Delayed(u64, &'static [u8]),
}

#[derive(Default)]
struct FakeFetcher {
    replies: HashMap<String, Reply>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakeFetcher {
    fn with(replies: &[(&str, Reply)]) -> Self {
        Self {
            replies: replies
                .iter()
                .map(|(url, reply)| (url.to_string(), reply.clone()))
                .collect(),
            calls: Mutex::new(HashMap::new()),
        }
    }

    fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl AssetFetcher for FakeFetcher {
    async fn fetch(&self, url: &AssetUrl) -> Result<CachedAsset, AssetError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default() += 1;
        match self.replies.get(url.as_str()).cloned().unwrap_or(Reply::Fail) {
            Reply::Body(bytes) => Ok(CachedAsset::new(bytes, Some("image/png".into()))),
            Reply::Status(code) => Err(AssetError::Status(code)),
            Reply::Fail => Err(AssetError::Conversion("connection reset".into())),
            Reply::Hang => std::future::pending().await,
            Reply::Delayed(ms, bytes) => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(CachedAsset::new(bytes, None))
            }
        }
    }
}

/// Cache whose every operation fails, as a broken storage backend would.
struct BrokenCache;

#[async_trait]
impl AssetCache for BrokenCache {
    async fn lookup(&self, _url: &AssetUrl) -> Result<Option<CachedAsset>, AssetError> {
        Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into())
    }

    async fn store(&self, _url: &AssetUrl, _asset: &CachedAsset) -> Result<(), AssetError> {
        Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into())
    }
}

/// Cache that always misses and takes its time writing.
struct SlowStoreCache {
    delay: Duration,
}

#[async_trait]
impl AssetCache for SlowStoreCache {
    async fn lookup(&self, _url: &AssetUrl) -> Result<Option<CachedAsset>, AssetError> {
        Ok(None)
    }

    async fn store(&self, _url: &AssetUrl, _asset: &CachedAsset) -> Result<(), AssetError> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

fn sequential() -> SyncConfig {
    SyncConfig {
        asset_timeout_seconds: None,
        concurrency: 1,
    }
}

fn urls(list: &[&str]) -> Vec<AssetUrl> {
    list.iter().map(|u| AssetUrl::from(*u)).collect()
}

/// Progress values carried by `Resolved` events, in order, and whether
/// `Ready` arrived last.
fn drain(sub: &mut Subscription) -> (Vec<u8>, bool) {
    let mut progress = Vec::new();
    let mut ready_last = false;
    while let Some(event) = sub.try_next() {
        match event {
            SyncEvent::Resolved { progress: p, .. } => {
                ready_last = false;
                progress.push(p);
            }
            SyncEvent::Ready { .. } => ready_last = true,
        }
    }
    (progress, ready_last)
}

#[tokio::test]
async fn failed_fetch_falls_back_without_blocking_ready() {
    let fetcher = Arc::new(FakeFetcher::with(&[
        ("https://x/img1.png", Reply::Body(b"B")),
        ("https://x/img2.png", Reply::Fail),
    ]));
    let cache = MemoryCache::new();
    let publisher = StatePublisher::new();
    let mut sub = publisher.subscribe();
    let sync = Synchronizer::new(
        Arc::new(cache.clone()),
        fetcher.clone(),
        publisher.clone(),
        sequential(),
    );

    let summary = sync
        .synchronize(urls(&["https://x/img1.png", "https://x/img2.png"]))
        .await;

    let state = publisher.state();
    assert!(state.ready);
    assert_eq!(state.progress, 100);
    assert_eq!(state.mapping.len(), 2);

    let first = &state.mapping[&AssetUrl::from("https://x/img1.png")];
    assert!(first.is_local());
    assert_eq!(first.local().unwrap().bytes().as_ref(), b"B");
    assert_ne!(first.src(), "https://x/img1.png");
    assert_eq!(state.resolve("https://x/img2.png"), "https://x/img2.png");
    assert!(!state.mapping[&AssetUrl::from("https://x/img2.png")].is_local());

    assert!(cache.contains(&AssetUrl::from("https://x/img1.png")).await);
    assert!(!cache.contains(&AssetUrl::from("https://x/img2.png")).await);

    assert_eq!(drain(&mut sub), (vec![50, 100], true));
    assert_eq!((summary.total, summary.local, summary.fallback), (2, 1, 1));
}

#[tokio::test]
async fn non_ok_status_falls_back_to_remote_url() {
    let fetcher = Arc::new(FakeFetcher::with(&[("https://x/gone.png", Reply::Status(404))]));
    let cache = MemoryCache::new();
    let publisher = StatePublisher::new();
    let sync = Synchronizer::new(Arc::new(cache.clone()), fetcher, publisher.clone(), sequential());

    sync.synchronize(urls(&["https://x/gone.png"])).await;

    let state = publisher.state();
    assert_eq!(state.phase(), SyncPhase::Ready);
    assert_eq!(state.resolve("https://x/gone.png"), "https://x/gone.png");
    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn empty_input_is_ready_immediately() {
    let publisher = StatePublisher::new();
    let mut sub = publisher.subscribe();
    let sync = Synchronizer::new(
        Arc::new(MemoryCache::new()),
        Arc::new(FakeFetcher::default()),
        publisher.clone(),
        sequential(),
    );

    let summary = sync.synchronize(Vec::new()).await;

    let state = publisher.state();
    assert!(state.ready);
    assert_eq!(state.progress, 100);
    assert!(state.mapping.is_empty());
    assert_eq!(summary.total, 0);
    assert_eq!(
        sub.try_next(),
        Some(SyncEvent::Ready {
            total: 0,
            local: 0,
            fallback: 0
        })
    );
    assert_eq!(sub.try_next(), None);
}

#[tokio::test]
async fn cache_hit_issues_no_fetch() {
    let cached = AssetUrl::from("https://x/cached.png");
    let cache = MemoryCache::new();
    cache
        .store(&cached, &CachedAsset::new(&b"cached-bytes"[..], None))
        .await
        .unwrap();
    let fetcher = Arc::new(FakeFetcher::with(&[("https://x/fresh.png", Reply::Body(b"fresh"))]));
    let publisher = StatePublisher::new();
    let sync = Synchronizer::new(Arc::new(cache), fetcher.clone(), publisher.clone(), sequential());

    sync.synchronize(urls(&["https://x/cached.png", "https://x/fresh.png"]))
        .await;

    assert_eq!(fetcher.calls("https://x/cached.png"), 0);
    assert_eq!(fetcher.calls("https://x/fresh.png"), 1);
    let state = publisher.state();
    let local = state.mapping[&cached].local().unwrap();
    assert_eq!(local.bytes().as_ref(), b"cached-bytes");
}

#[tokio::test]
async fn duplicates_resolve_once_and_progress_stops_at_100() {
    let fetcher = Arc::new(FakeFetcher::with(&[
        ("https://x/a.png", Reply::Body(b"a")),
        ("https://x/b.png", Reply::Body(b"b")),
    ]));
    let publisher = StatePublisher::new();
    let mut sub = publisher.subscribe();
    let sync = Synchronizer::new(
        Arc::new(MemoryCache::new()),
        fetcher.clone(),
        publisher.clone(),
        sequential(),
    );

    let summary = sync
        .synchronize(urls(&["https://x/a.png", "https://x/b.png", "https://x/a.png"]))
        .await;

    assert_eq!(fetcher.calls("https://x/a.png"), 1);
    assert_eq!(publisher.state().mapping.len(), 2);
    assert_eq!(summary.duplicates, 1);
    assert_eq!(summary.total, 2);
    assert_eq!(drain(&mut sub), (vec![50, 100], true));
}

#[tokio::test]
async fn slow_asset_times_out_to_fallback() {
    let fetcher = Arc::new(FakeFetcher::with(&[
        ("https://x/stuck.png", Reply::Hang),
        ("https://x/ok.png", Reply::Body(b"ok")),
    ]));
    let publisher = StatePublisher::new();
    let sync = Synchronizer::new(
        Arc::new(MemoryCache::new()),
        fetcher,
        publisher.clone(),
        SyncConfig {
            asset_timeout_seconds: Some(1),
            concurrency: 1,
        },
    );

    let summary = tokio::time::timeout(
        Duration::from_secs(10),
        sync.synchronize(urls(&["https://x/stuck.png", "https://x/ok.png"])),
    )
    .await
    .expect("sync stalled on a hanging asset");

    let state = publisher.state();
    assert!(state.ready);
    assert_eq!(state.resolve("https://x/stuck.png"), "https://x/stuck.png");
    assert!(state.mapping[&AssetUrl::from("https://x/ok.png")].is_local());
    assert_eq!(summary.fallback, 1);
}

#[tokio::test]
async fn broken_cache_is_treated_as_a_miss() {
    let fetcher = Arc::new(FakeFetcher::with(&[("https://x/a.png", Reply::Body(b"a"))]));
    let publisher = StatePublisher::new();
    let sync = Synchronizer::new(Arc::new(BrokenCache), fetcher.clone(), publisher.clone(), sequential());

    sync.synchronize(urls(&["https://x/a.png"])).await;

    assert_eq!(fetcher.calls("https://x/a.png"), 1);
    assert!(publisher.state().mapping[&AssetUrl::from("https://x/a.png")].is_local());
}

#[tokio::test]
async fn slow_store_past_the_deadline_keeps_the_fetched_bytes() {
    let fetcher = Arc::new(FakeFetcher::with(&[("https://x/big.png", Reply::Body(b"big"))]));
    let publisher = StatePublisher::new();
    let sync = Synchronizer::new(
        Arc::new(SlowStoreCache {
            delay: Duration::from_millis(1500),
        }),
        fetcher,
        publisher.clone(),
        SyncConfig {
            asset_timeout_seconds: Some(1),
            concurrency: 1,
        },
    );

    let summary = sync.synchronize(urls(&["https://x/big.png"])).await;

    let state = publisher.state();
    assert!(state.ready);
    let local = state.mapping[&AssetUrl::from("https://x/big.png")]
        .local()
        .expect("fetched bytes should stay local");
    assert_eq!(local.bytes().as_ref(), b"big");
    assert_eq!(summary.fallback, 0);
}

#[tokio::test]
async fn concurrent_sync_publishes_in_input_order() {
    // Later assets finish first; results must still be published in order.
    let list = [
        ("https://x/0.png", Reply::Delayed(80, b"0")),
        ("https://x/1.png", Reply::Delayed(60, b"1")),
        ("https://x/2.png", Reply::Fail),
        ("https://x/3.png", Reply::Delayed(20, b"3")),
        ("https://x/4.png", Reply::Delayed(0, b"4")),
    ];
    let fetcher = Arc::new(FakeFetcher::with(&list));
    let publisher = StatePublisher::new();
    let mut sub = publisher.subscribe();
    let sync = Synchronizer::new(
        Arc::new(MemoryCache::new()),
        fetcher,
        publisher.clone(),
        SyncConfig {
            asset_timeout_seconds: Some(5),
            concurrency: 4,
        },
    );

    let input: Vec<AssetUrl> = list.iter().map(|(u, _)| AssetUrl::from(*u)).collect();
    sync.synchronize(input.clone()).await;

    let mut order = Vec::new();
    let mut progress = Vec::new();
    while let Some(event) = sub.try_next() {
        if let SyncEvent::Resolved { url, progress: p, .. } = event {
            order.push(url);
            progress.push(p);
        }
    }
    assert_eq!(order, input);
    let expected: Vec<u8> = (1..=5).map(|done| progress_percent(done, 5)).collect();
    assert_eq!(progress, expected);
    assert_eq!(publisher.state().local_count(), 4);
}

#[tokio::test]
async fn spawned_sync_signals_readiness_to_waiters() {
    let fetcher = Arc::new(FakeFetcher::with(&[("https://x/a.png", Reply::Body(b"a"))]));
    let publisher = StatePublisher::new();
    let sync = Synchronizer::new(
        Arc::new(MemoryCache::new()),
        fetcher,
        publisher.clone(),
        sequential(),
    )
    .with_namespace("vr-global");

    let handle = spawn_synchronizer(sync, urls(&["https://x/a.png"]));
    let state = tokio::time::timeout(Duration::from_secs(5), publisher.wait_ready())
        .await
        .expect("never became ready");

    assert_eq!(state.resolve("https://x/a.png"), "blob:vr-global/0");
    let summary = handle.wait().await.unwrap().expect("sync was not stopped");
    assert_eq!(summary.local, 1);
}

#[tokio::test]
async fn stopping_a_sync_leaves_state_not_ready() {
    let fetcher = Arc::new(FakeFetcher::with(&[("https://x/stuck.png", Reply::Hang)]));
    let publisher = StatePublisher::new();
    let sync = Synchronizer::new(Arc::new(MemoryCache::new()), fetcher, publisher.clone(), sequential());

    let handle = spawn_synchronizer(sync, urls(&["https://x/stuck.png"]));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!handle.is_finished());

    assert_eq!(handle.stop().await.unwrap(), None);
    assert!(!publisher.is_ready());
}

proptest! {
    #[test]
    fn every_distinct_url_is_mapped_and_progress_is_monotonic(
        picks in proptest::collection::vec(0usize..8, 0..16)
    ) {
        let replies: Vec<(String, Reply)> = (0..8)
            .map(|i| {
                let reply = if i % 3 == 0 { Reply::Fail } else { Reply::Body(b"img") };
                (format!("https://x/img{i}.png"), reply)
            })
            .collect();
        let fetcher = FakeFetcher {
            replies: replies.into_iter().collect(),
            calls: Mutex::new(HashMap::new()),
        };
        let input: Vec<AssetUrl> = picks
            .iter()
            .map(|i| AssetUrl::new(format!("https://x/img{i}.png")))
            .collect();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let publisher = StatePublisher::new();
        let mut sub = publisher.subscribe();
        let sync = Synchronizer::new(
            Arc::new(MemoryCache::new()),
            Arc::new(fetcher),
            publisher.clone(),
            sequential(),
        );
        runtime.block_on(sync.synchronize(input.clone()));

        let state = publisher.state();
        prop_assert!(state.ready);
        prop_assert_eq!(state.progress, 100);
        let distinct: HashSet<AssetUrl> = input.into_iter().collect();
        let mapped: HashSet<AssetUrl> = state.mapping.keys().cloned().collect();
        prop_assert_eq!(&mapped, &distinct);

        let (progress, ready_last) = drain(&mut sub);
        prop_assert!(ready_last);
        prop_assert_eq!(progress.len(), distinct.len());
        prop_assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        if let Some(last) = progress.last() {
            prop_assert_eq!(*last, 100);
        }
    }
}
