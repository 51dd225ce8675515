//! Shared sync state and the publisher every UI consumer reads it through.
//!
//! There is exactly one [`StatePublisher`] per session. The composition root
//! constructs it and hands clones to the synchronizer (the only writer) and to
//! the consumers (router, pages). Snapshots are served from a `watch` channel;
//! ordered change notifications go to per-subscriber channels that are pruned
//! as soon as the [`Subscription`] is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::asset::{AssetUrl, Resolved};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    pub ready: bool,
    pub progress: u8,
    pub mapping: HashMap<AssetUrl, Resolved>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Initial,
    Syncing,
    Ready,
}

impl SyncState {
    /// Image source to render for `url`; the url itself when nothing was recorded.
    pub fn resolve<'a>(&'a self, url: &'a str) -> &'a str {
        self.mapping.get(url).map(Resolved::src).unwrap_or(url)
    }

    pub fn phase(&self) -> SyncPhase {
        if self.ready {
            SyncPhase::Ready
        } else if self.mapping.is_empty() {
            SyncPhase::Initial
        } else {
            SyncPhase::Syncing
        }
    }

    pub fn local_count(&self) -> usize {
        self.mapping.values().filter(|r| r.is_local()).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Resolved {
        url: AssetUrl,
        local: bool,
        completed: usize,
        total: usize,
        progress: u8,
    },
    Ready {
        total: usize,
        local: usize,
        fallback: usize,
    },
}

/// `round(100 * completed / total)`, halves rounded up. An empty batch is complete.
pub fn progress_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let completed = completed.min(total) as u64;
    let total = total as u64;
    ((completed * 200 + total) / (total * 2)) as u8
}

#[derive(Debug, Clone)]
pub struct StatePublisher {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    state: watch::Sender<SyncState>,
    // Also serializes publishes so every subscriber sees the same order.
    subscribers: Mutex<Vec<mpsc::UnboundedSender<SyncEvent>>>,
}

impl Default for StatePublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl StatePublisher {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SyncState::default());
        Self {
            inner: Arc::new(Inner {
                state,
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn state(&self) -> SyncState {
        self.inner.state.borrow().clone()
    }

    /// Reads the current state without cloning the mapping.
    pub fn with_state<R>(&self, f: impl FnOnce(&SyncState) -> R) -> R {
        f(&self.inner.state.borrow())
    }

    pub fn is_ready(&self) -> bool {
        self.inner.state.borrow().ready
    }

    pub fn progress(&self) -> u8 {
        self.inner.state.borrow().progress
    }

    pub fn resolve(&self, url: &str) -> String {
        self.inner.state.borrow().resolve(url).to_owned()
    }

    /// Registers a consumer. The returned subscription carries the state at
    /// subscription time and then every later event, in publish order.
    pub fn subscribe(&self) -> Subscription {
        let mut subscribers = self.lock_subscribers();
        let (tx, rx) = mpsc::unbounded_channel();
        subscribers.push(tx);
        Subscription {
            snapshot: self.state(),
            rx,
        }
    }

    /// Resolves once the sync has marked the state ready.
    pub async fn wait_ready(&self) -> SyncState {
        let mut rx = self.inner.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|state| state.ready).await;
        self.state()
    }

    /// Records the outcome for `url`. Existing entries are never overwritten
    /// and nothing changes once the state is ready.
    pub(crate) fn record(
        &self,
        url: AssetUrl,
        resolved: Resolved,
        completed: usize,
        total: usize,
    ) -> bool {
        let mut subscribers = self.lock_subscribers();
        let local = resolved.is_local();
        let mut progress = 0;
        let accepted = self.inner.state.send_if_modified(|state| {
            if state.ready || state.mapping.contains_key(&url) {
                return false;
            }
            state.mapping.insert(url.clone(), resolved);
            state.progress = state.progress.max(progress_percent(completed, total));
            progress = state.progress;
            true
        });
        if !accepted {
            warn!(url = %url, "ignoring repeated sync result");
            return false;
        }

        publish(
            &mut subscribers,
            SyncEvent::Resolved {
                url,
                local,
                completed,
                total,
                progress,
            },
        );
        true
    }

    /// Terminal transition. Later calls are ignored.
    pub(crate) fn mark_ready(&self) -> bool {
        let mut subscribers = self.lock_subscribers();
        let mut counts = (0, 0);
        let changed = self.inner.state.send_if_modified(|state| {
            if state.ready {
                return false;
            }
            state.ready = true;
            state.progress = 100;
            let local = state.local_count();
            counts = (local, state.mapping.len() - local);
            true
        });
        if !changed {
            return false;
        }

        let (local, fallback) = counts;
        publish(
            &mut subscribers,
            SyncEvent::Ready {
                total: local + fallback,
                local,
                fallback,
            },
        );
        true
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<SyncEvent>>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn publish(subscribers: &mut Vec<mpsc::UnboundedSender<SyncEvent>>, event: SyncEvent) {
    let before = subscribers.len();
    subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    if subscribers.len() != before {
        debug!(dropped = before - subscribers.len(), "pruned closed subscriptions");
    }
}

/// Scoped subscription; dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    snapshot: SyncState,
    rx: mpsc::UnboundedReceiver<SyncEvent>,
}

impl Subscription {
    /// State at the moment of subscribing. If it is already ready, no further
    /// events will arrive.
    pub fn snapshot(&self) -> &SyncState {
        &self.snapshot
    }

    pub async fn next(&mut self) -> Option<SyncEvent> {
        self.rx.recv().await
    }

    pub fn try_next(&mut self) -> Option<SyncEvent> {
        self.rx.try_recv().ok()
    }
}
