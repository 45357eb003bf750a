//! Keyed cache of server-state reads.
//!
//! Every remote read goes through [`ResourceCache::query`] with a key and a
//! fetcher. The cache guarantees:
//!
//! - **De-duplication**: while a fetch for a key is in flight, further queries
//!   for the same key join it instead of starting another one.
//! - **Key sensitivity**: structurally different keys never share a slot.
//! - **Placeholders**: a slot that has never loaded exposes the key's empty
//!   shape (e.g. an empty page) so consumers can render immediately.
//! - **One freshness policy**: a successful entry is fresh for
//!   `stale_after`; an invalidated or expired entry is served with its old
//!   data marked stale while a refetch runs. Failed entries are kept until
//!   invalidated; nothing is retried automatically.
//!
//! Slots live in a `moka` cache bounded by capacity and idle time. Each slot
//! publishes its entry through a `tokio::sync::watch` channel, so views can
//! [`subscribe`](ResourceCache::subscribe) and observe every superseding
//! snapshot. Invalidating a key that has live subscribers refetches it
//! immediately; otherwise the refetch waits for the next query.

mod entry;
mod key;

pub use entry::{CacheEntry, QueryStatus};
pub use key::{CacheKey, CacheValue, ResourceType};

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use moka::future::Cache;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::ClientError;

/// A cache key: hashable parameters plus the resource type they belong to.
pub trait Keyed: Clone + Eq + Hash + Debug + Send + Sync + 'static {
    /// Data stored under the key.
    type Value: Clone + Debug + Send + Sync + 'static;
    /// Resource-type tag used to scope invalidation.
    type Tag: Copy + Eq + Debug + Send + Sync + 'static;

    /// Resource type of this key.
    fn tag(&self) -> Self::Tag;

    /// Empty shape shown before the first successful fetch.
    fn placeholder(&self) -> Option<Self::Value> {
        None
    }
}

/// Shared, re-invocable fetch function for one key.
pub type Fetcher<V> = Arc<dyn Fn() -> BoxFuture<'static, Result<V, ClientError>> + Send + Sync>;

/// Wrap an async closure as a [`Fetcher`].
pub fn fetcher<V, F, Fut>(f: F) -> Fetcher<V>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, ClientError>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

// =============================================================================
// Slot
// =============================================================================

struct Slot<K: Keyed> {
    state: watch::Sender<CacheEntry<K>>,
    control: Mutex<Control<K::Value>>,
}

struct Control<V> {
    in_flight: bool,
    invalidated: bool,
    fetched_at: Option<Instant>,
    /// Most recent fetcher, reused for invalidation refetches.
    fetcher: Option<Fetcher<V>>,
}

impl<K: Keyed> Slot<K> {
    fn new(key: K) -> Self {
        let (state, _) = watch::channel(CacheEntry::idle(key));
        Self {
            state,
            control: Mutex::new(Control {
                in_flight: false,
                invalidated: false,
                fetched_at: None,
                fetcher: None,
            }),
        }
    }

    fn control(&self) -> MutexGuard<'_, Control<K::Value>> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> CacheEntry<K> {
        self.state.borrow().clone()
    }

    /// Record a finished fetch. Returns the fetcher to run again when the
    /// slot was invalidated mid-flight and someone is watching it.
    fn complete(&self, result: Result<K::Value, ClientError>) -> Option<Fetcher<K::Value>> {
        let mut control = self.control();
        let invalidated = control.invalidated;
        match result {
            Ok(value) => {
                control.fetched_at = Some(Instant::now());
                self.state.send_modify(|entry| entry.succeed(value, invalidated));
            }
            Err(error) => {
                warn!(key = ?self.state.borrow().key, error = %error, "Query failed");
                self.state.send_modify(|entry| entry.fail(error));
            }
        }

        if invalidated
            && self.state.receiver_count() > 0
            && let Some(fetcher) = control.fetcher.clone()
        {
            control.invalidated = false;
            self.state.send_modify(CacheEntry::begin_loading);
            return Some(fetcher);
        }
        control.in_flight = false;
        None
    }
}

// =============================================================================
// ResourceCache
// =============================================================================

/// Process-wide cache of remote reads.
///
/// Cheaply cloneable; clones share all slots.
pub struct ResourceCache<K: Keyed> {
    inner: Arc<ResourceCacheInner<K>>,
}

struct ResourceCacheInner<K: Keyed> {
    slots: Cache<K, Arc<Slot<K>>>,
    stale_after: Duration,
}

impl<K: Keyed> Clone for ResourceCache<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: Keyed> ResourceCache<K> {
    /// Create an empty cache.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let slots = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_idle(config.retention)
            .build();

        Self {
            inner: Arc::new(ResourceCacheInner {
                slots,
                stale_after: config.stale_after,
            }),
        }
    }

    async fn slot(&self, key: &K) -> Arc<Slot<K>> {
        let init_key = key.clone();
        self.inner
            .slots
            .get_with(key.clone(), async move { Arc::new(Slot::new(init_key)) })
            .await
    }

    /// Read a key, fetching it if it is missing or stale.
    ///
    /// Returns immediately: on a fresh hit the stored entry, otherwise a
    /// `Loading` entry carrying the previous data (marked stale) or the
    /// key's placeholder. Completion is observable through
    /// [`subscribe`](Self::subscribe) or awaited with [`fetch`](Self::fetch).
    pub async fn query(&self, key: K, fetcher: Fetcher<K::Value>) -> CacheEntry<K> {
        let slot = self.slot(&key).await;

        let start = {
            let mut control = slot.control();
            control.fetcher = Some(Arc::clone(&fetcher));
            let expired = control
                .fetched_at
                .is_none_or(|at| at.elapsed() >= self.inner.stale_after);
            let needs_fetch = match slot.state.borrow().status {
                QueryStatus::Idle => true,
                QueryStatus::Loading => false,
                QueryStatus::Success => control.invalidated || expired,
                QueryStatus::Error => control.invalidated,
            };
            if needs_fetch && !control.in_flight {
                control.in_flight = true;
                control.invalidated = false;
                true
            } else {
                false
            }
        };

        if start {
            debug!(key = ?key, "Cache miss, fetching");
            slot.state.send_modify(CacheEntry::begin_loading);
            Self::spawn_fetch(Arc::clone(&slot), fetcher);
        } else {
            debug!(key = ?key, "Cache hit");
        }

        slot.snapshot()
    }

    /// Read a key and wait until the entry settles.
    ///
    /// # Errors
    ///
    /// Returns the error of the settled entry if the fetch failed.
    pub async fn fetch(
        &self,
        key: K,
        fetcher: Fetcher<K::Value>,
    ) -> Result<K::Value, ClientError> {
        let mut rx = self.subscribe(&key).await;
        self.query(key, fetcher).await;

        let entry = rx
            .wait_for(|entry| entry.status != QueryStatus::Loading)
            .await
            .map_err(|_| ClientError::Network("cache slot closed".to_string()))?
            .clone();

        match (entry.status, entry.error, entry.data) {
            (QueryStatus::Error, Some(error), _) => Err(error),
            (QueryStatus::Success, _, Some(data)) => Ok(data),
            (status, _, _) => Err(ClientError::Decode(format!(
                "cache entry settled without data ({status:?})"
            ))),
        }
    }

    /// Force a refetch of a key regardless of freshness.
    pub async fn refetch(&self, key: K, fetcher: Fetcher<K::Value>) -> CacheEntry<K> {
        self.slot(&key).await.control().invalidated = true;
        self.query(key, fetcher).await
    }

    /// Watch every snapshot of a key.
    ///
    /// A live receiver marks the key as in use: invalidating it triggers an
    /// immediate refetch.
    pub async fn subscribe(&self, key: &K) -> watch::Receiver<CacheEntry<K>> {
        self.slot(key).await.state.subscribe()
    }

    /// Current snapshot of a key, without fetching.
    pub async fn get(&self, key: &K) -> Option<CacheEntry<K>> {
        self.inner.slots.get(key).await.map(|slot| slot.snapshot())
    }

    /// Drop a key from the cache.
    pub async fn evict(&self, key: &K) {
        self.inner.slots.invalidate(key).await;
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.inner.slots.invalidate_all();
        debug!("Cleared resource cache");
    }

    /// Apply pending evictions.
    pub(crate) async fn run_pending_tasks(&self) {
        self.inner.slots.run_pending_tasks().await;
    }

    /// Mark every entry of a resource type (optionally narrowed by a
    /// predicate on the key) as stale. Returns the number of entries marked.
    pub fn invalidate(&self, tag: K::Tag, predicate: Option<&dyn Fn(&K) -> bool>) -> usize {
        let mut marked = 0;
        for (key, slot) in self.inner.slots.iter() {
            if key.tag() != tag || !predicate.is_none_or(|matches| matches(key.as_ref())) {
                continue;
            }
            marked += 1;

            let refetch = {
                let mut control = slot.control();
                control.invalidated = true;
                if !control.in_flight
                    && slot.state.receiver_count() > 0
                    && let Some(fetcher) = control.fetcher.clone()
                {
                    control.in_flight = true;
                    control.invalidated = false;
                    Some(fetcher)
                } else {
                    None
                }
            };

            slot.state.send_modify(|entry| {
                entry.is_stale = entry.server_data().is_some();
            });

            if let Some(fetcher) = refetch {
                debug!(key = ?key, "Refetching invalidated entry with live subscribers");
                slot.state.send_modify(CacheEntry::begin_loading);
                Self::spawn_fetch(slot, fetcher);
            }
        }
        debug!(tag = ?tag, marked, "Invalidated cache entries");
        marked
    }

    fn spawn_fetch(slot: Arc<Slot<K>>, fetcher: Fetcher<K::Value>) {
        tokio::spawn(async move {
            let mut fetcher = fetcher;
            loop {
                let result = fetcher().await;
                match slot.complete(result) {
                    Some(next) => fetcher = next,
                    None => break,
                }
            }
        });
    }
}
