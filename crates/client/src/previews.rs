//! Transient local handles for attachment previews.
//!
//! [`BlobPreviews`] follows one attachment list at a time. For every
//! previewable image it downloads the content once and registers it in an
//! [`ObjectUrlRegistry`], which hands out a local `blob:` URL. When the list
//! changes identity, or the consumer goes away, every URL it allocated is
//! released exactly once; reading a released URL yields nothing.
//!
//! Previews are best effort. A failed download marks the handle `Failed`,
//! is logged as a [`PreviewError`], and is never retried or surfaced.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use bugdesk_core::{Attachment, AttachmentId};

use crate::api::ApiClient;
use crate::error::{ClientError, PreviewError};

// =============================================================================
// ObjectUrlRegistry
// =============================================================================

/// Process-wide table of local URLs backed by in-memory content.
#[derive(Clone, Default)]
pub struct ObjectUrlRegistry {
    entries: Arc<Mutex<HashMap<String, Arc<[u8]>>>>,
}

impl std::fmt::Debug for ObjectUrlRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectUrlRegistry")
            .field("live", &self.live_count())
            .finish()
    }
}

impl ObjectUrlRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Arc<[u8]>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register content under a freshly allocated URL.
    #[must_use]
    pub fn create(&self, content: Vec<u8>) -> String {
        let url = format!("blob:bugdesk/{}", Uuid::new_v4());
        self.entries().insert(url.clone(), content.into());
        url
    }

    /// Content behind a live URL.
    #[must_use]
    pub fn read(&self, url: &str) -> Option<Arc<[u8]>> {
        self.entries().get(url).cloned()
    }

    /// Free a URL. Returns `false` if it was not live.
    pub fn release(&self, url: &str) -> bool {
        let released = self.entries().remove(url).is_some();
        if !released {
            warn!(url, "Released an object URL that was not live");
        }
        released
    }

    /// Number of URLs currently allocated.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.entries().len()
    }
}

// =============================================================================
// BlobPreviews
// =============================================================================

/// Fetch state of one preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobState {
    Loading,
    Ready,
    Failed,
}

/// Preview of one attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHandle {
    pub attachment_id: AttachmentId,
    /// Set once `state` is `Ready`.
    pub local_url: Option<String>,
    pub state: BlobState,
}

/// Downloads raw attachment content.
pub type Downloader =
    Arc<dyn Fn(AttachmentId) -> BoxFuture<'static, Result<Vec<u8>, ClientError>> + Send + Sync>;

/// Preview manager for one consumer (e.g. a bug detail view).
///
/// Dropping it releases every URL it holds; downloads that finish later
/// are discarded.
pub struct BlobPreviews {
    inner: Arc<PreviewsInner>,
}

struct PreviewsInner {
    registry: ObjectUrlRegistry,
    downloader: Downloader,
    tracking: Mutex<Tracking>,
    handles: watch::Sender<BTreeMap<AttachmentId, BlobHandle>>,
}

#[derive(Default)]
struct Tracking {
    list: Option<Arc<[Attachment]>>,
    /// Bumped whenever the list identity changes, to discard late downloads.
    generation: u64,
    in_flight: HashSet<AttachmentId>,
    closed: bool,
}

impl PreviewsInner {
    fn tracking(&self) -> MutexGuard<'_, Tracking> {
        self.tracking.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Release every allocated URL and forget all handles.
    fn release_all(&self) {
        let handles = self.handles.send_replace(BTreeMap::new());
        for url in handles.values().filter_map(|h| h.local_url.as_deref()) {
            self.registry.release(url);
        }
    }
}

impl BlobPreviews {
    #[must_use]
    pub fn new(registry: ObjectUrlRegistry, downloader: Downloader) -> Self {
        let (handles, _) = watch::channel(BTreeMap::new());
        Self {
            inner: Arc::new(PreviewsInner {
                registry,
                downloader,
                tracking: Mutex::new(Tracking::default()),
                handles,
            }),
        }
    }

    /// Previews downloaded through the API client.
    #[must_use]
    pub fn for_api(registry: ObjectUrlRegistry, api: ApiClient) -> Self {
        let downloader: Downloader = Arc::new(move |id| {
            let api = api.clone();
            async move { api.download_attachment(id).await }.boxed()
        });
        Self::new(registry, downloader)
    }

    /// Follow an attachment list.
    ///
    /// A list with a different identity (not the same allocation) replaces
    /// the previous one and releases all of its handles first. Previewable
    /// attachments without a handle are downloaded, in parallel.
    pub fn sync(&self, attachments: Arc<[Attachment]>) {
        let mut tracking = self.inner.tracking();
        if tracking.closed {
            return;
        }

        let same_list = tracking
            .list
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &attachments));
        if !same_list {
            self.inner.release_all();
            tracking.generation += 1;
            tracking.in_flight.clear();
            tracking.list = Some(Arc::clone(&attachments));
        }

        let known = self.inner.handles.borrow().keys().copied().collect::<HashSet<_>>();
        let wanted: Vec<AttachmentId> = attachments
            .iter()
            .filter(|a| a.is_previewable_image())
            .map(|a| a.id)
            .filter(|id| !known.contains(id) && !tracking.in_flight.contains(id))
            .collect();

        for id in wanted {
            tracking.in_flight.insert(id);
            self.inner.handles.send_modify(|handles| {
                handles.insert(
                    id,
                    BlobHandle {
                        attachment_id: id,
                        local_url: None,
                        state: BlobState::Loading,
                    },
                );
            });
            self.spawn_download(id, tracking.generation);
        }
    }

    fn spawn_download(&self, id: AttachmentId, generation: u64) {
        let download = (self.inner.downloader)(id);
        let weak: Weak<PreviewsInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let result = download.await;
            let Some(inner) = weak.upgrade() else {
                debug!(attachment_id = %id, "Preview consumer gone, discarding download");
                return;
            };
            let mut tracking = inner.tracking();
            if tracking.closed || tracking.generation != generation {
                debug!(attachment_id = %id, "Attachment list changed, discarding download");
                return;
            }
            tracking.in_flight.remove(&id);

            let handle = match result {
                Ok(content) => BlobHandle {
                    attachment_id: id,
                    local_url: Some(inner.registry.create(content)),
                    state: BlobState::Ready,
                },
                Err(source) => {
                    let error = PreviewError {
                        attachment_id: id,
                        source,
                    };
                    warn!(error = %error, "Attachment preview unavailable");
                    BlobHandle {
                        attachment_id: id,
                        local_url: None,
                        state: BlobState::Failed,
                    }
                }
            };
            inner.handles.send_modify(|handles| {
                handles.insert(id, handle);
            });
        });
    }

    /// Handle of an attachment, if it is previewable in the current list.
    #[must_use]
    pub fn handle(&self, id: AttachmentId) -> Option<BlobHandle> {
        self.inner.handles.borrow().get(&id).cloned()
    }

    /// All current handles, ordered by attachment id.
    #[must_use]
    pub fn handles(&self) -> Vec<BlobHandle> {
        self.inner.handles.borrow().values().cloned().collect()
    }

    /// Content of a ready preview.
    #[must_use]
    pub fn content(&self, id: AttachmentId) -> Option<Arc<[u8]>> {
        let url = self.handle(id)?.local_url?;
        self.inner.registry.read(&url)
    }

    /// Watch handle changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<BTreeMap<AttachmentId, BlobHandle>> {
        self.inner.handles.subscribe()
    }

    /// Release everything and stop following lists. Idempotent.
    pub fn close(&self) {
        let mut tracking = self.inner.tracking();
        if tracking.closed {
            return;
        }
        tracking.closed = true;
        tracking.list = None;
        tracking.in_flight.clear();
        self.inner.release_all();
    }
}

impl Drop for BlobPreviews {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn attachment(id: i64, name: &str) -> Attachment {
        Attachment {
            id: AttachmentId::new(id),
            file_name: name.to_string(),
            content_type: "application/octet-stream".to_string(),
            file_size: 3,
            uploaded_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    fn list(items: &[(i64, &str)]) -> Arc<[Attachment]> {
        items.iter().map(|(id, name)| attachment(*id, name)).collect()
    }

    /// Downloader that counts calls and fails for odd ids above 100.
    fn downloader(calls: &Arc<AtomicUsize>) -> Downloader {
        let calls = Arc::clone(calls);
        Arc::new(move |id: AttachmentId| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if id.as_i64() > 100 {
                    Err(ClientError::NotFound("gone".to_string()))
                } else {
                    Ok(vec![1, 2, 3])
                }
            }
            .boxed()
        })
    }

    async fn settled(previews: &BlobPreviews) {
        let mut rx = previews.subscribe();
        rx.wait_for(|handles| handles.values().all(|h| h.state != BlobState::Loading))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_only_images_are_fetched_once() {
        let registry = ObjectUrlRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let previews = BlobPreviews::new(registry.clone(), downloader(&calls));

        let attachments = list(&[(1, "shot.PNG"), (2, "log.txt"), (3, "photo.jpeg")]);
        previews.sync(Arc::clone(&attachments));
        previews.sync(Arc::clone(&attachments));
        settled(&previews).await;
        previews.sync(attachments);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(registry.live_count(), 2);
        assert_eq!(previews.handle(AttachmentId::new(2)), None);
        assert_eq!(
            previews.content(AttachmentId::new(1)).as_deref(),
            Some(&[1u8, 2, 3][..])
        );
    }

    #[tokio::test]
    async fn test_new_list_releases_previous_handles() {
        let registry = ObjectUrlRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let previews = BlobPreviews::new(registry.clone(), downloader(&calls));

        previews.sync(list(&[(1, "a.png"), (2, "b.gif")]));
        settled(&previews).await;
        let old_url = previews.handle(AttachmentId::new(1)).unwrap().local_url.unwrap();

        // Same content, new identity: everything is released and refetched.
        previews.sync(list(&[(1, "a.png")]));
        assert_eq!(registry.read(&old_url), None);
        settled(&previews).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(registry.live_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_silent_and_not_retried() {
        let registry = ObjectUrlRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let previews = BlobPreviews::new(registry.clone(), downloader(&calls));

        let attachments = list(&[(101, "missing.webp")]);
        previews.sync(Arc::clone(&attachments));
        settled(&previews).await;
        previews.sync(attachments);

        let handle = previews.handle(AttachmentId::new(101)).unwrap();
        assert_eq!(handle.state, BlobState::Failed);
        assert_eq!(handle.local_url, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.live_count(), 0);
    }

    #[tokio::test]
    async fn test_drop_releases_everything() {
        let registry = ObjectUrlRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let previews = BlobPreviews::new(registry.clone(), downloader(&calls));

        previews.sync(list(&[(1, "a.png"), (2, "b.jpg")]));
        settled(&previews).await;
        assert_eq!(registry.live_count(), 2);

        drop(previews);
        assert_eq!(registry.live_count(), 0);
    }

    #[tokio::test]
    async fn test_late_download_for_replaced_list_is_discarded() {
        let registry = ObjectUrlRegistry::new();
        let gate = Arc::new(Notify::new());
        let slow_gate = Arc::clone(&gate);
        let slow: Downloader = Arc::new(move |id: AttachmentId| {
            let gate = Arc::clone(&slow_gate);
            async move {
                if id.as_i64() == 1 {
                    gate.notified().await;
                }
                Ok(vec![0])
            }
            .boxed()
        });
        let previews = BlobPreviews::new(registry.clone(), slow);

        previews.sync(list(&[(1, "slow.png")]));
        previews.sync(list(&[(2, "fast.png")]));
        settled(&previews).await;

        gate.notify_one();
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(registry.live_count(), 1);
        assert_eq!(previews.handle(AttachmentId::new(1)), None);
        assert_eq!(
            previews.handle(AttachmentId::new(2)).unwrap().state,
            BlobState::Ready
        );
    }

    #[test]
    fn test_double_release_is_reported() {
        let registry = ObjectUrlRegistry::new();
        let url = registry.create(vec![1]);
        assert!(registry.release(&url));
        assert!(!registry.release(&url));
        assert_eq!(registry.read(&url), None);
    }
}
