//! Services shared across the application.

use std::sync::Arc;

use bugdesk_core::PageParams;

use crate::api::ApiClient;
use crate::cache::{CacheKey, ResourceCache};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::guard::AccessGuard;
use crate::mutations::{MutationDispatcher, MutationSite};
use crate::previews::{BlobPreviews, ObjectUrlRegistry};
use crate::queries::Queries;
use crate::scope::ViewScope;
use crate::search::SearchDebouncer;
use crate::session::{FileStorage, SessionStorage, SessionStore};

/// The client's process-wide services, constructed once at startup.
///
/// This struct is cheaply cloneable via `Arc`; every clone shares the same
/// session, cache and HTTP connection pool.
#[derive(Clone)]
pub struct Bugdesk {
    inner: Arc<BugdeskInner>,
}

struct BugdeskInner {
    config: ClientConfig,
    api: ApiClient,
    session: SessionStore,
    cache: ResourceCache<CacheKey>,
    queries: Queries,
    mutations: MutationDispatcher,
    guard: AccessGuard,
    blobs: ObjectUrlRegistry,
}

impl Bugdesk {
    /// Create the services, persisting the session under the data directory.
    ///
    /// The session is not restored yet; call [`SessionStore::bootstrap`].
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let storage = Arc::new(FileStorage::new(config.session_file()));
        Self::with_storage(config, storage)
    }

    /// Create the services with a custom session store backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_storage(
        config: ClientConfig,
        storage: Arc<dyn SessionStorage>,
    ) -> Result<Self, ClientError> {
        let api = ApiClient::new(&config)?;
        let session = SessionStore::new(api.clone(), storage);
        let cache = ResourceCache::new(config.cache);
        // Cached reads belong to the account that made them.
        let previous_account = cache.clone();
        session.on_identity_change(move |_| previous_account.clear());
        let queries = Queries::new(api.clone(), cache.clone(), session.clone());
        let mutations = MutationDispatcher::new(api.clone(), cache.clone(), session.clone());

        Ok(Self {
            inner: Arc::new(BugdeskInner {
                config,
                api,
                session,
                cache,
                queries,
                mutations,
                guard: AccessGuard::default(),
                blobs: ObjectUrlRegistry::new(),
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    #[must_use]
    pub fn session(&self) -> &SessionStore {
        &self.inner.session
    }

    #[must_use]
    pub fn cache(&self) -> &ResourceCache<CacheKey> {
        &self.inner.cache
    }

    #[must_use]
    pub fn queries(&self) -> &Queries {
        &self.inner.queries
    }

    #[must_use]
    pub fn mutations(&self) -> &MutationDispatcher {
        &self.inner.mutations
    }

    #[must_use]
    pub fn guard(&self) -> &AccessGuard {
        &self.inner.guard
    }

    #[must_use]
    pub fn blob_registry(&self) -> &ObjectUrlRegistry {
        &self.inner.blobs
    }

    /// First page at the configured page size.
    #[must_use]
    pub fn first_page(&self) -> PageParams {
        PageParams::first(self.inner.config.page_size)
    }

    /// A mutation call site for a view.
    #[must_use]
    pub fn mutation_site(&self) -> MutationSite {
        self.inner.mutations.site()
    }

    /// A search box using the configured debounce window.
    #[must_use]
    pub fn search_box(&self) -> SearchDebouncer {
        SearchDebouncer::new(self.inner.config.search_debounce, self.inner.config.page_size)
    }

    /// A preview manager for one attachment list consumer.
    #[must_use]
    pub fn previews(&self) -> BlobPreviews {
        BlobPreviews::for_api(self.inner.blobs.clone(), self.inner.api.clone())
    }

    /// A scope for a view's resources.
    #[must_use]
    pub fn scope(&self, name: impl Into<String>) -> ViewScope {
        ViewScope::new(name)
    }

    /// Sign out. Cached reads of the account are dropped with the session.
    pub fn logout(&self) {
        self.inner.session.logout();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::session::MemoryStorage;
    use url::Url;

    #[test]
    fn test_services_share_configuration() {
        let config = ClientConfig::new(Url::parse("http://localhost:5000/api").unwrap());
        let app = Bugdesk::with_storage(config, Arc::new(MemoryStorage::new())).unwrap();

        assert_eq!(app.first_page(), PageParams::first(10));
        assert!(app.session().snapshot().is_loading);
        app.session().bootstrap();
        assert!(!app.session().is_authenticated());
    }

    #[tokio::test]
    async fn test_logout_clears_cache() {
        let config = ClientConfig::new(Url::parse("http://localhost:5000/api").unwrap());
        let app = Bugdesk::with_storage(config, Arc::new(MemoryStorage::new())).unwrap();
        let key = CacheKey::Developers;
        let _rx = app.cache().subscribe(&key).await;
        assert!(app.cache().get(&key).await.is_some());

        app.logout();
        app.cache().run_pending_tasks().await;
        assert!(app.cache().get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_expiry_clears_cache() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(crate::session::keys::TOKEN, "t1").unwrap();
        storage
            .set(
                crate::session::keys::USER,
                r#"{"id":"u1","email":"a@b.com","fullName":"Ada","role":"User"}"#,
            )
            .unwrap();
        let config = ClientConfig::new(Url::parse("http://localhost:5000/api").unwrap());
        let app = Bugdesk::with_storage(config, storage).unwrap();
        app.session().bootstrap();

        let key = CacheKey::Developers;
        let _rx = app.cache().subscribe(&key).await;
        app.session().expire();
        app.cache().run_pending_tasks().await;
        assert!(app.cache().get(&key).await.is_none());
    }
}
