//! Catalogue of cached remote reads.
//!
//! Each constructor pairs a [`CacheKey`] with the fetcher that loads it.
//! Fetch failures caused by a rejected token expire the session the request
//! was sent under, never a session installed after it.

use std::future::Future;

use tokio::sync::watch;

use bugdesk_core::{BugId, PageParams};

use crate::api::{ApiClient, BugSearch, UnassignedQuery};
use crate::cache::{CacheEntry, CacheKey, CacheValue, Fetcher, ResourceCache, fetcher};
use crate::error::ClientError;
use crate::session::SessionStore;

/// A read ready to be issued against the cache.
#[derive(Clone)]
pub struct Query {
    pub key: CacheKey,
    /// Disabled queries never fetch and stay `Idle`.
    pub enabled: bool,
    fetcher: Fetcher<CacheValue>,
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("key", &self.key)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Builds and issues the application's reads.
#[derive(Clone)]
pub struct Queries {
    api: ApiClient,
    cache: ResourceCache<CacheKey>,
    session: SessionStore,
}

impl Queries {
    #[must_use]
    pub const fn new(api: ApiClient, cache: ResourceCache<CacheKey>, session: SessionStore) -> Self {
        Self {
            api,
            cache,
            session,
        }
    }

    fn build<F, Fut>(&self, key: CacheKey, call: F) -> Query
    where
        F: Fn(ApiClient) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<CacheValue, ClientError>> + Send + 'static,
    {
        let api = self.api.clone();
        let session = self.session.clone();
        Query {
            key,
            enabled: true,
            fetcher: fetcher(move || {
                let sent_under = session.generation();
                let pending = call(api.clone());
                let session = session.clone();
                async move {
                    let result = pending.await;
                    if let Err(e) = &result {
                        session.observe_error(e, sent_under);
                    }
                    result
                }
            }),
        }
    }

    /// The signed-in account.
    #[must_use]
    pub fn current_user(&self) -> Query {
        self.build(CacheKey::CurrentUser, |api| async move {
            Ok(CacheValue::User(Box::new(api.current_user().await?)))
        })
    }

    /// One bug with its attachments. Disabled for id 0.
    #[must_use]
    pub fn bug_by_id(&self, id: BugId) -> Query {
        let mut query = self.build(CacheKey::BugById(id), move |api| async move {
            Ok(CacheValue::Bug(Box::new(api.get_bug(id).await?)))
        });
        query.enabled = id.as_i64() > 0;
        query
    }

    /// Bugs reported by the signed-in user.
    #[must_use]
    pub fn my_bugs(&self, page: PageParams) -> Query {
        self.build(CacheKey::MyBugs(page), move |api| async move {
            Ok(CacheValue::BugPage(api.my_bugs(page).await?))
        })
    }

    /// Bugs assigned to the signed-in developer.
    #[must_use]
    pub fn assigned_bugs(&self, page: PageParams) -> Query {
        self.build(CacheKey::AssignedBugs(page), move |api| async move {
            Ok(CacheValue::BugPage(api.assigned_bugs(page).await?))
        })
    }

    /// Unassigned bugs, optionally filtered by a search term.
    #[must_use]
    pub fn unassigned_bugs(&self, search: Option<String>, page: PageParams) -> Query {
        let filter = UnassignedQuery {
            search: search.filter(|s| !s.trim().is_empty()),
        };
        let key = CacheKey::UnassignedBugs {
            filter: filter.clone(),
            page,
        };
        self.build(key, move |api| {
            let filter = filter.clone();
            async move { Ok(CacheValue::BugPage(api.unassigned_bugs(&filter, page).await?)) }
        })
    }

    /// Search across all bugs.
    #[must_use]
    pub fn search_bugs(&self, search: BugSearch, page: PageParams) -> Query {
        let search = BugSearch {
            term: search.term.filter(|s| !s.trim().is_empty()),
            ..search
        };
        let key = CacheKey::SearchBugs {
            search: search.clone(),
            page,
        };
        self.build(key, move |api| {
            let search = search.clone();
            async move { Ok(CacheValue::BugPage(api.search_bugs(&search, page).await?)) }
        })
    }

    /// Developers available for assignment.
    #[must_use]
    pub fn developers(&self) -> Query {
        self.build(CacheKey::Developers, |api| async move {
            Ok(CacheValue::Developers(api.developers().await?))
        })
    }

    /// Issue a read; see [`ResourceCache::query`].
    pub async fn load(&self, query: Query) -> CacheEntry<CacheKey> {
        if !query.enabled {
            return CacheEntry::idle(query.key);
        }
        self.cache.query(query.key, query.fetcher).await
    }

    /// Issue a read and wait for it to settle.
    ///
    /// # Errors
    ///
    /// Returns the fetch error, or `ClientError::NotFound` for a disabled query.
    pub async fn fetch(&self, query: Query) -> Result<CacheValue, ClientError> {
        if !query.enabled {
            return Err(ClientError::NotFound(format!("{:?} is disabled", query.key)));
        }
        self.cache.fetch(query.key, query.fetcher).await
    }

    /// Re-issue a read regardless of freshness (user-initiated retry).
    pub async fn reload(&self, query: Query) -> CacheEntry<CacheKey> {
        if !query.enabled {
            return CacheEntry::idle(query.key);
        }
        self.cache.refetch(query.key, query.fetcher).await
    }

    /// Issue a read and watch its entry.
    pub async fn watch(&self, query: Query) -> watch::Receiver<CacheEntry<CacheKey>> {
        let rx = self.cache.subscribe(&query.key).await;
        self.load(query).await;
        rx
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cache::QueryStatus;
    use crate::config::{CacheConfig, ClientConfig};
    use crate::session::{MemoryStorage, SessionStorage};
    use serde_json::json;
    use std::sync::Arc;
    use url::Url;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn queries(base: &str) -> Queries {
        let api = ApiClient::new(&ClientConfig::new(Url::parse(base).unwrap())).unwrap();
        let session = SessionStore::new(api.clone(), Arc::new(MemoryStorage::new()));
        Queries::new(api, ResourceCache::new(CacheConfig::default()), session)
    }

    fn page_json(page: u32) -> serde_json::Value {
        json!({
            "items": [], "pageNumber": page, "pageSize": 10,
            "totalCount": 25, "totalPages": 3
        })
    }

    #[tokio::test]
    async fn test_zero_bug_id_is_disabled() {
        let server = MockServer::start().await;
        let queries = queries(&server.uri());

        let entry = queries.load(queries.bug_by_id(BugId::new(0))).await;
        assert_eq!(entry.status, QueryStatus::Idle);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listing_starts_with_empty_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bugs/my-bugs"))
            .and(query_param("pageNumber", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_json(2)))
            .expect(1)
            .mount(&server)
            .await;
        let queries = queries(&server.uri());
        let page = PageParams::first(10).with_page(2);

        let entry = queries.load(queries.my_bugs(page)).await;
        assert_eq!(entry.status, QueryStatus::Loading);
        assert_eq!(entry.data.as_ref().and_then(CacheValue::as_bug_page).unwrap().total_count, 0);

        let value = queries.fetch(queries.my_bugs(page)).await.unwrap();
        let page = value.as_bug_page().unwrap();
        assert_eq!(page.total_count, 25);
        assert!(page.has_previous_page && page.has_next_page);
    }

    #[tokio::test]
    async fn test_blank_search_term_shares_slot_with_no_term() {
        let server = MockServer::start().await;
        let queries = queries(&server.uri());
        let page = PageParams::first(10);

        let blank = queries.search_bugs(
            BugSearch {
                term: Some("  ".to_string()),
                ..BugSearch::default()
            },
            page,
        );
        let none = queries.search_bugs(BugSearch::default(), page);
        assert_eq!(blank.key, none.key);
    }

    #[tokio::test]
    async fn test_rejected_token_expires_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/developers"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let storage = Arc::new(MemoryStorage::new());
        storage
            .set(
                crate::session::keys::USER,
                &json!({ "id": "u1", "email": "a@b.com", "fullName": "A", "role": "User" }).to_string(),
            )
            .unwrap();
        storage.set(crate::session::keys::TOKEN, "t1").unwrap();

        let api = ApiClient::new(&ClientConfig::new(Url::parse(&server.uri()).unwrap())).unwrap();
        let session = SessionStore::new(api.clone(), storage);
        session.bootstrap();
        let queries = Queries::new(api, ResourceCache::new(CacheConfig::default()), session.clone());

        let err = queries.fetch(queries.developers()).await.unwrap_err();
        assert!(err.is_auth());
        assert!(!session.is_authenticated());
    }
}
