//! Cache entry snapshots handed to consumers.

use chrono::{DateTime, Utc};

use super::Keyed;
use crate::error::ClientError;

/// Fetch state of a cache slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Never requested, or the query is disabled.
    Idle,
    /// A fetch is running.
    Loading,
    /// The last fetch succeeded.
    Success,
    /// The last fetch failed.
    Error,
}

/// Snapshot of one cache slot.
///
/// Each completed fetch produces a new snapshot that supersedes the old one;
/// snapshots are never merged.
#[derive(Debug, Clone)]
pub struct CacheEntry<K: Keyed> {
    pub key: K,
    pub status: QueryStatus,
    /// Last good data, or placeholder data when `placeholder` is set.
    pub data: Option<K::Value>,
    /// `data` is the resource's empty shape, not a server response.
    pub placeholder: bool,
    /// When the data was last replaced by a successful fetch.
    pub last_updated: Option<DateTime<Utc>>,
    /// Failure of the most recent fetch, if it failed.
    pub error: Option<ClientError>,
    /// The data is known to be outdated (invalidated or past its freshness window).
    pub is_stale: bool,
}

impl<K: Keyed> CacheEntry<K> {
    /// Entry for a slot that has not been fetched.
    #[must_use]
    pub fn idle(key: K) -> Self {
        let data = key.placeholder();
        Self {
            placeholder: data.is_some(),
            key,
            status: QueryStatus::Idle,
            data,
            last_updated: None,
            error: None,
            is_stale: false,
        }
    }

    /// Whether a fetch is running for this slot.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    /// Data from an actual server response, ignoring placeholders.
    #[must_use]
    pub fn server_data(&self) -> Option<&K::Value> {
        if self.placeholder {
            None
        } else {
            self.data.as_ref()
        }
    }

    pub(crate) fn begin_loading(&mut self) {
        self.status = QueryStatus::Loading;
        self.is_stale = !self.placeholder && self.data.is_some();
    }

    pub(crate) fn succeed(&mut self, value: K::Value, stale: bool) {
        self.status = QueryStatus::Success;
        self.data = Some(value);
        self.placeholder = false;
        self.last_updated = Some(Utc::now());
        self.error = None;
        self.is_stale = stale;
    }

    pub(crate) fn fail(&mut self, error: ClientError) {
        // Last successful data (or the placeholder) stays for display.
        self.status = QueryStatus::Error;
        self.error = Some(error);
        self.is_stale = !self.placeholder && self.data.is_some();
    }
}
