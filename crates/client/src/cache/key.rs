//! Cache keys and values for Bugdesk remote resources.

use bugdesk_core::{Bug, BugId, BugListItem, Developer, PageParams, PaginatedResult, User};

use super::Keyed;
use crate::api::{BugSearch, UnassignedQuery};

/// Resource-type tag of a cache key, used to scope invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    CurrentUser,
    BugById,
    MyBugs,
    AssignedBugs,
    UnassignedBugs,
    SearchBugs,
    Developers,
}

impl ResourceType {
    /// Every listing of bugs (as opposed to a single bug).
    pub const BUG_LISTS: [Self; 4] = [
        Self::MyBugs,
        Self::AssignedBugs,
        Self::UnassignedBugs,
        Self::SearchBugs,
    ];
}

/// Cache key for every remote read.
///
/// Structurally equal keys address the same slot; any parameter difference
/// (page, size, search term, filter) is a different slot.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    CurrentUser,
    BugById(BugId),
    MyBugs(PageParams),
    AssignedBugs(PageParams),
    UnassignedBugs {
        filter: UnassignedQuery,
        page: PageParams,
    },
    SearchBugs {
        search: BugSearch,
        page: PageParams,
    },
    Developers,
}

impl CacheKey {
    /// Bug the key refers to, for detail keys.
    #[must_use]
    pub const fn bug_id(&self) -> Option<BugId> {
        match self {
            Self::BugById(id) => Some(*id),
            _ => None,
        }
    }

    const fn page(&self) -> Option<PageParams> {
        match self {
            Self::MyBugs(page)
            | Self::AssignedBugs(page)
            | Self::UnassignedBugs { page, .. }
            | Self::SearchBugs { page, .. } => Some(*page),
            Self::CurrentUser | Self::BugById(_) | Self::Developers => None,
        }
    }
}

/// Cached value types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheValue {
    User(Box<User>),
    Bug(Box<Bug>),
    BugPage(PaginatedResult<BugListItem>),
    Developers(Vec<Developer>),
}

impl CacheValue {
    /// The value as a bug, if it is one.
    #[must_use]
    pub fn as_bug(&self) -> Option<&Bug> {
        match self {
            Self::Bug(bug) => Some(bug),
            _ => None,
        }
    }

    /// The value as a page of bugs, if it is one.
    #[must_use]
    pub const fn as_bug_page(&self) -> Option<&PaginatedResult<BugListItem>> {
        match self {
            Self::BugPage(page) => Some(page),
            _ => None,
        }
    }

    /// The value as a developer list, if it is one.
    #[must_use]
    pub fn as_developers(&self) -> Option<&[Developer]> {
        match self {
            Self::Developers(devs) => Some(devs),
            _ => None,
        }
    }

    /// The value as a user, if it is one.
    #[must_use]
    pub fn as_user(&self) -> Option<&User> {
        match self {
            Self::User(user) => Some(user),
            _ => None,
        }
    }
}

impl Keyed for CacheKey {
    type Value = CacheValue;
    type Tag = ResourceType;

    fn tag(&self) -> ResourceType {
        match self {
            Self::CurrentUser => ResourceType::CurrentUser,
            Self::BugById(_) => ResourceType::BugById,
            Self::MyBugs(_) => ResourceType::MyBugs,
            Self::AssignedBugs(_) => ResourceType::AssignedBugs,
            Self::UnassignedBugs { .. } => ResourceType::UnassignedBugs,
            Self::SearchBugs { .. } => ResourceType::SearchBugs,
            Self::Developers => ResourceType::Developers,
        }
    }

    fn placeholder(&self) -> Option<CacheValue> {
        if let Some(page) = self.page() {
            return Some(CacheValue::BugPage(PaginatedResult::empty(page.page_size)));
        }
        match self {
            Self::Developers => Some(CacheValue::Developers(Vec::new())),
            _ => None,
        }
    }
}
