//! Paginated listings and the parameters that select a page.

use serde::{Deserialize, Serialize};

/// Default number of rows per page.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Errors for page selections the client refuses to send.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaginationError {
    /// Page numbers are 1-based.
    #[error("page number must be at least 1")]
    ZeroPage,
    /// A page must hold at least one row.
    #[error("page size must be at least 1")]
    ZeroPageSize,
}

/// Page selection sent as `pageNumber` / `pageSize` query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageParams {
    pub page_number: u32,
    pub page_size: u32,
}

impl PageParams {
    /// Create a page selection.
    ///
    /// # Errors
    ///
    /// Returns an error if either value is zero.
    pub const fn new(page_number: u32, page_size: u32) -> Result<Self, PaginationError> {
        if page_number == 0 {
            return Err(PaginationError::ZeroPage);
        }
        if page_size == 0 {
            return Err(PaginationError::ZeroPageSize);
        }
        Ok(Self {
            page_number,
            page_size,
        })
    }

    /// First page with the given size.
    #[must_use]
    pub const fn first(page_size: u32) -> Self {
        Self {
            page_number: 1,
            page_size: if page_size == 0 { DEFAULT_PAGE_SIZE } else { page_size },
        }
    }

    /// The same page size at another page number (clamped to 1).
    #[must_use]
    pub const fn with_page(self, page_number: u32) -> Self {
        Self {
            page_number: if page_number == 0 { 1 } else { page_number },
            page_size: self.page_size,
        }
    }
}

impl Default for PageParams {
    fn default() -> Self {
        Self::first(DEFAULT_PAGE_SIZE)
    }
}

/// Wire shape of a page; flags are recomputed on conversion.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPage<T> {
    items: Vec<T>,
    page_number: u32,
    page_size: u32,
    total_count: u64,
    total_pages: u32,
}

/// One page of a server-side listing.
///
/// `has_previous_page` and `has_next_page` are always derived from
/// `page_number` and `total_pages`, whatever the server sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawPage<T>")]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub page_number: u32,
    pub page_size: u32,
    pub total_count: u64,
    pub total_pages: u32,
    pub has_previous_page: bool,
    pub has_next_page: bool,
}

impl<T> From<RawPage<T>> for PaginatedResult<T> {
    fn from(raw: RawPage<T>) -> Self {
        Self::new(
            raw.items,
            raw.page_number,
            raw.page_size,
            raw.total_count,
            raw.total_pages,
        )
    }
}

impl<T> PaginatedResult<T> {
    /// Build a page, deriving the navigation flags.
    #[must_use]
    pub const fn new(
        items: Vec<T>,
        page_number: u32,
        page_size: u32,
        total_count: u64,
        total_pages: u32,
    ) -> Self {
        Self {
            items,
            page_number,
            page_size,
            total_count,
            total_pages,
            has_previous_page: page_number > 1,
            has_next_page: page_number < total_pages,
        }
    }

    /// Empty first page shown while the real page loads.
    #[must_use]
    pub const fn empty(page_size: u32) -> Self {
        Self::new(Vec::new(), 1, page_size, 0, 0)
    }

    /// Page number to request for "next", if there is one.
    #[must_use]
    pub const fn next_page(&self) -> Option<u32> {
        if self.has_next_page {
            Some(self.page_number + 1)
        } else {
            None
        }
    }

    /// Page number to request for "previous", if there is one.
    #[must_use]
    pub const fn previous_page(&self) -> Option<u32> {
        if self.has_previous_page {
            Some(self.page_number - 1)
        } else {
            None
        }
    }
}
