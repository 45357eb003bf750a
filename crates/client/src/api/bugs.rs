//! Bug endpoints: listings, detail and mutations.

use reqwest::Method;
use tracing::instrument;

use bugdesk_core::{
    AssignBugDto, Bug, BugId, BugListItem, BugStatus, CreateBugDto, PageParams, PaginatedResult,
    Severity, UpdateBugDto, UpdateBugStatusDto, UserId,
};

use super::ApiClient;
use crate::error::ClientError;

/// Filters of `GET /bugs/search`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BugSearch {
    /// Free-text term; `None` or empty matches everything.
    pub term: Option<String>,
    pub severity: Option<Severity>,
    pub status: Option<BugStatus>,
}

/// Filters of `GET /bugs/unassigned`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct UnassignedQuery {
    pub search: Option<String>,
}

/// Query parameters for a page selection.
fn page_query(page: PageParams) -> [(&'static str, Option<String>); 2] {
    [
        ("pageNumber", Some(page.page_number.to_string())),
        ("pageSize", Some(page.page_size.to_string())),
    ]
}

/// An empty search term is not sent at all.
fn non_empty(term: Option<&String>) -> Option<String> {
    term.filter(|t| !t.trim().is_empty()).cloned()
}

type BugPage = PaginatedResult<BugListItem>;

impl ApiClient {
    /// Report a new bug.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` if the payload is rejected.
    #[instrument(skip(self, payload), fields(title = %payload.title))]
    pub async fn create_bug(&self, payload: &CreateBugDto) -> Result<Bug, ClientError> {
        let request = self.request(Method::POST, "/bugs", &[])?.json(payload);
        self.send_json(request).await
    }

    /// Get a bug with its attachments.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if the bug does not exist.
    #[instrument(skip(self), fields(bug_id = %id))]
    pub async fn get_bug(&self, id: BugId) -> Result<Bug, ClientError> {
        let request = self.request(Method::GET, &format!("/bugs/{id}"), &[])?;
        self.send_json(request).await
    }

    /// Bugs reported by the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn my_bugs(&self, page: PageParams) -> Result<BugPage, ClientError> {
        let request = self.request(Method::GET, "/bugs/my-bugs", &page_query(page))?;
        self.send_json(request).await
    }

    /// Bugs assigned to the signed-in developer.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn assigned_bugs(&self, page: PageParams) -> Result<BugPage, ClientError> {
        let request = self.request(Method::GET, "/bugs/assigned", &page_query(page))?;
        self.send_json(request).await
    }

    /// Bugs nobody is working on yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn unassigned_bugs(
        &self,
        filter: &UnassignedQuery,
        page: PageParams,
    ) -> Result<BugPage, ClientError> {
        let [page_number, page_size] = page_query(page);
        let query = [
            ("search", non_empty(filter.search.as_ref())),
            page_number,
            page_size,
        ];
        let request = self.request(Method::GET, "/bugs/unassigned", &query)?;
        self.send_json(request).await
    }

    /// Search all bugs by term, severity and status.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn search_bugs(
        &self,
        search: &BugSearch,
        page: PageParams,
    ) -> Result<BugPage, ClientError> {
        let [page_number, page_size] = page_query(page);
        let query = [
            ("search", non_empty(search.term.as_ref())),
            ("severity", search.severity.map(|s| u8::from(s).to_string())),
            ("status", search.status.map(|s| u8::from(s).to_string())),
            page_number,
            page_size,
        ];
        let request = self.request(Method::GET, "/bugs/search", &query)?;
        self.send_json(request).await
    }

    /// Replace the editable fields of a bug.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` if the payload is rejected.
    #[instrument(skip(self, payload), fields(bug_id = %id))]
    pub async fn update_bug(&self, id: BugId, payload: &UpdateBugDto) -> Result<Bug, ClientError> {
        let request = self
            .request(Method::PUT, &format!("/bugs/{id}"), &[])?
            .json(payload);
        self.send_json(request).await
    }

    /// Move a bug to another lifecycle state.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(bug_id = %id))]
    pub async fn update_bug_status(
        &self,
        id: BugId,
        status: BugStatus,
    ) -> Result<Bug, ClientError> {
        let request = self
            .request(Method::PATCH, &format!("/bugs/{id}/status"), &[])?
            .json(&UpdateBugStatusDto { status });
        self.send_json(request).await
    }

    /// Assign a bug. Without a developer the caller assigns it to themselves.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(bug_id = %id))]
    pub async fn assign_bug(
        &self,
        id: BugId,
        developer_id: Option<&UserId>,
    ) -> Result<Bug, ClientError> {
        let mut request = self.request(Method::PATCH, &format!("/bugs/{id}/assign"), &[])?;
        if let Some(developer_id) = developer_id {
            request = request.json(&AssignBugDto {
                developer_id: developer_id.clone(),
            });
        }
        self.send_json(request).await
    }

    /// Remove the assignee of a bug.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(bug_id = %id))]
    pub async fn unassign_bug(&self, id: BugId) -> Result<Bug, ClientError> {
        let request = self.request(Method::PATCH, &format!("/bugs/{id}/unassign"), &[])?;
        self.send_json(request).await
    }

    /// Delete a bug and its attachments.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(bug_id = %id))]
    pub async fn delete_bug(&self, id: BugId) -> Result<(), ClientError> {
        let request = self.request(Method::DELETE, &format!("/bugs/{id}"), &[])?;
        self.send_empty(request).await
    }
}
