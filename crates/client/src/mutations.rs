//! Remote writes and the cache refresh they trigger.
//!
//! [`MutationDispatcher`] performs one remote write per invocation and, on
//! success, invalidates exactly the resource types the write affects.
//! [`MutationSite`] is the per-call-site handle a view holds: it tracks the
//! site's [`MutationRecord`] and ignores repeat invocations while a write is
//! pending.
//!
//! The remote write runs on its own task, which also settles the site's
//! record. Dropping the awaiting future or the site does not cancel the
//! write, and the site is ready for the next write once it finishes. A
//! write that finishes after the session changed leaves the session and the
//! new account's cache alone.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use bugdesk_core::{
    Attachment, AttachmentId, Bug, BugId, BugStatus, CreateBugDto, UpdateBugDto, UserId,
};

use crate::api::{ApiClient, UploadFile};
use crate::cache::{CacheKey, ResourceCache, ResourceType};
use crate::error::ClientError;
use crate::session::SessionStore;
use crate::views::View;

// =============================================================================
// Operations
// =============================================================================

/// Kind of remote write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    CreateBug,
    UpdateBug,
    UpdateBugStatus,
    AssignBug,
    UnassignBug,
    DeleteBug,
    UploadAttachment,
    DeleteAttachment,
    DownloadAttachment,
}

impl MutationKind {
    /// Message shown when the server gives no reason.
    #[must_use]
    pub const fn fallback_message(self) -> &'static str {
        match self {
            Self::CreateBug => "Failed to create bug",
            Self::UpdateBug => "Failed to update bug",
            Self::UpdateBugStatus => "Failed to update bug status",
            Self::AssignBug => "Failed to assign bug",
            Self::UnassignBug => "Failed to unassign bug",
            Self::DeleteBug => "Failed to delete bug",
            Self::UploadAttachment => "Failed to upload attachment",
            Self::DeleteAttachment => "Failed to delete attachment",
            Self::DownloadAttachment => "Failed to download attachment",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A remote write with its payload.
#[derive(Debug, Clone)]
pub enum Mutation {
    CreateBug(CreateBugDto),
    UpdateBug {
        id: BugId,
        payload: UpdateBugDto,
    },
    UpdateBugStatus {
        id: BugId,
        status: BugStatus,
    },
    /// Without a developer the caller assigns the bug to themselves.
    AssignBug {
        id: BugId,
        developer_id: Option<UserId>,
    },
    UnassignBug(BugId),
    DeleteBug(BugId),
    UploadAttachment {
        bug_id: BugId,
        file: UploadFile,
    },
    DeleteAttachment {
        bug_id: BugId,
        attachment_id: AttachmentId,
    },
    DownloadAttachment(AttachmentId),
}

/// A cache invalidation: every entry of a resource type, or one bug's detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidation {
    All(ResourceType),
    Bug(BugId),
}

impl Mutation {
    #[must_use]
    pub const fn kind(&self) -> MutationKind {
        match self {
            Self::CreateBug(_) => MutationKind::CreateBug,
            Self::UpdateBug { .. } => MutationKind::UpdateBug,
            Self::UpdateBugStatus { .. } => MutationKind::UpdateBugStatus,
            Self::AssignBug { .. } => MutationKind::AssignBug,
            Self::UnassignBug(_) => MutationKind::UnassignBug,
            Self::DeleteBug(_) => MutationKind::DeleteBug,
            Self::UploadAttachment { .. } => MutationKind::UploadAttachment,
            Self::DeleteAttachment { .. } => MutationKind::DeleteAttachment,
            Self::DownloadAttachment(_) => MutationKind::DownloadAttachment,
        }
    }

    /// Cache entries made outdated by a successful write.
    #[must_use]
    pub fn invalidations(&self) -> Vec<Invalidation> {
        use ResourceType::{AssignedBugs, MyBugs, SearchBugs, UnassignedBugs};

        let all_lists = ResourceType::BUG_LISTS.map(Invalidation::All);
        match self {
            Self::CreateBug(_) => vec![
                Invalidation::All(MyBugs),
                Invalidation::All(UnassignedBugs),
                Invalidation::All(SearchBugs),
            ],
            Self::UpdateBug { id, .. } | Self::UpdateBugStatus { id, .. } | Self::DeleteBug(id) => {
                let mut targets = vec![Invalidation::Bug(*id)];
                targets.extend(all_lists);
                targets
            }
            Self::AssignBug { id, .. } | Self::UnassignBug(id) => vec![
                Invalidation::Bug(*id),
                Invalidation::All(AssignedBugs),
                Invalidation::All(UnassignedBugs),
            ],
            Self::UploadAttachment { bug_id, .. } | Self::DeleteAttachment { bug_id, .. } => {
                vec![Invalidation::Bug(*bug_id)]
            }
            Self::DownloadAttachment(_) => Vec::new(),
        }
    }
}

/// Result data of a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutput {
    Bug(Box<Bug>),
    Attachment(Attachment),
    /// Raw content of a downloaded attachment.
    Content(Vec<u8>),
    BugDeleted(BugId),
    AttachmentDeleted(AttachmentId),
}

impl MutationOutput {
    /// View to leave for, when the write removed the entity being viewed.
    #[must_use]
    pub const fn navigate_to(&self) -> Option<View> {
        match self {
            Self::BugDeleted(_) => Some(View::Dashboard),
            _ => None,
        }
    }
}

/// A failed write, with the text to show at the call site.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct MutationError {
    pub kind: MutationKind,
    pub message: String,
    #[source]
    pub source: ClientError,
}

impl MutationError {
    fn new(kind: MutationKind, source: ClientError) -> Self {
        let message = match &source {
            ClientError::Auth(msg)
            | ClientError::Forbidden(msg)
            | ClientError::NotFound(msg)
            | ClientError::Validation(msg)
            | ClientError::Server { message: msg, .. }
                if !msg.trim().is_empty() =>
            {
                msg.clone()
            }
            ClientError::Network(_) | ClientError::NotAuthenticated => source.user_message(),
            _ => kind.fallback_message().to_string(),
        };
        Self {
            kind,
            message,
            source,
        }
    }
}

// =============================================================================
// MutationDispatcher
// =============================================================================

/// Executes remote writes and refreshes the affected cache entries.
#[derive(Clone)]
pub struct MutationDispatcher {
    api: ApiClient,
    cache: ResourceCache<CacheKey>,
    session: SessionStore,
}

impl MutationDispatcher {
    #[must_use]
    pub const fn new(api: ApiClient, cache: ResourceCache<CacheKey>, session: SessionStore) -> Self {
        Self {
            api,
            cache,
            session,
        }
    }

    /// A fresh call site with an idle record.
    #[must_use]
    pub fn site(&self) -> MutationSite {
        let (record, _) = watch::channel(MutationRecord::default());
        MutationSite {
            dispatcher: self.clone(),
            record: Arc::new(record),
        }
    }

    /// Perform one write and apply its invalidations.
    ///
    /// # Errors
    ///
    /// Returns a [`MutationError`] carrying a displayable message. A rejected
    /// token also expires the session.
    #[instrument(skip(self, mutation), fields(kind = %mutation.kind()))]
    pub async fn execute(&self, mutation: Mutation) -> Result<MutationOutput, MutationError> {
        let kind = mutation.kind();
        let invalidations = mutation.invalidations();
        let sent_under = self.session.generation();

        match self.perform(mutation).await {
            Ok(output) if self.session.generation() != sent_under => {
                debug!(%sent_under, "Session changed during write, skipping cache refresh");
                Ok(output)
            }
            Ok(output) => {
                if let MutationOutput::BugDeleted(id) = &output {
                    self.cache.evict(&CacheKey::BugById(*id)).await;
                }
                self.apply(&invalidations);
                Ok(output)
            }
            Err(e) => {
                warn!(error = %e, "Mutation failed");
                self.session.observe_error(&e, sent_under);
                Err(MutationError::new(kind, e))
            }
        }
    }

    async fn perform(&self, mutation: Mutation) -> Result<MutationOutput, ClientError> {
        let api = &self.api;
        let updated = |bug: Bug| MutationOutput::Bug(Box::new(bug));
        Ok(match mutation {
            Mutation::CreateBug(payload) => updated(api.create_bug(&payload).await?),
            Mutation::UpdateBug { id, payload } => updated(api.update_bug(id, &payload).await?),
            Mutation::UpdateBugStatus { id, status } => {
                updated(api.update_bug_status(id, status).await?)
            }
            Mutation::AssignBug { id, developer_id } => {
                updated(api.assign_bug(id, developer_id.as_ref()).await?)
            }
            Mutation::UnassignBug(id) => updated(api.unassign_bug(id).await?),
            Mutation::DeleteBug(id) => {
                api.delete_bug(id).await?;
                MutationOutput::BugDeleted(id)
            }
            Mutation::UploadAttachment { bug_id, file } => {
                MutationOutput::Attachment(api.upload_attachment(bug_id, file).await?)
            }
            Mutation::DeleteAttachment { attachment_id, .. } => {
                api.delete_attachment(attachment_id).await?;
                MutationOutput::AttachmentDeleted(attachment_id)
            }
            Mutation::DownloadAttachment(id) => {
                MutationOutput::Content(api.download_attachment(id).await?)
            }
        })
    }

    fn apply(&self, invalidations: &[Invalidation]) {
        for invalidation in invalidations {
            let marked = match *invalidation {
                Invalidation::All(tag) => self.cache.invalidate(tag, None),
                Invalidation::Bug(id) => self.cache.invalidate(
                    ResourceType::BugById,
                    Some(&move |key: &CacheKey| key.bug_id() == Some(id)),
                ),
            };
            debug!(?invalidation, marked, "Applied invalidation");
        }
    }
}

// =============================================================================
// MutationSite
// =============================================================================

/// Lifecycle of a call site's latest write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutationStatus {
    #[default]
    Idle,
    Pending,
    Success,
    Error,
}

/// State of one call site.
#[derive(Debug, Clone, Default)]
pub struct MutationRecord {
    pub kind: Option<MutationKind>,
    pub status: MutationStatus,
    /// Set while `status` is `Error`, until the next execution.
    pub error: Option<MutationError>,
}

/// Outcome of [`MutationSite::execute`].
#[derive(Debug, Clone)]
pub enum MutationOutcome {
    Completed(MutationOutput),
    Failed(MutationError),
    /// A write from this site was already pending; nothing was sent.
    Ignored,
}

/// Per-call-site mutation handle. At most one write is pending per site.
pub struct MutationSite {
    dispatcher: MutationDispatcher,
    record: Arc<watch::Sender<MutationRecord>>,
}

/// Record the end of a write.
fn settle(record: &watch::Sender<MutationRecord>, result: &Result<MutationOutput, MutationError>) {
    record.send_modify(|record| match result {
        Ok(_) => record.status = MutationStatus::Success,
        Err(error) => {
            record.status = MutationStatus::Error;
            record.error = Some(error.clone());
        }
    });
}

impl MutationSite {
    /// Run a write unless one is already pending here.
    pub async fn execute(&self, mutation: Mutation) -> MutationOutcome {
        let kind = mutation.kind();
        let acquired = self.record.send_if_modified(|record| {
            if record.status == MutationStatus::Pending {
                return false;
            }
            *record = MutationRecord {
                kind: Some(kind),
                status: MutationStatus::Pending,
                error: None,
            };
            true
        });
        if !acquired {
            debug!(%kind, "Mutation already pending at this site, ignoring");
            return MutationOutcome::Ignored;
        }

        let dispatcher = self.dispatcher.clone();
        let record = Arc::clone(&self.record);
        let task = tokio::spawn(async move {
            let result = dispatcher.execute(mutation).await;
            settle(&record, &result);
            result
        });
        let result = match task.await {
            Ok(result) => result,
            Err(e) => {
                let result = Err(MutationError::new(kind, ClientError::Network(e.to_string())));
                settle(&self.record, &result);
                result
            }
        };

        match result {
            Ok(output) => MutationOutcome::Completed(output),
            Err(error) => MutationOutcome::Failed(error),
        }
    }

    /// Run a write and hand the outcome to a continuation.
    pub async fn execute_then<S, E>(&self, mutation: Mutation, on_success: S, on_error: E)
    where
        S: FnOnce(MutationOutput),
        E: FnOnce(MutationError),
    {
        match self.execute(mutation).await {
            MutationOutcome::Completed(output) => on_success(output),
            MutationOutcome::Failed(error) => on_error(error),
            MutationOutcome::Ignored => {}
        }
    }

    /// Current record.
    #[must_use]
    pub fn record(&self) -> MutationRecord {
        self.record.borrow().clone()
    }

    /// Whether a write is pending here.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.record.borrow().status == MutationStatus::Pending
    }

    /// Watch the record.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<MutationRecord> {
        self.record.subscribe()
    }
}
