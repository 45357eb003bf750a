//! Bug records, attachments and the request bodies that mutate them.
//!
//! Timestamps are kept as the server's ISO-8601 strings; the client only
//! displays them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::id::{AttachmentId, BugId, UserId};
use super::status::{BugStatus, Severity};

/// File extensions that can be previewed inline.
pub const PREVIEWABLE_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Full bug record as returned by `GET /bugs/{id}` and every bug mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bug {
    pub id: BugId,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub status: BugStatus,
    #[serde(default)]
    pub reproduction_steps: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
    pub reporter_id: UserId,
    pub reporter_name: String,
    pub reporter_email: String,
    #[serde(default)]
    pub assigned_developer_id: Option<UserId>,
    #[serde(default)]
    pub assigned_developer_name: Option<String>,
    #[serde(default)]
    pub assigned_developer_email: Option<String>,
    /// Shared by every clone of one fetched record; a refetch allocates anew.
    #[serde(default)]
    pub attachments: Arc<[Attachment]>,
}

/// Row of a paginated bug listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BugListItem {
    pub id: BugId,
    pub title: String,
    pub severity: Severity,
    pub status: BugStatus,
    pub created_at: String,
    pub reporter_name: String,
    #[serde(default)]
    pub assigned_developer_name: Option<String>,
    #[serde(default)]
    pub attachment_count: u32,
}

/// Metadata of a file attached to a bug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: AttachmentId,
    pub file_name: String,
    pub content_type: String,
    pub file_size: u64,
    pub uploaded_at: String,
}

impl Attachment {
    /// Lower-cased extension of the file name, if any.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }

    /// Whether the file is an image that can be previewed inline.
    #[must_use]
    pub fn is_previewable_image(&self) -> bool {
        self.extension()
            .is_some_and(|ext| PREVIEWABLE_IMAGE_EXTENSIONS.contains(&ext.as_str()))
    }
}

/// Body of `POST /bugs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBugDto {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reproduction_steps: Option<String>,
}

/// Body of `PUT /bugs/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBugDto {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reproduction_steps: Option<String>,
}

/// Body of `PATCH /bugs/{id}/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpdateBugStatusDto {
    pub status: BugStatus,
}

/// Body of `PATCH /bugs/{id}/assign` when assigning someone other than the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignBugDto {
    pub developer_id: UserId,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn attachment(name: &str) -> Attachment {
        Attachment {
            id: AttachmentId::new(1),
            file_name: name.to_owned(),
            content_type: "application/octet-stream".to_owned(),
            file_size: 10,
            uploaded_at: "2026-01-01T00:00:00Z".to_owned(),
        }
    }

    #[test]
    fn test_previewable_by_extension() {
        assert!(attachment("shot.PNG").is_previewable_image());
        assert!(attachment("a.b.jpeg").is_previewable_image());
        assert!(!attachment("log.txt").is_previewable_image());
        assert!(!attachment("png").is_previewable_image());
    }

    #[test]
    fn test_bug_parses_with_optional_fields_missing() {
        let json = r#"{
            "id": 42, "title": "Crash", "description": "Boom",
            "severity": 3, "status": 1, "createdAt": "2026-01-01T00:00:00Z",
            "reporterId": "u1", "reporterName": "Ann", "reporterEmail": "a@b.com"
        }"#;
        let bug: Bug = serde_json::from_str(json).unwrap();
        assert_eq!(bug.id, BugId::new(42));
        assert_eq!(bug.severity, Severity::High);
        assert!(bug.assigned_developer_id.is_none());
        assert!(bug.attachments.is_empty());
    }

    #[test]
    fn test_create_dto_omits_missing_steps() {
        let dto = CreateBugDto {
            title: "t".to_owned(),
            description: "d".to_owned(),
            severity: Severity::Low,
            reproduction_steps: None,
        };
        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["severity"], 1);
        assert!(json.get("reproductionSteps").is_none());
    }
}
