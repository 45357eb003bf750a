//! Attachment endpoints: multipart upload, binary download, delete.

use reqwest::Method;
use reqwest::multipart::{Form, Part};
use tracing::instrument;

use bugdesk_core::{Attachment, AttachmentId, BugId};

use super::ApiClient;
use crate::error::ClientError;

/// A file picked for upload.
#[derive(Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for UploadFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadFile")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ApiClient {
    /// Upload a file to a bug as a `multipart/form-data` `file` field.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` if the server rejects the file.
    #[instrument(skip(self, file), fields(bug_id = %bug_id, file_name = %file.file_name))]
    pub async fn upload_attachment(
        &self,
        bug_id: BugId,
        file: UploadFile,
    ) -> Result<Attachment, ClientError> {
        let part = Part::bytes(file.bytes)
            .file_name(file.file_name)
            .mime_str(&file.content_type)
            .map_err(|e| ClientError::Validation(format!("invalid content type: {e}")))?;
        let form = Form::new().part("file", part);

        let request = self
            .request(Method::POST, &format!("/bugs/{bug_id}/attachments"), &[])?
            .multipart(form);
        self.send_json(request).await
    }

    /// Download the raw content of an attachment.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if the attachment was deleted.
    #[instrument(skip(self), fields(attachment_id = %id))]
    pub async fn download_attachment(&self, id: AttachmentId) -> Result<Vec<u8>, ClientError> {
        let request = self.request(Method::GET, &format!("/attachments/{id}"), &[])?;
        let response = self.send(request).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Delete an attachment.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(attachment_id = %id))]
    pub async fn delete_attachment(&self, id: AttachmentId) -> Result<(), ClientError> {
        let request = self.request(Method::DELETE, &format!("/attachments/{id}"), &[])?;
        self.send_empty(request).await
    }
}
