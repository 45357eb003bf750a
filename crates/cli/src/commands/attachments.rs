//! Attachment upload, download and delete commands.

use std::path::{Path, PathBuf};

use bugdesk_client::api::UploadFile;
use bugdesk_client::mutations::{Mutation, MutationOutput};
use bugdesk_client::views::View;
use bugdesk_core::{AttachmentId, BugId};

use super::{CliError, Context, positive_id};
use crate::output;

/// Content type sent for a file, by extension.
fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        Some("txt" | "log") => "text/plain",
        Some("json") => "application/json",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

/// Upload a local file to a bug.
pub async fn upload(ctx: &Context, bug_id: i64, path: &Path) -> Result<(), CliError> {
    let bug_id = BugId::new(positive_id(bug_id, "bug")?);
    ctx.require(View::BugDetail(bug_id))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CliError::InvalidArgument(format!("{} is not a file", path.display())))?
        .to_string();
    let bytes = tokio::fs::read(path).await.map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let file = UploadFile {
        file_name,
        content_type: content_type(path).to_string(),
        bytes,
    };
    match ctx.mutate(Mutation::UploadAttachment { bug_id, file }).await? {
        MutationOutput::Attachment(attachment) if ctx.json => output::json(&attachment),
        MutationOutput::Attachment(attachment) => {
            output::line(format!(
                "Uploaded {} as attachment {}",
                attachment.file_name, attachment.id
            ));
            Ok(())
        }
        _ => Err(CliError::Unexpected("attachment upload")),
    }
}

/// Save an attachment's content to a local file.
pub async fn download(
    ctx: &Context,
    attachment_id: i64,
    save_to: Option<PathBuf>,
) -> Result<(), CliError> {
    let id = AttachmentId::new(positive_id(attachment_id, "attachment")?);
    ctx.require(View::Dashboard)?;

    let MutationOutput::Content(bytes) = ctx.mutate(Mutation::DownloadAttachment(id)).await?
    else {
        return Err(CliError::Unexpected("attachment download"));
    };

    let target = save_to.unwrap_or_else(|| PathBuf::from(format!("attachment-{id}")));
    tokio::fs::write(&target, &bytes)
        .await
        .map_err(|source| CliError::Io {
            path: target.clone(),
            source,
        })?;
    output::line(format!("Saved {} bytes to {}", bytes.len(), target.display()));
    Ok(())
}

/// Delete an attachment from a bug.
pub async fn delete(ctx: &Context, bug_id: i64, attachment_id: i64) -> Result<(), CliError> {
    let bug_id = BugId::new(positive_id(bug_id, "bug")?);
    let attachment_id = AttachmentId::new(positive_id(attachment_id, "attachment")?);
    ctx.require(View::BugDetail(bug_id))?;

    ctx.mutate(Mutation::DeleteAttachment {
        bug_id,
        attachment_id,
    })
    .await?;
    output::line(format!("Attachment {attachment_id} deleted"));
    Ok(())
}
