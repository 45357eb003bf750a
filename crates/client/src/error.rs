//! Unified error handling for the client layer.
//!
//! Every remote call returns `Result<T, ClientError>`. The variants follow
//! how the failure must be handled by the caller rather than where it came
//! from:
//!
//! - `Auth` - credentials rejected or session expired; the session is cleared
//! - `Forbidden` - authenticated but not allowed; handled as a redirect
//! - `NotFound` - entity deleted or missing
//! - `Validation` - payload rejected by the server
//! - `Network` - transport failure, no response
//! - `Decode` / `Server` - the server answered with something unusable
//!
//! Preview failures have their own type, [`PreviewError`], because they are
//! never escalated past the preview manager.

use thiserror::Error;

use bugdesk_core::AttachmentId;

/// Application-level error type for remote operations.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Invalid credentials or expired session (HTTP 401).
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Authenticated but not permitted (HTTP 403).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Entity missing or deleted (HTTP 404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Payload rejected by the server (HTTP 400, 409, 422).
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Transport failure before a response arrived.
    #[error("Network error: {0}")]
    Network(String),

    /// Response body could not be decoded.
    #[error("Invalid response: {0}")]
    Decode(String),

    /// Any other non-success status.
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Server-provided or synthesized message.
        message: String,
    },

    /// An action needs a session but none is installed.
    #[error("Not signed in")]
    NotAuthenticated,
}

impl ClientError {
    /// Map an HTTP status and message to the error taxonomy.
    #[must_use]
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 => Self::Auth(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            400 | 409 | 422 => Self::Validation(message),
            _ => Self::Server { status, message },
        }
    }

    /// Whether this error means the stored credential is no longer valid.
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::NotAuthenticated)
    }

    /// Text suitable for showing inline at the call site.
    ///
    /// Server-provided messages are passed through; transport and decode
    /// failures get a generic sentence so internals are not exposed.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Auth(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg)
            | Self::Validation(msg)
            | Self::Server { message: msg, .. }
                if !msg.is_empty() =>
            {
                msg.clone()
            }
            Self::Auth(_) => "Invalid credentials".to_string(),
            Self::Forbidden(_) => "You do not have access to this resource".to_string(),
            Self::NotFound(_) => "The requested item no longer exists".to_string(),
            Self::Validation(_) => "The request was rejected".to_string(),
            Self::Network(_) => "Could not reach the server".to_string(),
            Self::Decode(_) | Self::Server { .. } => "Unexpected server response".to_string(),
            Self::NotAuthenticated => "Please sign in".to_string(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Failure to produce an attachment preview.
///
/// Previews are best effort: this error is logged and recorded on the
/// handle, and never shown to the user or propagated further.
#[derive(Debug, Clone, Error)]
#[error("Preview of attachment {attachment_id} failed: {source}")]
pub struct PreviewError {
    /// Attachment whose content could not be fetched.
    pub attachment_id: AttachmentId,
    /// Underlying fetch failure.
    #[source]
    pub source: ClientError,
}

/// Result type alias for `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            ClientError::from_status(401, String::new()),
            ClientError::Auth(_)
        ));
        assert!(matches!(
            ClientError::from_status(403, String::new()),
            ClientError::Forbidden(_)
        ));
        assert!(matches!(
            ClientError::from_status(404, String::new()),
            ClientError::NotFound(_)
        ));
        assert!(matches!(
            ClientError::from_status(422, String::new()),
            ClientError::Validation(_)
        ));
        assert!(matches!(
            ClientError::from_status(503, String::new()),
            ClientError::Server { status: 503, .. }
        ));
    }

    #[test]
    fn test_user_message_prefers_server_text() {
        let err = ClientError::Validation("Title is required".to_string());
        assert_eq!(err.user_message(), "Title is required");

        let err = ClientError::Auth(String::new());
        assert_eq!(err.user_message(), "Invalid credentials");
    }

    #[test]
    fn test_user_message_hides_transport_details() {
        let err = ClientError::Network("dns error: no such host bugs.internal".to_string());
        assert_eq!(err.user_message(), "Could not reach the server");
    }

    #[test]
    fn test_display() {
        let err = ClientError::NotFound("bug 42".to_string());
        assert_eq!(err.to_string(), "Not found: bug 42");
    }
}
