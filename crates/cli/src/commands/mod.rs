//! CLI command implementations.

pub mod attachments;
pub mod auth;
pub mod bugs;

use std::path::PathBuf;

use thiserror::Error;

use bugdesk_client::guard::GuardDecision;
use bugdesk_client::mutations::{Mutation, MutationError, MutationOutcome, MutationOutput};
use bugdesk_client::views::View;
use bugdesk_client::{Bugdesk, ClientConfig, ClientError};
use bugdesk_core::EmailError;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    /// The remote service rejected or failed a read.
    #[error("{}", .0.user_message())]
    Client(#[from] ClientError),

    /// A write failed.
    #[error("{0}")]
    Mutation(#[from] MutationError),

    /// No stored session.
    #[error("Not signed in. Run `bugdesk login` first.")]
    NotSignedIn,

    /// The signed-in role may not open the view behind the command.
    #[error("Your account cannot access {0}")]
    Forbidden(String),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// Invalid command line argument.
    #[error("{0}")]
    InvalidArgument(String),

    /// Local file could not be read or written.
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Output could not be serialized.
    #[error("Failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),

    /// The cache held a value of the wrong shape for a read.
    #[error("Unexpected response for {0}")]
    Unexpected(&'static str),
}

/// Services plus output preferences for one invocation.
pub struct Context {
    pub app: Bugdesk,
    pub json: bool,
}

impl Context {
    /// Build the services and restore the persisted session.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn start(config: ClientConfig, json: bool) -> Result<Self, CliError> {
        let app = Bugdesk::new(config)?;
        app.session().bootstrap();
        Ok(Self { app, json })
    }

    /// Check that the signed-in user may open `view`.
    ///
    /// # Errors
    ///
    /// Returns `NotSignedIn` without a session, `Forbidden` for a role the
    /// view does not admit.
    pub fn require(&self, view: View) -> Result<(), CliError> {
        match self.app.guard().evaluate_view(&self.app.session().snapshot(), view) {
            GuardDecision::Authorized => Ok(()),
            GuardDecision::Unauthenticated { return_to, .. } => {
                tracing::debug!(%return_to, "No session for protected view");
                Err(CliError::NotSignedIn)
            }
            GuardDecision::Forbidden { .. } => Err(CliError::Forbidden(view.path())),
            // bootstrap has already run
            GuardDecision::Loading => Err(CliError::NotSignedIn),
        }
    }

    /// Run a write from a fresh call site.
    ///
    /// # Errors
    ///
    /// Returns the write's failure, or `NotSignedIn` when it cost the session.
    pub async fn mutate(&self, mutation: Mutation) -> Result<MutationOutput, CliError> {
        let kind = mutation.kind();
        match self.app.mutation_site().execute(mutation).await {
            MutationOutcome::Completed(output) => Ok(output),
            MutationOutcome::Failed(e) if e.source.is_auth() => {
                tracing::warn!(kind = %e.kind, "Session rejected by server");
                Err(CliError::NotSignedIn)
            }
            MutationOutcome::Failed(e) => Err(e.into()),
            MutationOutcome::Ignored => {
                tracing::warn!(%kind, "Write ignored by a busy call site");
                Err(CliError::Unexpected("write already pending"))
            }
        }
    }
}

/// Parse a positive numeric id from the command line.
pub(crate) fn positive_id(id: i64, what: &str) -> Result<i64, CliError> {
    if id > 0 {
        Ok(id)
    } else {
        Err(CliError::InvalidArgument(format!(
            "{what} id must be a positive number"
        )))
    }
}
