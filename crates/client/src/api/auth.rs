//! Authentication endpoints.

use reqwest::Method;
use tracing::instrument;

use bugdesk_core::{AuthResponse, LoginDto, RegisterDto, User};

use super::ApiClient;
use crate::error::ClientError;

impl ApiClient {
    /// Create an account. The response logs the new account in.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` if the server rejects the details.
    #[instrument(skip(self, details), fields(email = %details.email))]
    pub async fn register(&self, details: &RegisterDto) -> Result<AuthResponse, ClientError> {
        let request = self
            .request(Method::POST, "/auth/register", &[])?
            .json(details);
        self.send_json(request).await
    }

    /// Exchange credentials for a token.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Auth` if the credentials are invalid.
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn login(&self, credentials: &LoginDto) -> Result<AuthResponse, ClientError> {
        let request = self
            .request(Method::POST, "/auth/login", &[])?
            .json(credentials);
        self.send_json(request).await
    }

    /// Fetch the account the installed token belongs to.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Auth` if the token is missing or rejected.
    #[instrument(skip(self))]
    pub async fn current_user(&self) -> Result<User, ClientError> {
        let request = self.request(Method::GET, "/auth/me", &[])?;
        self.send_json(request).await
    }
}
