//! User directory endpoints.

use reqwest::Method;
use tracing::instrument;

use bugdesk_core::Developer;

use super::ApiClient;
use crate::error::ClientError;

impl ApiClient {
    /// List developers bugs can be assigned to.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn developers(&self) -> Result<Vec<Developer>, ClientError> {
        let request = self.request(Method::GET, "/users/developers", &[])?;
        self.send_json(request).await
    }
}
