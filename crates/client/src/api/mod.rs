//! Bugdesk REST API client.
//!
//! Thin typed layer over `reqwest`: one method per remote endpoint, grouped
//! by resource in the submodules. No caching happens here; reads are cached
//! by [`crate::cache::ResourceCache`] and writes go through
//! [`crate::mutations::MutationSite`].
//!
//! # Authentication
//!
//! The bearer token is held in memory and attached to every request once
//! installed by the session store. A 401 from any endpoint surfaces as
//! [`ClientError::Auth`].

mod attachments;
mod auth;
mod bugs;
mod users;

pub use attachments::UploadFile;
pub use bugs::{BugSearch, UnassignedQuery};

use std::sync::{Arc, PoisonError, RwLock};

use reqwest::{Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error};
use url::Url;

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Error body returned by the remote service.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

// =============================================================================
// ApiClient
// =============================================================================

/// Client for the Bugdesk REST API.
///
/// Cheaply cloneable; all clones share the HTTP connection pool and the
/// installed bearer token.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    base_url: Url,
    /// Bearer token of the installed session
    token: RwLock<Option<SecretString>>,
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client,
                base_url: config.api_url.clone(),
                token: RwLock::new(None),
            }),
        })
    }

    /// Install the bearer token sent with every request.
    pub fn set_token(&self, token: SecretString) {
        *self
            .inner
            .token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    /// Drop the bearer token.
    pub fn clear_token(&self) {
        *self
            .inner
            .token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Whether a bearer token is installed.
    #[must_use]
    pub fn has_token(&self) -> bool {
        self.inner
            .token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Build the absolute URL for an API path with optional query parameters.
    ///
    /// Parameters whose value is `None` are omitted.
    fn url(&self, path: &str, query: &[(&str, Option<String>)]) -> Result<Url, ClientError> {
        let base = self.inner.base_url.as_str().trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}{path}"))
            .map_err(|e| ClientError::Network(format!("invalid URL for {path}: {e}")))?;

        let present: Vec<(&str, &String)> = query
            .iter()
            .filter_map(|(key, value)| value.as_ref().map(|v| (*key, v)))
            .collect();
        if !present.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in present {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Start a request, attaching the bearer token if one is installed.
    fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, Option<String>)],
    ) -> Result<RequestBuilder, ClientError> {
        let url = self.url(path, query)?;
        let builder = self.inner.client.request(method, url);
        let token = self
            .inner
            .token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Ok(match token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        })
    }

    /// Send a request and turn non-success statuses into errors.
    async fn send(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        // Get response body as text first for better error diagnostics
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.message.or(b.title))
            .unwrap_or_else(|| body.chars().take(200).collect());

        if status.is_server_error() {
            error!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "Bugdesk API returned non-success status"
            );
        } else {
            debug!(status = %status, message = %message, "Bugdesk API rejected request");
        }

        Err(ClientError::from_status(status.as_u16(), message))
    }

    /// Send a request and decode a JSON body.
    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = self.send(request).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            error!(
                error = %e,
                body = %text.chars().take(500).collect::<String>(),
                "Failed to parse Bugdesk API response"
            );
            ClientError::Decode(e.to_string())
        })
    }

    /// Send a request whose response body is ignored.
    async fn send_empty(&self, request: RequestBuilder) -> Result<(), ClientError> {
        self.send(request).await?;
        Ok(())
    }
}
