//! Integration tests for Bugdesk.
//!
//! Each test drives the full client stack ([`Bugdesk`]) against a
//! `wiremock` server standing in for the remote API, with the session
//! persisted to a temporary data directory.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p bugdesk-integration-tests
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bugdesk_client::{Bugdesk, ClientConfig};

/// Debounce window used by test search boxes.
pub const TEST_DEBOUNCE: Duration = Duration::from_millis(50);

/// A mock API server plus a client whose session lives in a temp dir.
pub struct TestContext {
    pub server: MockServer,
    pub data_dir: TempDir,
    pub app: Bugdesk,
}

impl TestContext {
    /// Start a mock server and a client with a restored (empty) session.
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        let data_dir = tempfile::tempdir().unwrap();
        let app = Self::client(&server, &data_dir);
        Self {
            server,
            data_dir,
            app,
        }
    }

    fn client(server: &MockServer, data_dir: &TempDir) -> Bugdesk {
        let mut config = ClientConfig::new(Url::parse(&server.uri()).unwrap())
            .with_data_dir(data_dir.path());
        config.search_debounce = TEST_DEBOUNCE;
        let app = Bugdesk::new(config).unwrap();
        app.session().bootstrap();
        app
    }

    /// A new client process over the same data directory.
    #[must_use]
    pub fn restart(&self) -> Bugdesk {
        Self::client(&self.server, &self.data_dir)
    }

    /// Mount a successful login for `email`/`password` returning `token`.
    pub async fn mount_login(&self, email: &str, password: &str, token: &str, user: Value) {
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_json(json!({ "email": email, "password": password })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "token": token, "user": user })),
            )
            .mount(&self.server)
            .await;
    }

    /// Sign in as a fresh account with `role`.
    pub async fn sign_in_as(&self, role: &str) {
        let user = user_json("u1", "a@b.com", role);
        self.mount_login("a@b.com", "secret", "t1", user).await;
        let credentials = bugdesk_core::LoginDto {
            email: bugdesk_core::Email::parse("a@b.com").unwrap(),
            password: "secret".to_string(),
        };
        self.app.session().login(&credentials).await.unwrap();
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Wire form of a user.
#[must_use]
pub fn user_json(id: &str, email: &str, role: &str) -> Value {
    json!({ "id": id, "email": email, "fullName": "Ada Byron", "role": role })
}

/// Wire form of a bug reported by `u1`.
#[must_use]
pub fn bug_json(id: i64, assignee: Option<&str>, attachments: Value) -> Value {
    json!({
        "id": id,
        "title": format!("Bug {id}"),
        "description": "Crashes on save",
        "severity": 3,
        "status": 1,
        "createdAt": "2024-01-01T00:00:00Z",
        "reporterId": "u1",
        "reporterName": "Ada Byron",
        "reporterEmail": "a@b.com",
        "assignedDeveloperId": assignee,
        "assignedDeveloperName": assignee.map(|_| "Dev"),
        "attachments": attachments
    })
}

/// Wire form of a listing row.
#[must_use]
pub fn list_item_json(id: i64) -> Value {
    json!({
        "id": id,
        "title": format!("Bug {id}"),
        "severity": 2,
        "status": 1,
        "createdAt": "2024-01-01T00:00:00Z",
        "reporterName": "Ada Byron",
        "attachmentCount": 0
    })
}

/// Wire form of a single-page listing.
#[must_use]
pub fn page_json(ids: &[i64]) -> Value {
    let items: Vec<Value> = ids.iter().copied().map(list_item_json).collect();
    json!({
        "items": items,
        "pageNumber": 1,
        "pageSize": 10,
        "totalCount": ids.len(),
        "totalPages": 1
    })
}

/// Wire form of an attachment.
#[must_use]
pub fn attachment_json(id: i64, file_name: &str) -> Value {
    json!({
        "id": id,
        "fileName": file_name,
        "contentType": "application/octet-stream",
        "fileSize": 3,
        "uploadedAt": "2024-01-01T00:00:00Z"
    })
}
