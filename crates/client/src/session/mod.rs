//! Authentication session lifecycle.
//!
//! [`SessionStore`] is the single writer of the session. It restores the
//! session from [`SessionStorage`] at startup without contacting the server
//! (the token is trusted until a request is rejected), installs new sessions
//! on login or registration, and clears them on logout or expiry.
//!
//! State changes are published on a `watch` channel; the access guard and
//! any view that depends on the signed-in user subscribe to it.
//!
//! Every install or clear starts a new [`SessionGeneration`]. Requests
//! capture the generation they were sent under, and a rejected token only
//! expires the session when that generation is still current.

mod storage;

pub use storage::{FileStorage, MemoryStorage, SessionStorage, StorageError, keys};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use bugdesk_core::{AuthResponse, LoginDto, RegisterDto, User};

use crate::api::ApiClient;
use crate::error::ClientError;

/// An authenticated session. The token and the user always exist together.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub token: SecretString,
    /// Expiry reported at login, informational only.
    pub expiration: Option<String>,
}

/// Published session state.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session: Option<Session>,
    /// True until [`SessionStore::bootstrap`] has run.
    pub is_loading: bool,
}

impl SessionState {
    /// Whether a session is installed.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    /// The signed-in user, if any.
    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().map(|s| &s.user)
    }
}

/// Identifies one installed (or cleared) session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionGeneration(u64);

impl fmt::Display for SessionGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Called after the signed-in identity changes, with the new user if any.
pub type IdentityHook = Box<dyn Fn(Option<&User>) + Send + Sync>;

// =============================================================================
// SessionStore
// =============================================================================

/// Owner of the authentication session.
///
/// Cheaply cloneable; clones share the same state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

struct SessionStoreInner {
    api: ApiClient,
    storage: Arc<dyn SessionStorage>,
    state: watch::Sender<SessionState>,
    generation: AtomicU64,
    hooks: Mutex<Vec<IdentityHook>>,
}

impl SessionStore {
    /// Create a store in the loading state. Call [`bootstrap`](Self::bootstrap) next.
    #[must_use]
    pub fn new(api: ApiClient, storage: Arc<dyn SessionStorage>) -> Self {
        let (state, _) = watch::channel(SessionState {
            session: None,
            is_loading: true,
        });
        Self {
            inner: Arc::new(SessionStoreInner {
                api,
                storage,
                state,
                generation: AtomicU64::new(0),
                hooks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Restore the persisted session.
    ///
    /// Makes no network call. A missing, partial or unreadable pair of
    /// entries yields the unauthenticated state; partial pairs are removed.
    /// Running it again re-reads storage and yields the same session.
    #[instrument(skip(self))]
    pub fn bootstrap(&self) {
        let session = self.restore();
        match &session {
            Some(session) => {
                self.inner.api.set_token(session.token.clone());
                info!(user_id = %session.user.id, "Restored session");
            }
            None => self.inner.api.clear_token(),
        }
        let previous = self.inner.state.send_replace(SessionState {
            session,
            is_loading: false,
        });
        let current = self.current_user();
        if previous.user().map(|u| &u.id) != current.as_ref().map(|u| &u.id) {
            self.advance(current.as_ref());
        }
    }

    fn restore(&self) -> Option<Session> {
        let storage = &self.inner.storage;
        let read = storage
            .get(keys::TOKEN)
            .and_then(|token| Ok((token, storage.get(keys::USER)?)));

        let (token, user) = match read {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "Could not read persisted session");
                return None;
            }
        };

        match (token, user) {
            (None, None) => None,
            (Some(token), Some(user)) => match serde_json::from_str::<User>(&user) {
                Ok(user) => Some(Session {
                    user,
                    token: SecretString::from(token),
                    expiration: None,
                }),
                Err(e) => {
                    warn!(error = %e, "Persisted user is unreadable, discarding session");
                    self.clear_storage();
                    None
                }
            },
            _ => {
                warn!("Persisted session is incomplete, discarding it");
                self.clear_storage();
                None
            }
        }
    }

    /// Authenticate with credentials and install the session.
    ///
    /// # Errors
    ///
    /// Returns the remote error; the current state is left untouched.
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn login(&self, credentials: &LoginDto) -> Result<User, ClientError> {
        let response = self.inner.api.login(credentials).await?;
        Ok(self.install(response))
    }

    /// Create an account and install its session.
    ///
    /// # Errors
    ///
    /// Returns the remote error; the current state is left untouched.
    #[instrument(skip(self, details), fields(email = %details.email))]
    pub async fn register(&self, details: &RegisterDto) -> Result<User, ClientError> {
        let response = self.inner.api.register(details).await?;
        Ok(self.install(response))
    }

    fn install(&self, response: AuthResponse) -> User {
        let session = Session {
            user: response.user,
            token: SecretString::from(response.token),
            expiration: response.expiration,
        };

        self.persist_token(&session.token);
        self.persist_user(&session.user);
        self.inner.api.set_token(session.token.clone());

        let user = session.user.clone();
        info!(user_id = %user.id, role = %user.role, "Signed in");
        self.inner.state.send_replace(SessionState {
            session: Some(session),
            is_loading: false,
        });
        self.advance(Some(&user));
        user
    }

    /// Start a new generation and notify identity hooks.
    fn advance(&self, user: Option<&User>) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation, "Session identity changed");
        let hooks = self.inner.hooks.lock().unwrap_or_else(PoisonError::into_inner);
        for hook in hooks.iter() {
            hook(user);
        }
    }

    /// Run `hook` after every sign-in, sign-out or expiry.
    pub fn on_identity_change<F>(&self, hook: F)
    where
        F: Fn(Option<&User>) + Send + Sync + 'static,
    {
        self.inner
            .hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(hook));
    }

    /// The current generation. Capture it before sending a request.
    #[must_use]
    pub fn generation(&self) -> SessionGeneration {
        SessionGeneration(self.inner.generation.load(Ordering::SeqCst))
    }

    /// Refresh the user snapshot from `GET /auth/me`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotAuthenticated` without a session, or when
    /// the session changed while the request was running. An authentication
    /// failure also expires the session.
    #[instrument(skip(self))]
    pub async fn refresh_current_user(&self) -> Result<User, ClientError> {
        if !self.is_authenticated() {
            return Err(ClientError::NotAuthenticated);
        }

        let generation = self.generation();
        let user = match self.inner.api.current_user().await {
            Ok(user) => user,
            Err(e) => {
                self.observe_error(&e, generation);
                return Err(e);
            }
        };

        if self.generation() != generation {
            debug!(%generation, "Session changed during refresh, discarding user");
            return Err(ClientError::NotAuthenticated);
        }
        self.persist_user(&user);
        self.inner.state.send_modify(|state| {
            if let Some(session) = state.session.as_mut() {
                session.user = user.clone();
            }
        });
        Ok(user)
    }

    /// Sign out. Clears persisted and in-memory state; never fails.
    #[instrument(skip(self))]
    pub fn logout(&self) {
        self.clear();
        info!("Signed out");
    }

    /// Drop a session whose token the server rejected.
    pub fn expire(&self) {
        if self.is_authenticated() {
            self.clear();
            info!("Session expired");
        }
    }

    /// Expire the session if `error` means its token was rejected.
    ///
    /// `sent_under` is the generation captured before the request; a
    /// rejection of an earlier session's token changes nothing.
    pub fn observe_error(&self, error: &ClientError, sent_under: SessionGeneration) {
        if !matches!(error, ClientError::Auth(_)) {
            return;
        }
        if sent_under == self.generation() {
            self.expire();
        } else {
            debug!(%sent_under, "Ignoring rejection of a replaced session");
        }
    }

    fn clear(&self) {
        self.clear_storage();
        self.inner.api.clear_token();
        self.inner.state.send_replace(SessionState {
            session: None,
            is_loading: false,
        });
        self.advance(None);
    }

    fn clear_storage(&self) {
        for key in [keys::TOKEN, keys::USER] {
            if let Err(e) = self.inner.storage.remove(key) {
                warn!(key, error = %e, "Failed to remove persisted session entry");
            }
        }
    }

    fn persist_token(&self, token: &SecretString) {
        if let Err(e) = self.inner.storage.set(keys::TOKEN, token.expose_secret()) {
            warn!(error = %e, "Failed to persist session token");
        }
    }

    fn persist_user(&self, user: &User) {
        let result = serde_json::to_string(user)
            .map_err(StorageError::from)
            .and_then(|json| self.inner.storage.set(keys::USER, &json));
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist session user");
        }
    }

    /// Watch session changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Current session state.
    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Whether a session is installed.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    /// The signed-in user, if any.
    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.inner.state.borrow().user().cloned()
    }
}
