//! Role-gated access to protected views.
//!
//! The guard is a pure function of the session state, the view's policy and
//! the requested location:
//!
//! ```text
//! is_loading            -> Loading        (show a placeholder, no redirect)
//! no session            -> Unauthenticated(redirect to login, remember location)
//! role not whitelisted  -> Forbidden      (redirect to landing, never login)
//! otherwise             -> Authorized
//! ```
//!
//! [`GuardedView`] re-evaluates on every session change so a logout while a
//! view is open immediately leaves `Authorized`.

use tokio::sync::watch;

use crate::error::ClientError;
use crate::session::SessionState;
use crate::views::{LANDING_PATH, LOGIN_PATH, View, ViewPolicy};

/// Outcome of evaluating a protected view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session restoration has not finished.
    Loading,
    /// Render the view.
    Authorized,
    /// Go to the login view; return to `return_to` after signing in.
    Unauthenticated { redirect_to: String, return_to: String },
    /// Signed in with a role the view does not admit.
    Forbidden { redirect_to: String },
}

impl GuardDecision {
    /// Redirect target, if the decision is a redirect.
    #[must_use]
    pub fn redirect(&self) -> Option<&str> {
        match self {
            Self::Unauthenticated { redirect_to, .. } | Self::Forbidden { redirect_to } => {
                Some(redirect_to)
            }
            Self::Loading | Self::Authorized => None,
        }
    }
}

/// Evaluates view policies against the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGuard {
    login_path: String,
    landing_path: String,
}

impl Default for AccessGuard {
    fn default() -> Self {
        Self::new(LOGIN_PATH, LANDING_PATH)
    }
}

impl AccessGuard {
    #[must_use]
    pub fn new(login_path: impl Into<String>, landing_path: impl Into<String>) -> Self {
        Self {
            login_path: login_path.into(),
            landing_path: landing_path.into(),
        }
    }

    /// Decide whether a view at `location` may render.
    #[must_use]
    pub fn evaluate(&self, state: &SessionState, policy: &ViewPolicy, location: &str) -> GuardDecision {
        if state.is_loading {
            return GuardDecision::Loading;
        }
        let Some(session) = &state.session else {
            return GuardDecision::Unauthenticated {
                redirect_to: self.login_path.clone(),
                return_to: location.to_string(),
            };
        };
        if policy.admits(&session.user.role) {
            GuardDecision::Authorized
        } else {
            GuardDecision::Forbidden {
                redirect_to: self.landing_path.clone(),
            }
        }
    }

    /// Decide for a catalogued view. Public views are always authorized.
    #[must_use]
    pub fn evaluate_view(&self, state: &SessionState, view: View) -> GuardDecision {
        self.evaluate_at(state, view, &view.path())
    }

    /// Decide for a requested location such as `/bugs/7?tab=files`.
    ///
    /// The whole location, query and fragment included, is kept as the
    /// return target. Returns `None` for a location that names no view.
    #[must_use]
    pub fn evaluate_location(&self, state: &SessionState, location: &str) -> Option<GuardDecision> {
        let view = View::from_path(location)?;
        Some(self.evaluate_at(state, view, location))
    }

    fn evaluate_at(&self, state: &SessionState, view: View, location: &str) -> GuardDecision {
        match view.policy() {
            Some(policy) => self.evaluate(state, &policy, location),
            None => GuardDecision::Authorized,
        }
    }

    /// Redirect implied by a failed request made from a view at `location`.
    ///
    /// Forbidden responses redirect to the landing view; rejected tokens to
    /// login. Other errors are handled at the call site.
    #[must_use]
    pub fn on_error(&self, error: &ClientError, location: &str) -> Option<GuardDecision> {
        match error {
            ClientError::Forbidden(_) => Some(GuardDecision::Forbidden {
                redirect_to: self.landing_path.clone(),
            }),
            ClientError::Auth(_) | ClientError::NotAuthenticated => {
                Some(GuardDecision::Unauthenticated {
                    redirect_to: self.login_path.clone(),
                    return_to: location.to_string(),
                })
            }
            _ => None,
        }
    }

    /// Follow a view reactively as the session changes.
    #[must_use]
    pub fn watch(
        &self,
        sessions: watch::Receiver<SessionState>,
        policy: ViewPolicy,
        location: impl Into<String>,
    ) -> GuardedView {
        GuardedView {
            guard: self.clone(),
            sessions,
            policy,
            location: location.into(),
        }
    }
}

/// A mounted protected view, re-evaluated on session and route changes.
#[derive(Debug)]
pub struct GuardedView {
    guard: AccessGuard,
    sessions: watch::Receiver<SessionState>,
    policy: ViewPolicy,
    location: String,
}

impl GuardedView {
    /// Decision for the current session and location.
    #[must_use]
    pub fn decision(&self) -> GuardDecision {
        self.guard
            .evaluate(&self.sessions.borrow(), &self.policy, &self.location)
    }

    /// Navigate to another location under another policy.
    pub fn navigate(&mut self, policy: ViewPolicy, location: impl Into<String>) -> GuardDecision {
        self.policy = policy;
        self.location = location.into();
        self.decision()
    }

    /// Wait for the next session change and return the new decision.
    ///
    /// Returns `None` once the session store is gone.
    pub async fn next_decision(&mut self) -> Option<GuardDecision> {
        self.sessions.changed().await.ok()?;
        let state = self.sessions.borrow_and_update().clone();
        Some(self.guard.evaluate(&state, &self.policy, &self.location))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::session::Session;
    use bugdesk_core::{Email, Role, User, UserId};
    use secrecy::SecretString;

    fn state(role: Option<Role>) -> SessionState {
        SessionState {
            session: role.map(|role| Session {
                user: User {
                    id: UserId::new("u1"),
                    email: Email::parse("a@b.com").unwrap(),
                    full_name: "Ada".to_string(),
                    role,
                },
                token: SecretString::from("t1"),
                expiration: None,
            }),
            is_loading: false,
        }
    }

    #[test]
    fn test_loading_never_redirects() {
        let guard = AccessGuard::default();
        let loading = SessionState {
            session: None,
            is_loading: true,
        };
        let decision = guard.evaluate(&loading, &ViewPolicy::authenticated(), "/dashboard");
        assert_eq!(decision, GuardDecision::Loading);
        assert_eq!(decision.redirect(), None);
    }

    #[test]
    fn test_unauthenticated_redirects_to_login_with_return() {
        let guard = AccessGuard::default();
        let decision = guard.evaluate_view(&state(None), View::BugDetail(bugdesk_core::BugId::new(7)));
        assert_eq!(
            decision,
            GuardDecision::Unauthenticated {
                redirect_to: "/login".to_string(),
                return_to: "/bugs/7".to_string(),
            }
        );
    }

    #[test]
    fn test_return_target_keeps_query_and_fragment() {
        let guard = AccessGuard::default();
        let decision = guard
            .evaluate_location(&state(None), "/bugs/7?tab=files#shot")
            .unwrap();
        assert_eq!(
            decision,
            GuardDecision::Unauthenticated {
                redirect_to: "/login".to_string(),
                return_to: "/bugs/7?tab=files#shot".to_string(),
            }
        );
        assert_eq!(guard.evaluate_location(&state(None), "/nowhere"), None);
        assert_eq!(
            guard.evaluate_location(&state(Some(Role::User)), "/my-bugs?page=2"),
            Some(GuardDecision::Authorized)
        );
    }

    #[test]
    fn test_wrong_role_redirects_to_landing_not_login() {
        let guard = AccessGuard::default();
        let decision = guard.evaluate_view(&state(Some(Role::User)), View::AssignedBugs);
        assert_eq!(decision.redirect(), Some("/dashboard"));
        assert!(matches!(decision, GuardDecision::Forbidden { .. }));
    }

    #[test]
    fn test_authorized() {
        let guard = AccessGuard::default();
        assert_eq!(
            guard.evaluate_view(&state(Some(Role::Developer)), View::UnassignedBugs),
            GuardDecision::Authorized
        );
        assert_eq!(
            guard.evaluate_view(&state(None), View::Login),
            GuardDecision::Authorized
        );
    }

    #[test]
    fn test_forbidden_response_redirects_to_landing() {
        let guard = AccessGuard::default();
        let decision = guard
            .on_error(&ClientError::Forbidden(String::new()), "/bugs/3")
            .unwrap();
        assert_eq!(decision.redirect(), Some("/dashboard"));
        assert_eq!(
            guard.on_error(&ClientError::Network("down".to_string()), "/bugs/3"),
            None
        );
    }

    #[tokio::test]
    async fn test_logout_while_mounted_leaves_authorized() {
        let (tx, rx) = watch::channel(state(Some(Role::User)));
        let mut view = AccessGuard::default().watch(rx, ViewPolicy::authenticated(), "/my-bugs");
        assert_eq!(view.decision(), GuardDecision::Authorized);

        tx.send_replace(state(None));
        let next = view.next_decision().await.unwrap();
        assert!(matches!(next, GuardDecision::Unauthenticated { ref return_to, .. } if return_to == "/my-bugs"));

        drop(tx);
        assert_eq!(view.next_decision().await, None);
    }
}
