//! Catalogue of client views, their locations and access policies.

use std::fmt;

use bugdesk_core::{BugId, Role};

/// Location of the sign-in view.
pub const LOGIN_PATH: &str = "/login";

/// Default landing view for signed-in users.
pub const LANDING_PATH: &str = "/dashboard";

/// Who may open a protected view.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViewPolicy {
    /// Roles allowed in; `None` admits every signed-in user.
    pub allowed_roles: Option<Vec<Role>>,
}

impl ViewPolicy {
    /// Any signed-in user.
    #[must_use]
    pub const fn authenticated() -> Self {
        Self {
            allowed_roles: None,
        }
    }

    /// Only users whose role is listed.
    #[must_use]
    pub fn roles(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            allowed_roles: Some(roles.into_iter().collect()),
        }
    }

    /// Whether `role` passes the whitelist.
    #[must_use]
    pub fn admits(&self, role: &Role) -> bool {
        self.allowed_roles
            .as_ref()
            .is_none_or(|roles| roles.contains(role))
    }
}

/// Navigable views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Login,
    Register,
    Dashboard,
    CreateBug,
    BugDetail(BugId),
    EditBug(BugId),
    MyBugs,
    AssignedBugs,
    UnassignedBugs,
}

impl View {
    /// Location of the view.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Login => LOGIN_PATH.to_string(),
            Self::Register => "/register".to_string(),
            Self::Dashboard => LANDING_PATH.to_string(),
            Self::CreateBug => "/bugs/create".to_string(),
            Self::BugDetail(id) => format!("/bugs/{id}"),
            Self::EditBug(id) => format!("/bugs/{id}/edit"),
            Self::MyBugs => "/my-bugs".to_string(),
            Self::AssignedBugs => "/assigned-bugs".to_string(),
            Self::UnassignedBugs => "/unassigned-bugs".to_string(),
        }
    }

    /// Access policy, or `None` for public views.
    #[must_use]
    pub fn policy(&self) -> Option<ViewPolicy> {
        match self {
            Self::Login | Self::Register => None,
            Self::Dashboard | Self::BugDetail(_) => Some(ViewPolicy::authenticated()),
            Self::CreateBug | Self::EditBug(_) | Self::MyBugs => {
                Some(ViewPolicy::roles([Role::User, Role::Developer]))
            }
            Self::AssignedBugs | Self::UnassignedBugs => Some(ViewPolicy::roles([Role::Developer])),
        }
    }

    /// Resolve a location to a view. `/` resolves to the landing view.
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [] | ["dashboard"] => Some(Self::Dashboard),
            ["login"] => Some(Self::Login),
            ["register"] => Some(Self::Register),
            ["bugs", "create"] => Some(Self::CreateBug),
            ["bugs", id] => id.parse().ok().map(|id| Self::BugDetail(BugId::new(id))),
            ["bugs", id, "edit"] => id.parse().ok().map(|id| Self::EditBug(BugId::new(id))),
            ["my-bugs"] => Some(Self::MyBugs),
            ["assigned-bugs"] => Some(Self::AssignedBugs),
            ["unassigned-bugs"] => Some(Self::UnassignedBugs),
            _ => None,
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}
