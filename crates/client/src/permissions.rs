//! What the signed-in user may do with a bug.

use bugdesk_core::{Bug, User};

/// Actions available on a bug detail view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BugPermissions {
    pub is_developer: bool,
    pub is_reporter: bool,
    pub is_assignee: bool,
}

impl BugPermissions {
    /// Derive permissions for `user` on `bug`. Without a user nothing is allowed.
    #[must_use]
    pub fn for_user(user: Option<&User>, bug: &Bug) -> Self {
        let Some(user) = user else {
            return Self::default();
        };
        Self {
            is_developer: user.is_developer(),
            is_reporter: bug.reporter_id == user.id,
            is_assignee: bug.assigned_developer_id.as_ref() == Some(&user.id),
        }
    }

    /// Developers and the reporter can (re)assign.
    #[must_use]
    pub const fn can_assign(&self) -> bool {
        self.is_developer || self.is_reporter
    }

    /// Only the assigned developer moves a bug through its lifecycle.
    #[must_use]
    pub const fn can_update_status(&self) -> bool {
        self.is_developer && self.is_assignee
    }

    /// The reporter and the assignee can edit.
    #[must_use]
    pub const fn can_edit(&self) -> bool {
        self.is_reporter || self.is_assignee
    }

    /// An unassigned bug can be picked up by a developer.
    #[must_use]
    pub fn can_self_assign(&self, bug: &Bug) -> bool {
        self.is_developer && bug.assigned_developer_id.is_none()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bugdesk_core::{BugId, BugStatus, Email, Role, Severity, UserId};

    fn user(id: &str, role: Role) -> User {
        User {
            id: UserId::new(id),
            email: Email::parse("x@y.com").unwrap(),
            full_name: id.to_string(),
            role,
        }
    }

    fn bug(assignee: Option<&str>) -> Bug {
        Bug {
            id: BugId::new(1),
            title: "Crash".to_string(),
            description: "Crashes on save".to_string(),
            severity: Severity::High,
            status: BugStatus::Open,
            reproduction_steps: None,
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: None,
            reporter_id: UserId::new("reporter"),
            reporter_name: "Reporter".to_string(),
            reporter_email: "r@y.com".to_string(),
            assigned_developer_id: assignee.map(UserId::new),
            assigned_developer_name: None,
            assigned_developer_email: None,
            attachments: std::sync::Arc::from([]),
        }
    }

    #[test]
    fn test_reporter() {
        let perms = BugPermissions::for_user(Some(&user("reporter", Role::User)), &bug(None));
        assert!(perms.can_assign());
        assert!(perms.can_edit());
        assert!(!perms.can_update_status());
    }

    #[test]
    fn test_assigned_developer() {
        let bug = bug(Some("dev"));
        let perms = BugPermissions::for_user(Some(&user("dev", Role::Developer)), &bug);
        assert!(perms.can_assign());
        assert!(perms.can_edit());
        assert!(perms.can_update_status());
        assert!(!perms.can_self_assign(&bug));
    }

    #[test]
    fn test_other_developer() {
        let bug = bug(None);
        let perms = BugPermissions::for_user(Some(&user("dev2", Role::Developer)), &bug);
        assert!(perms.can_assign());
        assert!(!perms.can_edit());
        assert!(!perms.can_update_status());
        assert!(perms.can_self_assign(&bug));
    }

    #[test]
    fn test_anonymous() {
        let perms = BugPermissions::for_user(None, &bug(None));
        assert_eq!(perms, BugPermissions::default());
        assert!(!perms.can_assign());
    }
}
