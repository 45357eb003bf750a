//! Integration tests for role-gated navigation.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use bugdesk_client::guard::GuardDecision;
use bugdesk_client::views::View;
use bugdesk_core::BugId;
use bugdesk_integration_tests::TestContext;

fn landing() -> GuardDecision {
    GuardDecision::Forbidden {
        redirect_to: "/dashboard".to_string(),
    }
}

#[tokio::test]
async fn test_user_is_sent_to_dashboard_from_developer_views() {
    let ctx = TestContext::new().await;
    ctx.sign_in_as("User").await;
    let state = ctx.app.session().snapshot();
    let guard = ctx.app.guard();

    assert_eq!(guard.evaluate_view(&state, View::AssignedBugs), landing());
    assert_eq!(guard.evaluate_view(&state, View::UnassignedBugs), landing());
    assert_eq!(
        guard.evaluate_view(&state, View::MyBugs),
        GuardDecision::Authorized
    );
    assert_eq!(
        guard.evaluate_view(&state, View::EditBug(BugId::new(3))),
        GuardDecision::Authorized
    );
}

#[tokio::test]
async fn test_developer_reaches_every_view() {
    let ctx = TestContext::new().await;
    ctx.sign_in_as("Developer").await;
    let state = ctx.app.session().snapshot();

    for path in [
        "/dashboard",
        "/bugs/create",
        "/bugs/5",
        "/bugs/5/edit",
        "/my-bugs",
        "/assigned-bugs",
        "/unassigned-bugs",
    ] {
        let view = View::from_path(path).unwrap();
        assert_eq!(
            ctx.app.guard().evaluate_view(&state, view),
            GuardDecision::Authorized,
            "{path}"
        );
    }
}

#[tokio::test]
async fn test_unknown_role_only_sees_shared_views() {
    let ctx = TestContext::new().await;
    ctx.sign_in_as("Auditor").await;
    let state = ctx.app.session().snapshot();
    let guard = ctx.app.guard();

    assert_eq!(
        guard.evaluate_view(&state, View::BugDetail(BugId::new(1))),
        GuardDecision::Authorized
    );
    assert_eq!(guard.evaluate_view(&state, View::CreateBug), landing());
}

#[tokio::test]
async fn test_mounted_view_follows_logout() {
    let ctx = TestContext::new().await;
    ctx.sign_in_as("Developer").await;

    let view = View::AssignedBugs;
    let mut guarded = ctx.app.guard().watch(
        ctx.app.session().subscribe(),
        view.policy().unwrap(),
        view.path(),
    );
    assert_eq!(guarded.decision(), GuardDecision::Authorized);

    ctx.app.logout();
    let next = tokio::time::timeout(Duration::from_secs(2), guarded.next_decision())
        .await
        .unwrap();
    assert_eq!(
        next,
        Some(GuardDecision::Unauthenticated {
            redirect_to: "/login".to_string(),
            return_to: "/assigned-bugs".to_string(),
        })
    );
}

#[tokio::test]
async fn test_guest_is_sent_to_login_with_return_location() {
    let ctx = TestContext::new().await;
    let decision = ctx
        .app
        .guard()
        .evaluate_view(&ctx.app.session().snapshot(), View::BugDetail(BugId::new(9)));
    assert_eq!(
        decision,
        GuardDecision::Unauthenticated {
            redirect_to: "/login".to_string(),
            return_to: "/bugs/9".to_string(),
        }
    );
    assert_eq!(
        ctx.app
            .guard()
            .evaluate_view(&ctx.app.session().snapshot(), View::Login),
        GuardDecision::Authorized
    );
}
