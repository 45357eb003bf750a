//! Integration tests for switching accounts while reads and writes are in flight.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

use bugdesk_client::cache::QueryStatus;
use bugdesk_client::mutations::{Mutation, MutationOutcome};
use bugdesk_core::{BugId, Email, LoginDto};
use bugdesk_integration_tests::{TestContext, bug_json, page_json, user_json};

async fn sign_in_second_account(ctx: &TestContext) {
    ctx.mount_login("b@b.com", "hunter2", "t2", user_json("u2", "b@b.com", "User"))
        .await;
    let credentials = LoginDto {
        email: Email::parse("b@b.com").unwrap(),
        password: "hunter2".to_string(),
    };
    ctx.app.session().login(&credentials).await.unwrap();
}

fn ids(value: &bugdesk_client::cache::CacheValue) -> Vec<i64> {
    value
        .as_bug_page()
        .unwrap()
        .items
        .iter()
        .map(|item| item.id.as_i64())
        .collect()
}

#[tokio::test]
async fn test_late_rejection_does_not_sign_out_next_account() {
    let ctx = TestContext::new().await;
    ctx.sign_in_as("User").await;
    Mock::given(method("GET"))
        .and(path("/users/developers"))
        .and(header("authorization", "Bearer t1"))
        .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let queries = ctx.app.queries().clone();
    let slow = tokio::spawn(async move { queries.fetch(queries.developers()).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    ctx.app.logout();
    sign_in_second_account(&ctx).await;

    let err = slow.await.unwrap().unwrap_err();
    assert!(err.is_auth());
    let session = ctx.app.session();
    assert!(session.is_authenticated());
    assert_eq!(session.current_user().unwrap().id.as_str(), "u2");

    let restarted = ctx.restart();
    assert_eq!(
        restarted.session().current_user().unwrap().id.as_str(),
        "u2"
    );
}

#[tokio::test]
async fn test_late_write_rejection_does_not_sign_out_next_account() {
    let ctx = TestContext::new().await;
    ctx.sign_in_as("Developer").await;
    Mock::given(method("PATCH"))
        .and(path("/bugs/4/unassign"))
        .and(header("authorization", "Bearer t1"))
        .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(300)))
        .mount(&ctx.server)
        .await;

    let site = ctx.app.mutation_site();
    let (outcome, ()) = tokio::join!(site.execute(Mutation::UnassignBug(BugId::new(4))), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        ctx.app.logout();
        sign_in_second_account(&ctx).await;
    });

    assert!(matches!(outcome, MutationOutcome::Failed(ref e) if e.source.is_auth()));
    assert_eq!(
        ctx.app.session().current_user().unwrap().id.as_str(),
        "u2"
    );
}

#[tokio::test]
async fn test_expired_account_reads_are_not_served_to_next_account() {
    let ctx = TestContext::new().await;
    ctx.sign_in_as("User").await;
    Mock::given(method("GET"))
        .and(path("/bugs/my-bugs"))
        .and(header("authorization", "Bearer t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json(&[1, 2, 3])))
        .expect(1)
        .mount(&ctx.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bugs/my-bugs"))
        .and(header("authorization", "Bearer t2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json(&[99])))
        .expect(1)
        .mount(&ctx.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&ctx.server)
        .await;

    let queries = ctx.app.queries();
    let page = ctx.app.first_page();
    let first = queries.fetch(queries.my_bugs(page)).await.unwrap();
    assert_eq!(ids(&first), vec![1, 2, 3]);

    assert!(ctx.app.session().refresh_current_user().await.is_err());
    assert!(!ctx.app.session().is_authenticated());
    sign_in_second_account(&ctx).await;

    let entry = queries.load(queries.my_bugs(page)).await;
    assert_eq!(entry.status, QueryStatus::Loading);
    assert!(entry.server_data().is_none());

    let second = queries.fetch(queries.my_bugs(page)).await.unwrap();
    assert_eq!(ids(&second), vec![99]);
}

#[tokio::test]
async fn test_write_finishing_after_account_switch_leaves_new_cache_alone() {
    let ctx = TestContext::new().await;
    ctx.sign_in_as("User").await;
    Mock::given(method("PATCH"))
        .and(path("/bugs/6/status"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(bug_json(6, None, json!([])))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&ctx.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bugs/my-bugs"))
        .and(header("authorization", "Bearer t2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json(&[99])))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let queries = ctx.app.queries();
    let page = ctx.app.first_page();
    let mutations = ctx.app.mutations().clone();
    let write = tokio::spawn(async move {
        mutations
            .execute(Mutation::UpdateBugStatus {
                id: BugId::new(6),
                status: bugdesk_core::BugStatus::Resolved,
            })
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    ctx.app.logout();
    sign_in_second_account(&ctx).await;
    queries.fetch(queries.my_bugs(page)).await.unwrap();

    write.await.unwrap().unwrap();
    let mine = queries.load(queries.my_bugs(page)).await;
    assert_eq!(mine.status, QueryStatus::Success);
    assert!(!mine.is_stale);
}
