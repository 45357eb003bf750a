//! Integration tests for attachment previews tied to a view's lifetime.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use bugdesk_client::cache::CacheValue;
use bugdesk_client::previews::BlobState;
use bugdesk_core::{Attachment, BugId};
use bugdesk_integration_tests::{TestContext, attachment_json, bug_json};

async fn mount_content(ctx: &TestContext, id: i64, body: &'static [u8], hits: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/attachments/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .expect(hits)
        .mount(&ctx.server)
        .await;
}

async fn load_attachments(ctx: &TestContext, id: i64) -> Arc<[Attachment]> {
    let queries = ctx.app.queries();
    let value = queries.fetch(queries.bug_by_id(BugId::new(id))).await.unwrap();
    Arc::clone(&value.as_bug().unwrap().attachments)
}

#[tokio::test]
async fn test_previews_are_released_with_the_view() {
    let ctx = TestContext::new().await;
    ctx.sign_in_as("User").await;
    let attachments = json!([
        attachment_json(1, "screen.png"),
        attachment_json(2, "trace.txt"),
        attachment_json(3, "photo.JPG"),
    ]);
    Mock::given(method("GET"))
        .and(path("/bugs/8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bug_json(8, None, attachments)))
        .mount(&ctx.server)
        .await;
    mount_content(&ctx, 1, b"png", 1).await;
    mount_content(&ctx, 2, b"txt", 0).await;
    mount_content(&ctx, 3, b"jpg", 1).await;

    let list = load_attachments(&ctx, 8).await;
    let scope = ctx.app.scope("bug-detail");
    let previews = ctx.app.previews();
    let mut changes = previews.subscribe();

    previews.sync(Arc::clone(&list));
    previews.sync(Arc::clone(&list));
    tokio::time::timeout(
        Duration::from_secs(2),
        changes.wait_for(|handles| {
            handles.len() == 2 && handles.values().all(|h| h.state == BlobState::Ready)
        }),
    )
    .await
    .unwrap()
    .unwrap();

    let registry = ctx.app.blob_registry();
    assert_eq!(registry.live_count(), 2);
    assert_eq!(
        previews.content(bugdesk_core::AttachmentId::new(1)).as_deref(),
        Some(&b"png"[..])
    );

    scope.hold(previews);
    scope.close();
    assert_eq!(registry.live_count(), 0);
}

#[tokio::test]
async fn test_failed_preview_does_not_block_others() {
    let ctx = TestContext::new().await;
    ctx.sign_in_as("User").await;
    let attachments = json!([attachment_json(4, "a.png"), attachment_json(5, "b.gif")]);
    Mock::given(method("GET"))
        .and(path("/bugs/12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bug_json(12, None, attachments)))
        .mount(&ctx.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/attachments/4"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&ctx.server)
        .await;
    mount_content(&ctx, 5, b"gif", 1).await;

    let list = load_attachments(&ctx, 12).await;
    let previews = ctx.app.previews();
    let mut changes = previews.subscribe();
    previews.sync(list);

    tokio::time::timeout(
        Duration::from_secs(2),
        changes.wait_for(|handles| {
            handles.len() == 2 && handles.values().all(|h| h.state != BlobState::Loading)
        }),
    )
    .await
    .unwrap()
    .unwrap();

    let handles = previews.handles();
    assert_eq!(handles.len(), 2);
    assert_eq!(handles[0].state, BlobState::Failed);
    assert!(handles[0].local_url.is_none());
    assert_eq!(handles[1].state, BlobState::Ready);
    assert!(ctx.app.session().is_authenticated());

    drop(previews);
    assert_eq!(ctx.app.blob_registry().live_count(), 0);
}

#[tokio::test]
async fn test_rendering_cached_bug_again_keeps_previews() {
    let ctx = TestContext::new().await;
    ctx.sign_in_as("User").await;
    let attachments = json!([attachment_json(6, "shot.png")]);
    Mock::given(method("GET"))
        .and(path("/bugs/20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bug_json(20, None, attachments)))
        .expect(1)
        .mount(&ctx.server)
        .await;
    mount_content(&ctx, 6, b"png", 1).await;

    let queries = ctx.app.queries();
    queries.fetch(queries.bug_by_id(BugId::new(20))).await.unwrap();

    let previews = ctx.app.previews();
    let mut changes = previews.subscribe();
    for _ in 0..3 {
        let entry = queries.load(queries.bug_by_id(BugId::new(20))).await;
        let bug = entry.data.as_ref().and_then(CacheValue::as_bug).unwrap();
        previews.sync(Arc::clone(&bug.attachments));
    }

    tokio::time::timeout(
        Duration::from_secs(2),
        changes.wait_for(|handles| handles.values().all(|h| h.state == BlobState::Ready)),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(ctx.app.blob_registry().live_count(), 1);
}
