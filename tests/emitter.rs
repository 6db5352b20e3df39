use std::time::Duration;

use httpmock::MockServer;
use revalidator::application::emitter::{ChangeEmitter, EmitError};
use revalidator::config::RevalidateSettings;
use revalidator::domain::changes::{ChangeDescriptor, ContentDocument, EntityType, Operation};
use revalidator_api_types::SECRET_HEADER;
use url::Url;

const SECRET: &str = "emit-secret";

fn settings(site_url: &str) -> RevalidateSettings {
    RevalidateSettings {
        secret: Some(SECRET.to_string()),
        site_url: Some(Url::parse(site_url).expect("site url")),
        endpoint_path: "/api/revalidate".to_string(),
        request_timeout: Duration::from_secs(5),
    }
}

fn post_change(slug: &str, operation: Operation) -> ChangeDescriptor {
    ChangeDescriptor::new(EntityType::Post, slug, operation).expect("valid descriptor")
}

#[tokio::test]
async fn deliver_sends_secret_and_descriptor() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method("POST")
                .path("/api/revalidate")
                .header(SECRET_HEADER, SECRET)
                .json_body_includes(
                    r#"{"collection":"post","slug":"hello-world","operation":"delete"}"#,
                );
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    r#"{"revalidated":true,"paths":["/posts/hello-world","/posts"],"collection":"post","slug":"hello-world","operation":"delete","timestamp":"2026-01-01T00:00:00Z"}"#,
                );
        })
        .await;

    let emitter = ChangeEmitter::new(&settings(&server.base_url())).expect("emitter");
    let delivery = emitter
        .deliver(&post_change("hello-world", Operation::Delete))
        .await
        .expect("delivery succeeds");

    mock.assert_async().await;
    assert_eq!(delivery.status, 200);
    assert!(!delivery.is_partial());
    assert_eq!(delivery.revalidated, vec!["/posts/hello-world", "/posts"]);
}

#[tokio::test]
async fn deliver_posts_under_site_sub_path() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method("POST").path("/school/api/revalidate");
            then.status(200).body("{}");
        })
        .await;

    let site = format!("{}/school", server.base_url());
    let emitter = ChangeEmitter::new(&settings(&site)).expect("emitter");
    let delivery = emitter
        .deliver(&post_change("a", Operation::Update))
        .await
        .expect("delivery succeeds");

    mock.assert_async().await;
    assert_eq!(delivery.status, 200);
}

#[tokio::test]
async fn partial_response_is_reported() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("POST").path("/api/revalidate");
            then.status(207)
                .header("content-type", "application/json")
                .body(
                    r#"{"message":"Some paths failed to revalidate","failed":[{"path":"/posts","success":false,"error":"boom"}],"revalidated":["/posts/a"]}"#,
                );
        })
        .await;

    let emitter = ChangeEmitter::new(&settings(&server.base_url())).expect("emitter");
    let delivery = emitter
        .deliver(&post_change("a", Operation::Update))
        .await
        .expect("delivery succeeds");

    assert!(delivery.is_partial());
    assert_eq!(delivery.failed.len(), 1);
    assert_eq!(delivery.failed[0].error.as_deref(), Some("boom"));
}

#[tokio::test]
async fn rejected_delivery_is_an_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("POST").path("/api/revalidate");
            then.status(401).body(r#"{"message":"Invalid token"}"#);
        })
        .await;

    let emitter = ChangeEmitter::new(&settings(&server.base_url())).expect("emitter");
    let err = emitter
        .deliver(&post_change("a", Operation::Update))
        .await
        .expect_err("401 is an error");

    match err {
        EmitError::Status { status, body } => {
            assert_eq!(status, 401);
            assert!(body.contains("Invalid token"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn unreachable_invalidator_is_a_transport_error() {
    let emitter = ChangeEmitter::new(&settings("http://127.0.0.1:1")).expect("emitter");
    let err = emitter
        .deliver(&post_change("a", Operation::Update))
        .await
        .expect_err("connection refused");

    assert!(matches!(err, EmitError::Transport(_)));
}

#[tokio::test]
async fn notify_delivers_on_a_detached_task() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method("POST")
                .path("/api/revalidate")
                .json_body_includes(r#"{"collection":"header","slug":"header"}"#);
            then.status(200).body("{}");
        })
        .await;

    let emitter = ChangeEmitter::new(&settings(&server.base_url())).expect("emitter");
    let change = ChangeDescriptor::for_global(EntityType::Header).expect("global descriptor");

    let handle = emitter.notify(change).expect("task spawned");
    handle.await.expect("task completes");

    mock.assert_async().await;
}

#[tokio::test]
async fn failed_notify_does_not_surface() {
    let emitter = ChangeEmitter::new(&settings("http://127.0.0.1:1")).expect("emitter");
    let handle = emitter
        .notify(post_change("a", Operation::Update))
        .expect("task spawned");

    assert!(handle.await.is_ok());
}

#[tokio::test]
async fn after_change_returns_document_unchanged() {
    let emitter = ChangeEmitter::new(&settings("http://127.0.0.1:1")).expect("emitter");

    let with_slug = ContentDocument::new("42", Some("hello-world".to_string()));
    let returned = emitter.after_change(EntityType::Post, with_slug.clone(), Operation::Update);
    assert_eq!(returned, with_slug);

    let without_slug = ContentDocument::new("42", None);
    let returned = emitter.after_change(EntityType::Page, without_slug.clone(), Operation::Delete);
    assert_eq!(returned, without_slug);

    let footer = emitter.after_global_change(EntityType::Footer, "footer body");
    assert_eq!(footer, "footer body");
}

#[tokio::test]
async fn unconfigured_emitter_hook_returns_document() {
    let emitter = ChangeEmitter::new(&RevalidateSettings {
        secret: None,
        site_url: None,
        endpoint_path: "/api/revalidate".to_string(),
        request_timeout: Duration::from_secs(1),
    })
    .expect("emitter");
    assert!(!emitter.is_enabled());

    let doc = ContentDocument::new("7", Some("about".to_string()));
    let returned = emitter.after_change(EntityType::Page, doc.clone(), Operation::Update);
    assert_eq!(returned, doc);
}
