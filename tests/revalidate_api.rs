use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use revalidator::application::invalidator::Invalidator;
use revalidator::cache::{CacheError, RenderCache};
use revalidator::infra::http::{AppState, REQUEST_ID_HEADER, build_router};
use revalidator_api_types::{
    ErrorResponse, HealthResponse, PartialRevalidateResponse, REDIRECTS_PATH, REVALIDATE_PATH,
    RevalidateResponse, SECRET_HEADER, TagRevalidateResponse,
};
use serde::de::DeserializeOwned;
use tower::ServiceExt;

const SECRET: &str = "test-secret";

#[derive(Default)]
struct SpyCache {
    calls: Mutex<Vec<String>>,
    fail_paths: Vec<&'static str>,
    fail_tags: bool,
}

impl SpyCache {
    fn failing_paths(paths: &[&'static str]) -> Self {
        Self {
            fail_paths: paths.to_vec(),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl RenderCache for SpyCache {
    async fn invalidate_path(&self, path: &str) -> Result<(), CacheError> {
        self.calls.lock().expect("calls lock").push(path.to_string());
        if self.fail_paths.contains(&path) {
            return Err(CacheError::Unavailable(format!("cannot strike {path}")));
        }
        Ok(())
    }

    async fn invalidate_tag(&self, tag: &str) -> Result<(), CacheError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(format!("#{tag}"));
        if self.fail_tags {
            return Err(CacheError::rejected(tag, "tag store offline"));
        }
        Ok(())
    }
}

fn app(cache: Arc<SpyCache>, secret: Option<&str>) -> Router {
    let render_cache: Arc<dyn RenderCache> = cache;
    build_router(AppState {
        invalidator: Arc::new(Invalidator::new(render_cache, secret.map(str::to_string))),
        cache: None,
        origin: None,
    })
}

fn post(uri: &str, secret: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(secret) = secret {
        builder = builder.header(SECRET_HEADER, secret);
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

async fn json<T: DeserializeOwned>(response: Response) -> T {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should buffer");
    serde_json::from_slice(&bytes).expect("body should be json")
}

#[tokio::test]
async fn post_update_strikes_detail_and_listings() {
    let cache = Arc::new(SpyCache::default());
    let response = app(cache.clone(), Some(SECRET))
        .oneshot(post(
            REVALIDATE_PATH,
            Some(SECRET),
            r#"{"collection":"posts","slug":"hello-world","operation":"update"}"#,
        ))
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));

    let body: RevalidateResponse = json(response).await;
    assert!(body.revalidated);
    assert_eq!(body.collection, "post");
    assert_eq!(body.slug, "hello-world");
    assert_eq!(
        body.paths,
        vec![
            "/posts/hello-world",
            "/posts",
            "/posts/page/1",
            "/posts/page/2",
            "/posts/page/3",
            "/posts/page/4",
            "/posts/page/5",
        ]
    );
    assert!(body.tags.is_empty());
    assert_eq!(cache.calls(), body.paths);
}

#[tokio::test]
async fn home_page_maps_to_root() {
    let cache = Arc::new(SpyCache::default());
    let response = app(cache.clone(), Some(SECRET))
        .oneshot(post(
            REVALIDATE_PATH,
            Some(SECRET),
            r#"{"collection":"pages","slug":"home"}"#,
        ))
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::OK);
    let body: RevalidateResponse = json(response).await;
    assert_eq!(body.paths, vec!["/"]);
    assert_eq!(cache.calls(), vec!["/"]);
}

#[tokio::test]
async fn header_change_strikes_shell_paths_and_tag() {
    let cache = Arc::new(SpyCache::default());
    let response = app(cache.clone(), Some(SECRET))
        .oneshot(post(
            REVALIDATE_PATH,
            Some(SECRET),
            r#"{"collection":"header","slug":"header"}"#,
        ))
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::OK);
    let body: RevalidateResponse = json(response).await;
    assert_eq!(body.paths, vec!["/", "/posts", "/search"]);
    assert_eq!(body.tags, vec!["header"]);
    assert_eq!(cache.calls(), vec!["/", "/posts", "/search", "#header"]);
}

#[tokio::test]
async fn unknown_collection_falls_back_to_home() {
    let cache = Arc::new(SpyCache::default());
    let response = app(cache.clone(), Some(SECRET))
        .oneshot(post(
            REVALIDATE_PATH,
            Some(SECRET),
            r#"{"collection":"testimonials","slug":"alumni"}"#,
        ))
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::OK);
    let body: RevalidateResponse = json(response).await;
    assert_eq!(body.collection, "testimonials");
    assert_eq!(body.paths, vec!["/"]);
}

#[tokio::test]
async fn wrong_or_missing_secret_is_rejected_without_cache_calls() {
    let cache = Arc::new(SpyCache::default());
    let router = app(cache.clone(), Some(SECRET));
    let body = r#"{"collection":"posts","slug":"hello-world"}"#;

    for secret in [None, Some("nope"), Some("")] {
        let response = router
            .clone()
            .oneshot(post(REVALIDATE_PATH, secret, body))
            .await
            .expect("router should respond");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let error: ErrorResponse = json(response).await;
        assert_eq!(error.message, "Invalid token");
    }

    assert!(cache.calls().is_empty());
}

#[tokio::test]
async fn unconfigured_secret_rejects_every_call() {
    let cache = Arc::new(SpyCache::default());
    let response = app(cache.clone(), None)
        .oneshot(post(
            REVALIDATE_PATH,
            Some(""),
            r#"{"collection":"posts","slug":"hello-world"}"#,
        ))
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(cache.calls().is_empty());
}

#[tokio::test]
async fn auth_is_checked_before_body() {
    let cache = Arc::new(SpyCache::default());
    let response = app(cache, Some(SECRET))
        .oneshot(post(REVALIDATE_PATH, Some("nope"), "not json"))
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_bodies_return_server_error() {
    let cache = Arc::new(SpyCache::default());
    let router = app(cache.clone(), Some(SECRET));

    for body in [
        "not json",
        r#"{"collection":"posts"}"#,
        r#"{"collection":"posts","slug":""}"#,
        r#"{"collection":"","slug":"x"}"#,
        r#"{"collection":"posts","slug":"x","operation":"publish"}"#,
    ] {
        let response = router
            .clone()
            .oneshot(post(REVALIDATE_PATH, Some(SECRET), body))
            .await
            .expect("router should respond");

        assert_eq!(
            response.status(),
            StatusCode::INTERNAL_SERVER_ERROR,
            "body: {body}"
        );
        let error: ErrorResponse = json(response).await;
        assert_eq!(error.message, "Error revalidating");
        assert!(error.error.is_some());
    }

    assert!(cache.calls().is_empty());
}

#[tokio::test]
async fn partial_failure_returns_multi_status() {
    let cache = Arc::new(SpyCache::failing_paths(&["/posts"]));
    let response = app(cache.clone(), Some(SECRET))
        .oneshot(post(
            REVALIDATE_PATH,
            Some(SECRET),
            r#"{"collection":"posts","slug":"hello-world"}"#,
        ))
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::MULTI_STATUS);
    let body: PartialRevalidateResponse = json(response).await;
    assert_eq!(body.message, "Some paths failed to revalidate");
    assert_eq!(body.failed.len(), 1);
    assert_eq!(body.failed[0].path, "/posts");
    assert!(!body.failed[0].success);
    assert!(body.revalidated.contains(&"/posts/hello-world".to_string()));
    assert_eq!(body.revalidated.len(), 6);
    // Every path was still attempted.
    assert_eq!(cache.calls().len(), 7);
}

#[tokio::test]
async fn tag_failure_returns_multi_status() {
    let cache = Arc::new(SpyCache {
        fail_tags: true,
        ..Default::default()
    });
    let response = app(cache, Some(SECRET))
        .oneshot(post(
            REVALIDATE_PATH,
            Some(SECRET),
            r#"{"collection":"footer","slug":"footer"}"#,
        ))
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::MULTI_STATUS);
    let body: PartialRevalidateResponse = json(response).await;
    assert_eq!(body.failed[0].path, "tag:footer");
    assert_eq!(body.revalidated, vec!["/", "/posts", "/search"]);
}

#[tokio::test]
async fn repeated_notifications_are_idempotent() {
    let cache = Arc::new(SpyCache::default());
    let router = app(cache.clone(), Some(SECRET));
    let body = r#"{"collection":"posts","slug":"hello-world","operation":"delete"}"#;

    let mut paths = Vec::new();
    for _ in 0..2 {
        let response = router
            .clone()
            .oneshot(post(REVALIDATE_PATH, Some(SECRET), body))
            .await
            .expect("router should respond");
        assert_eq!(response.status(), StatusCode::OK);
        let body: RevalidateResponse = json(response).await;
        paths.push(body.paths);
    }

    assert_eq!(paths[0], paths[1]);
    assert_eq!(cache.calls().len(), 14);
}

#[tokio::test]
async fn health_check_reports_ok() {
    let cache = Arc::new(SpyCache::default());
    let router = app(cache.clone(), Some(SECRET));

    for uri in [REVALIDATE_PATH, REDIRECTS_PATH] {
        let response = router
            .clone()
            .oneshot(get(uri))
            .await
            .expect("router should respond");
        assert_eq!(response.status(), StatusCode::OK);
        let body: HealthResponse = json(response).await;
        assert_eq!(body.status, "ok");
    }

    assert!(cache.calls().is_empty());
}

#[tokio::test]
async fn redirects_strike_the_redirects_tag() {
    let cache = Arc::new(SpyCache::default());
    let response = app(cache.clone(), Some(SECRET))
        .oneshot(post(REDIRECTS_PATH, Some(SECRET), ""))
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::OK);
    let body: TagRevalidateResponse = json(response).await;
    assert!(body.revalidated);
    assert_eq!(body.tag, "redirects");
    assert_eq!(cache.calls(), vec!["#redirects"]);
}

#[tokio::test]
async fn redirects_require_the_secret() {
    let cache = Arc::new(SpyCache::default());
    let response = app(cache.clone(), Some(SECRET))
        .oneshot(post(REDIRECTS_PATH, None, ""))
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(cache.calls().is_empty());
}

#[tokio::test]
async fn redirects_cache_failure_returns_server_error() {
    let cache = Arc::new(SpyCache {
        fail_tags: true,
        ..Default::default()
    });
    let response = app(cache, Some(SECRET))
        .oneshot(post(REDIRECTS_PATH, Some(SECRET), ""))
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error: ErrorResponse = json(response).await;
    assert_eq!(error.message, "Error revalidating");
    assert!(
        error
            .error
            .as_deref()
            .unwrap_or("")
            .contains("tag store offline")
    );
}

#[tokio::test]
async fn unknown_routes_without_origin_are_not_found() {
    let cache = Arc::new(SpyCache::default());
    let response = app(cache, Some(SECRET))
        .oneshot(get("/posts/hello-world"))
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
