//! Response cache middleware.
//!
//! Serves cached renderings for `GET` requests and stores successful renders
//! together with the tags recorded while producing them.

use std::sync::Arc;

use axum::{
    body::{Body, HttpBody},
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::counter;
use tracing::{debug, instrument, warn};

use crate::application::error::ErrorReport;

use super::{CacheConfig, ResponseStore, store::CachedResponse, tags};

const CACHE_STATUS_HEADER: &str = "x-cache";
const METRIC_CACHE_HIT_TOTAL: &str = "revalidator_cache_hit_total";
const METRIC_CACHE_MISS_TOTAL: &str = "revalidator_cache_miss_total";

/// Shared cache state for middleware.
#[derive(Clone)]
pub struct CacheState {
    pub config: CacheConfig,
    pub store: Arc<ResponseStore>,
}

impl CacheState {
    pub fn new(config: CacheConfig) -> Self {
        let store = Arc::new(ResponseStore::new(&config));
        Self { config, store }
    }
}

/// Middleware for render caching.
///
/// Only plain `GET` requests without a query string are cached, keyed by path,
/// so that a path invalidation reaches every stored variant.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !cache.config.enable_response_cache
        || request.method() != Method::GET
        || request.uri().query().is_some()
    {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();

    if let Some(cached) = cache.store.get(&path) {
        debug!(cache = "render", outcome = "hit", "serving cached response");
        counter!(METRIC_CACHE_HIT_TOTAL).increment(1);
        return build_response(cached);
    }

    counter!(METRIC_CACHE_MISS_TOTAL).increment(1);
    debug!(cache = "render", outcome = "miss", "cache miss, rendering");

    let rendered_at = cache.store.epoch();

    let (response, tags) = tags::with_collector(next.run(request)).await;

    if !should_store_response(&response, cache.config.response_body_limit_bytes) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, cache.config.response_body_limit_bytes).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(path = %path, error = %err, "failed to buffer rendered response");
            let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
            ErrorReport::from_message(
                "cache::middleware::response_cache_layer",
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to buffer rendered response: {err}"),
            )
            .attach(&mut response);
            return response;
        }
    };

    let cached = CachedResponse {
        status: parts.status.as_u16(),
        headers: parts
            .headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect(),
        body: bytes.clone(),
    };

    let tag_count = tags.len();
    if cache.store.set_if_current(&path, cached, tags, rendered_at) {
        debug!(cache = "render", tags = tag_count, "caching response");
    } else {
        debug!(cache = "render", "invalidated during render, not caching");
    }

    parts
        .headers
        .insert(CACHE_STATUS_HEADER, HeaderValue::from_static("MISS"));
    Response::from_parts(parts, Body::from(bytes))
}

/// Decide whether a rendered response may be shared between visitors.
fn should_store_response(response: &Response, body_limit: usize) -> bool {
    if response.status() != StatusCode::OK {
        return false;
    }

    if response.headers().contains_key(header::SET_COOKIE) {
        return false;
    }

    if response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/event-stream"))
    {
        return false;
    }

    let hint = response.body().size_hint();
    match hint.upper() {
        Some(upper) => upper <= body_limit as u64,
        None => hint.lower() <= body_limit as u64,
    }
}

/// Build a response from cached data.
fn build_response(cached: CachedResponse) -> Response {
    let mut builder = Response::builder()
        .status(cached.status)
        .header(CACHE_STATUS_HEADER, "HIT");

    for (name, value) in cached.headers {
        if let Ok(header_value) = HeaderValue::from_str(&value) {
            builder = builder.header(name, header_value);
        }
    }

    builder
        .body(Body::from(cached.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
