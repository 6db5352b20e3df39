mod error;
mod middleware;
pub mod origin;
mod revalidate;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use revalidator_api_types::{REDIRECTS_PATH, REVALIDATE_PATH};

use crate::application::invalidator::Invalidator;
use crate::cache::{CacheState, response_cache_layer};

pub use error::RevalidateError;
pub use middleware::{REQUEST_ID_HEADER, RequestContext, log_responses, set_request_context};
pub use origin::{CACHE_TAGS_HEADER, OriginProxy};

#[derive(Clone)]
pub struct AppState {
    pub invalidator: Arc<Invalidator>,
    pub cache: Option<CacheState>,
    pub origin: Option<OriginProxy>,
}

pub fn build_router(state: AppState) -> Router {
    // Revalidation endpoints are never cached.
    let revalidate_routes = Router::new()
        .route(
            REVALIDATE_PATH,
            post(revalidate::revalidate).get(revalidate::health),
        )
        .route(
            REDIRECTS_PATH,
            post(revalidate::revalidate_redirects).get(revalidate::health),
        );

    let proxied = Router::new().fallback(origin::proxy);
    let proxied = if let Some(cache_state) = state.cache.clone() {
        proxied.layer(axum_middleware::from_fn_with_state(
            cache_state,
            response_cache_layer,
        ))
    } else {
        proxied
    };

    revalidate_routes
        .merge(proxied)
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
