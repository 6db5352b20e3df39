//! Origin renderer proxy.
//!
//! Page requests that are not handled locally are forwarded to the origin
//! renderer. The origin lists the tag groups a page depends on in the
//! `x-cache-tags` response header; they are recorded into the active collector
//! so the response cache can strike the page by tag later.

use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Method, Request, StatusCode, header},
    response::{IntoResponse, Response},
};
use metrics::histogram;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::application::error::HttpError;
use crate::cache::tags;
use crate::config::OriginSettings;
use crate::infra::error::InfraError;

use super::AppState;

pub const CACHE_TAGS_HEADER: &str = "x-cache-tags";
const SOURCE: &str = "infra::http::origin";
const METRIC_ORIGIN_FETCH_MS: &str = "revalidator_origin_fetch_ms";

#[derive(Debug, Error)]
pub enum OriginError {
    #[error("origin request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct OriginProxy {
    client: Client,
    base: Url,
}

impl OriginProxy {
    /// Build a proxy when an origin is configured.
    pub fn from_settings(settings: &OriginSettings) -> Result<Option<Self>, InfraError> {
        let Some(base) = settings.url.clone() else {
            return Ok(None);
        };

        let client = Client::builder()
            .user_agent(concat!("revalidator/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;

        Ok(Some(Self { client, base }))
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Map a local request target onto the origin, keeping the origin's
    /// host and path prefix whatever the target looks like.
    pub fn upstream_url(&self, path_and_query: &str) -> Url {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path_and_query, None),
        };

        let prefix = self.base.path().trim_end_matches('/');
        let suffix = path.trim_start_matches('/');

        let mut url = self.base.clone();
        url.set_path(&format!("{prefix}/{suffix}"));
        url.set_query(query.filter(|query| !query.is_empty()));
        url.set_fragment(None);
        url
    }

    /// Fetch `path_and_query` from the origin and record its cache tags.
    pub async fn fetch(
        &self,
        path_and_query: &str,
        accept: Option<&str>,
    ) -> Result<Response, OriginError> {
        let url = self.upstream_url(path_and_query);
        let started = Instant::now();

        let mut request = self.client.get(url);
        if let Some(accept) = accept {
            request = request.header(header::ACCEPT, accept);
        }
        let upstream = request.send().await?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        let body = upstream.bytes().await?;
        histogram!(METRIC_ORIGIN_FETCH_MS).record(started.elapsed().as_secs_f64() * 1000.0);

        for tag in parse_cache_tags(&headers) {
            tags::record(tag);
        }
        strip_hop_headers(&mut headers);
        headers.remove(CACHE_TAGS_HEADER);

        debug!(path = %path_and_query, status = status.as_u16(), "origin responded");

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// Drop headers that describe a single hop; the body is re-framed locally.
fn strip_hop_headers(headers: &mut HeaderMap) {
    for name in [
        header::CONNECTION,
        header::TRANSFER_ENCODING,
        header::CONTENT_LENGTH,
        header::UPGRADE,
    ] {
        headers.remove(name);
    }
}

pub fn parse_cache_tags(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(CACHE_TAGS_HEADER)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

pub(super) async fn proxy(State(state): State<AppState>, request: Request<Body>) -> Response {
    let Some(origin) = state.origin.as_ref() else {
        return HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Not found",
            format!("no route for {}", request.uri().path()),
        )
        .into_response();
    };

    if request.method() != Method::GET && request.method() != Method::HEAD {
        return HttpError::new(
            SOURCE,
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed",
            format!("{} is not proxied", request.method()),
        )
        .into_response();
    }

    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let accept = request
        .headers()
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok());

    match origin.fetch(path_and_query, accept).await {
        Ok(response) => response,
        Err(err) => {
            HttpError::from_error(SOURCE, StatusCode::BAD_GATEWAY, "Origin unavailable", &err)
                .into_response()
        }
    }
}
