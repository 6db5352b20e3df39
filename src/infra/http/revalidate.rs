//! `/api/revalidate` handlers.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use metrics::counter;
use revalidator_api_types::{
    HealthResponse, PartialRevalidateResponse, REDIRECTS_TAG, RevalidateRequest,
    RevalidateResponse, SECRET_HEADER, TagRevalidateResponse,
};
use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::domain::changes::ChangeDescriptor;

use super::{AppState, error::RevalidateError};

const METRIC_REQUESTS_TOTAL: &str = "revalidator_revalidate_requests_total";
const PARTIAL_MESSAGE: &str = "Some paths failed to revalidate";

pub(super) async fn revalidate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, RevalidateError> {
    authorize(&state, &headers)?;

    let request: RevalidateRequest = serde_json::from_slice(&body).inspect_err(|err| {
        error!(error = %err, "Rejected revalidation body");
        counter!(METRIC_REQUESTS_TOTAL, "outcome" => "invalid").increment(1);
    })?;
    let change = ChangeDescriptor::try_from(request).inspect_err(|err| {
        error!(error = %err, "Rejected revalidation descriptor");
        counter!(METRIC_REQUESTS_TOTAL, "outcome" => "invalid").increment(1);
    })?;

    let outcome = state.invalidator.revalidate(&change).await;

    if outcome.is_complete() {
        counter!(METRIC_REQUESTS_TOTAL, "outcome" => "ok").increment(1);
        let body = RevalidateResponse {
            revalidated: true,
            paths: outcome.paths,
            tags: outcome.tags,
            collection: change.entity_type().as_str().to_string(),
            slug: change.entity_key().to_string(),
            operation: change.operation(),
            timestamp: OffsetDateTime::now_utc(),
        };
        return Ok((StatusCode::OK, Json(body)).into_response());
    }

    let failed = outcome.failed();
    warn!(change = %change, failed = failed.len(), "Revalidation partially failed");
    counter!(METRIC_REQUESTS_TOTAL, "outcome" => "partial").increment(1);

    let body = PartialRevalidateResponse {
        message: PARTIAL_MESSAGE.to_string(),
        revalidated: outcome.succeeded(),
        failed,
    };
    Ok((StatusCode::MULTI_STATUS, Json(body)).into_response())
}

pub(super) async fn revalidate_redirects(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, RevalidateError> {
    authorize(&state, &headers)?;

    let outcome = state.invalidator.revalidate_tag(REDIRECTS_TAG).await;

    if let Some(failure) = outcome.failed().into_iter().next() {
        counter!(METRIC_REQUESTS_TOTAL, "outcome" => "failed").increment(1);
        return Err(RevalidateError::Cache(
            failure
                .error
                .unwrap_or_else(|| format!("failed to revalidate {}", failure.path)),
        ));
    }

    info!(tag = REDIRECTS_TAG, "Redirects revalidated");
    counter!(METRIC_REQUESTS_TOTAL, "outcome" => "ok").increment(1);

    let body = TagRevalidateResponse {
        revalidated: true,
        tag: REDIRECTS_TAG.to_string(),
        timestamp: OffsetDateTime::now_utc(),
    };
    Ok((StatusCode::OK, Json(body)).into_response())
}

pub(super) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Revalidation endpoint is running".to_string(),
        timestamp: OffsetDateTime::now_utc(),
    })
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), RevalidateError> {
    let provided = headers
        .get(SECRET_HEADER)
        .and_then(|value| value.to_str().ok());

    state.invalidator.authorize(provided).map_err(|err| {
        error!(error = %err, "Rejected revalidation request");
        counter!(METRIC_REQUESTS_TOTAL, "outcome" => "unauthorized").increment(1);
        RevalidateError::from(err)
    })
}
