use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use revalidator_api_types::ErrorResponse;
use thiserror::Error;

use crate::application::error::ErrorReport;
use crate::application::invalidator::AuthError;
use crate::domain::error::DomainError;

const SOURCE: &str = "infra::http::revalidate";

/// Failures surfaced by the revalidation endpoints.
#[derive(Debug, Error)]
pub enum RevalidateError {
    #[error(transparent)]
    Unauthorized(#[from] AuthError),
    #[error("malformed request body: {0}")]
    Body(#[from] serde_json::Error),
    #[error(transparent)]
    Descriptor(#[from] DomainError),
    #[error("{0}")]
    Cache(String),
}

impl RevalidateError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Body(_) | Self::Descriptor(_) | Self::Cache(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn body(&self) -> ErrorResponse {
        match self {
            // The reason an auth check failed is never echoed to the caller.
            Self::Unauthorized(_) => ErrorResponse {
                message: "Invalid token".to_string(),
                error: None,
            },
            other => ErrorResponse {
                message: "Error revalidating".to_string(),
                error: Some(other.to_string()),
            },
        }
    }
}

impl IntoResponse for RevalidateError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (status, Json(self.body())).into_response();
        ErrorReport::from_error(SOURCE, status, &self).attach(&mut response);
        response
    }
}
