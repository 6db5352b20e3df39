//! Wire contract shared by the change emitter and the revalidation endpoints.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Header carrying the shared secret on every invalidation call.
pub const SECRET_HEADER: &str = "x-revalidate-secret";
/// Path of the content revalidation endpoint.
pub const REVALIDATE_PATH: &str = "/api/revalidate";
/// Path of the redirect-table revalidation endpoint.
pub const REDIRECTS_PATH: &str = "/api/revalidate/redirects";
/// Tag struck by the redirect-table endpoint.
pub const REDIRECTS_TAG: &str = "redirects";

/// Kind of write that produced a change. Creation is reported as `update`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    #[default]
    Update,
    Delete,
}

impl ChangeOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeOperation::Update => "update",
            ChangeOperation::Delete => "delete",
        }
    }
}

impl std::fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `POST /api/revalidate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevalidateRequest {
    pub collection: String,
    pub slug: String,
    #[serde(default)]
    pub operation: ChangeOperation,
}

/// Outcome of striking a single path or tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevalidationResult {
    pub path: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RevalidationResult {
    pub fn ok(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            success: true,
            error: None,
        }
    }

    pub fn failed(path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// `200` body: every target was struck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevalidateResponse {
    pub revalidated: bool,
    pub paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub collection: String,
    pub slug: String,
    pub operation: ChangeOperation,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// `207` body: at least one target could not be struck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialRevalidateResponse {
    pub message: String,
    pub failed: Vec<RevalidationResult>,
    pub revalidated: Vec<String>,
}

/// Error body for `401` and `500` responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of the `GET` health checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// `200` body of a tag-only revalidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRevalidateResponse {
    pub revalidated: bool,
    pub tag: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}
