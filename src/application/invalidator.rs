//! Invalidation service.
//!
//! Authenticates change notifications and strikes the affected paths and tag
//! groups from the render cache. Holds no state between requests.

use std::sync::Arc;

use metrics::counter;
use revalidator_api_types::RevalidationResult;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::cache::{InvalidationPlan, RenderCache};
use crate::domain::changes::ChangeDescriptor;

const METRIC_INVALIDATED_TOTAL: &str = "revalidator_paths_invalidated_total";
const METRIC_FAILURES_TOTAL: &str = "revalidator_invalidation_failures_total";

/// Prefix used when reporting tag results alongside path results.
pub const TAG_RESULT_PREFIX: &str = "tag:";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("revalidation secret header missing")]
    Missing,
    #[error("revalidation secret does not match")]
    Invalid,
    #[error("no revalidation secret configured")]
    NotConfigured,
}

/// Result of applying one plan.
#[derive(Debug, Clone, Default)]
pub struct InvalidationOutcome {
    pub paths: Vec<String>,
    pub tags: Vec<String>,
    pub results: Vec<RevalidationResult>,
}

impl InvalidationOutcome {
    /// True when every path and tag was struck.
    pub fn is_complete(&self) -> bool {
        self.results.iter().all(|result| result.success)
    }

    /// Targets that were struck, tags reported as `tag:{name}`.
    pub fn succeeded(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|result| result.success)
            .map(|result| result.path.clone())
            .collect()
    }

    pub fn failed(&self) -> Vec<RevalidationResult> {
        self.results
            .iter()
            .filter(|result| !result.success)
            .cloned()
            .collect()
    }
}

pub struct Invalidator {
    cache: Arc<dyn RenderCache>,
    secret: Option<String>,
}

impl Invalidator {
    pub fn new(cache: Arc<dyn RenderCache>, secret: Option<String>) -> Self {
        let secret = secret.filter(|value| !value.is_empty());
        if secret.is_none() {
            warn!("No revalidation secret configured; every invalidation call will be rejected");
        }
        Self { cache, secret }
    }

    /// Check the shared secret presented by a caller.
    pub fn authorize(&self, provided: Option<&str>) -> Result<(), AuthError> {
        let expected = self.secret.as_deref().ok_or(AuthError::NotConfigured)?;
        let provided = provided.ok_or(AuthError::Missing)?;

        if expected.as_bytes().ct_eq(provided.as_bytes()).unwrap_u8() == 0 {
            return Err(AuthError::Invalid);
        }
        Ok(())
    }

    /// Strike everything a change affects.
    ///
    /// Paths are struck one at a time and a failure does not stop the rest.
    /// Tag groups are struck afterwards as their own step.
    #[instrument(skip(self, change), fields(change = %change))]
    pub async fn revalidate(&self, change: &ChangeDescriptor) -> InvalidationOutcome {
        let plan = InvalidationPlan::for_change(change);
        info!(plan = %plan, "Revalidation starting");

        let outcome = self.apply(plan).await;

        info!(
            struck = outcome.succeeded().len(),
            failed = outcome.results.len() - outcome.succeeded().len(),
            "Revalidation complete"
        );
        outcome
    }

    /// Strike a single tag group.
    #[instrument(skip(self))]
    pub async fn revalidate_tag(&self, tag: &str) -> InvalidationOutcome {
        self.apply(InvalidationPlan::for_tag(tag)).await
    }

    async fn apply(&self, plan: InvalidationPlan) -> InvalidationOutcome {
        let mut results = Vec::with_capacity(plan.paths.len() + plan.tags.len());

        for path in &plan.paths {
            let result = match self.cache.invalidate_path(path).await {
                Ok(()) => {
                    counter!(METRIC_INVALIDATED_TOTAL, "kind" => "path").increment(1);
                    RevalidationResult::ok(path.clone())
                }
                Err(err) => {
                    warn!(path = %path, error = %err, "Failed to revalidate path");
                    counter!(METRIC_FAILURES_TOTAL, "kind" => "path").increment(1);
                    RevalidationResult::failed(path.clone(), err.to_string())
                }
            };
            results.push(result);
        }

        for tag in &plan.tags {
            let label = format!("{TAG_RESULT_PREFIX}{tag}");
            let result = match self.cache.invalidate_tag(tag).await {
                Ok(()) => {
                    counter!(METRIC_INVALIDATED_TOTAL, "kind" => "tag").increment(1);
                    RevalidationResult::ok(label)
                }
                Err(err) => {
                    warn!(tag = %tag, error = %err, "Failed to revalidate tag");
                    counter!(METRIC_FAILURES_TOTAL, "kind" => "tag").increment(1);
                    RevalidationResult::failed(label, err.to_string())
                }
            };
            results.push(result);
        }

        InvalidationOutcome {
            paths: plan.paths,
            tags: plan.tags,
            results,
        }
    }
}
