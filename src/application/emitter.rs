//! Change emitter.
//!
//! Runs beside the content-management layer. After a write commits, the
//! emitter posts a change descriptor to the invalidator on a detached task.
//! Delivery is at most once: there is no retry, no queue and no backoff, and a
//! failed delivery is logged and never reported back to the write.

use std::sync::Arc;

use reqwest::{Client, StatusCode, Url};
use revalidator_api_types::{
    PartialRevalidateResponse, RevalidateRequest, RevalidateResponse, RevalidationResult,
    SECRET_HEADER,
};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::RevalidateSettings;
use crate::domain::changes::{ChangeDescriptor, ContentRef, EntityType, Operation};
use crate::domain::error::DomainError;

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("change emitter is not configured (site URL or secret missing)")]
    Disabled,
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("delivery failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("invalidator responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error(transparent)]
    Descriptor(#[from] DomainError),
}

/// What the invalidator reported for a delivered change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub status: u16,
    pub revalidated: Vec<String>,
    pub failed: Vec<RevalidationResult>,
}

impl Delivery {
    pub fn is_partial(&self) -> bool {
        self.status == StatusCode::MULTI_STATUS.as_u16()
    }
}

#[derive(Debug)]
struct EmitTarget {
    endpoint: Url,
    secret: String,
}

/// Sends change descriptors to the invalidator.
#[derive(Debug, Clone)]
pub struct ChangeEmitter {
    client: Client,
    target: Option<Arc<EmitTarget>>,
}

impl ChangeEmitter {
    pub fn new(settings: &RevalidateSettings) -> Result<Self, EmitError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(settings.request_timeout)
            .build()
            .map_err(EmitError::Client)?;

        let target = match (settings.site_url.as_ref(), settings.secret.as_deref()) {
            (Some(site), Some(secret)) if !secret.is_empty() => Some(Arc::new(EmitTarget {
                endpoint: endpoint_url(site, &settings.endpoint_path),
                secret: secret.to_string(),
            })),
            _ => {
                warn!(
                    site_url_configured = settings.site_url.is_some(),
                    secret_configured = settings.secret.is_some(),
                    "Change emitter disabled; content writes will not revalidate cached pages"
                );
                None
            }
        };

        Ok(Self { client, target })
    }

    pub fn user_agent() -> &'static str {
        concat!("revalidator/", env!("CARGO_PKG_VERSION"))
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// The invalidator endpoint, when configured.
    pub fn endpoint(&self) -> Option<&Url> {
        self.target.as_ref().map(|target| &target.endpoint)
    }

    /// Deliver a single change and wait for the invalidator's answer.
    pub async fn deliver(&self, change: &ChangeDescriptor) -> Result<Delivery, EmitError> {
        let target = self.target.as_ref().ok_or(EmitError::Disabled)?;

        let response = self
            .client
            .post(target.endpoint.clone())
            .header(SECRET_HEADER, target.secret.as_str())
            .json(&RevalidateRequest::from(change))
            .send()
            .await
            .map_err(EmitError::Transport)?;

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                debug!(
                    status = status.as_u16(),
                    error = %err,
                    "Failed to read invalidator response body"
                );
                String::new()
            }
        };

        if !status.is_success() {
            return Err(EmitError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(parse_delivery(status, &body))
    }

    /// Deliver a change on a detached task.
    ///
    /// Returns `None` when the emitter is disabled or there is no runtime to
    /// spawn onto. The task never propagates its failure.
    pub fn notify(&self, change: ChangeDescriptor) -> Option<JoinHandle<()>> {
        if !self.is_enabled() {
            warn!(change = %change, "Change emitter disabled; skipping revalidation");
            return None;
        }

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(err) => {
                warn!(change = %change, error = %err, "No async runtime; skipping revalidation");
                return None;
            }
        };

        let emitter = self.clone();
        Some(handle.spawn(async move {
            match emitter.deliver(&change).await {
                Ok(delivery) if delivery.is_partial() => warn!(
                    change = %change,
                    failed = ?delivery.failed,
                    revalidated = ?delivery.revalidated,
                    "Revalidation partially failed"
                ),
                Ok(delivery) => info!(
                    change = %change,
                    paths = ?delivery.revalidated,
                    "Revalidation delivered"
                ),
                Err(err) => error!(change = %change, error = %err, "Revalidation delivery failed"),
            }
        }))
    }

    /// After-write hook for collection documents.
    ///
    /// Schedules the notification and hands the document back untouched.
    pub fn after_change<D: ContentRef>(&self, entity: EntityType, document: D, op: Operation) -> D {
        match ChangeDescriptor::for_document(entity, &document, op) {
            Ok(change) => drop(self.notify(change)),
            Err(err) => warn!(error = %err, "Skipping revalidation for invalid document"),
        }
        document
    }

    /// After-write hook for singletons such as the header and footer.
    pub fn after_global_change<D>(&self, entity: EntityType, document: D) -> D {
        match ChangeDescriptor::for_global(entity) {
            Ok(change) => drop(self.notify(change)),
            Err(err) => warn!(error = %err, "Skipping revalidation for invalid global"),
        }
        document
    }
}

/// Append `endpoint_path` to the site URL, keeping any path the site is mounted under.
fn endpoint_url(site: &Url, endpoint_path: &str) -> Url {
    let prefix = site.path().trim_end_matches('/');
    let mut endpoint = site.clone();
    endpoint.set_path(&format!("{prefix}{endpoint_path}"));
    endpoint.set_query(None);
    endpoint.set_fragment(None);
    endpoint
}

fn parse_delivery(status: StatusCode, body: &str) -> Delivery {
    let (revalidated, failed) = if status == StatusCode::MULTI_STATUS {
        serde_json::from_str::<PartialRevalidateResponse>(body)
            .map(|partial| (partial.revalidated, partial.failed))
            .unwrap_or_default()
    } else {
        serde_json::from_str::<RevalidateResponse>(body)
            .map(|ok| (ok.paths, Vec::new()))
            .unwrap_or_default()
    };

    if revalidated.is_empty() && failed.is_empty() {
        debug!(status = status.as_u16(), "Invalidator response body not recognised");
    }

    Delivery {
        status: status.as_u16(),
        revalidated,
        failed,
    }
}
