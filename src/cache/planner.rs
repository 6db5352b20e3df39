//! Invalidation plan generation.
//!
//! Maps a content change onto the rendered paths and tag groups that embed it.

use std::fmt;

use tracing::warn;

use crate::domain::changes::{ChangeDescriptor, EntityType};

/// Number of paginated post listing pages struck on every post change.
///
/// The descriptor does not say which listing page a post lands on, so a fixed
/// prefix is struck. Listing pages beyond this stay cached until their own TTL
/// or the next change that reaches them.
pub const POST_LISTING_PAGES: usize = 5;

/// Paths rendered with the shared header and footer outside of tag groups.
const SHELL_PATHS: [&str; 3] = ["/", "/posts", "/search"];

/// Rendered outputs to strike for one change.
///
/// Derived on every request and discarded afterwards. Paths keep insertion
/// order and never repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationPlan {
    pub paths: Vec<String>,
    pub tags: Vec<String>,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InvalidationPlan {{ paths: {}, tags: {} }}",
            self.paths.len(),
            self.tags.len(),
        )
    }
}

impl InvalidationPlan {
    /// Resolve the targets affected by a change.
    pub fn for_change(change: &ChangeDescriptor) -> Self {
        let mut plan = Self::default();
        let key = change.entity_key();

        match change.entity_type() {
            EntityType::Page => {
                let key = key.trim_start_matches('/');
                if key == "home" || key == "index" || key.is_empty() {
                    plan.push_path("/");
                } else {
                    plan.push_path(format!("/{key}"));
                }
            }
            EntityType::Post => {
                plan.push_path(format!("/posts/{key}"));
                plan.push_path("/posts");
                for page in 1..=POST_LISTING_PAGES {
                    plan.push_path(format!("/posts/page/{page}"));
                }
            }
            // Media can be embedded anywhere; strike the busiest entry points.
            EntityType::Media => {
                plan.push_path("/");
                plan.push_path("/posts");
            }
            EntityType::Category => {
                plan.push_path("/posts");
            }
            EntityType::Header | EntityType::Footer => {
                for path in SHELL_PATHS {
                    plan.push_path(path);
                }
                plan.push_tag(change.entity_type().as_str());
            }
            EntityType::Unknown(name) => {
                warn!(
                    collection = %name,
                    slug = %key,
                    "Unknown collection for revalidation; striking home page only"
                );
                plan.push_path("/");
            }
        }

        plan
    }

    /// A plan that strikes a single tag group and no paths.
    pub fn for_tag(tag: &str) -> Self {
        let mut plan = Self::default();
        plan.push_tag(tag);
        plan
    }

    fn push_path(&mut self, path: impl Into<String>) {
        let path = path.into();
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    fn push_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
    }
}
