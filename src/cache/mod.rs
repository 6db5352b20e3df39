//! Render cache and invalidation planning.
//!
//! - **Planner**: maps a content change onto rendered paths and tag groups
//! - **RenderCache**: the two-operation interface the invalidator strikes
//! - **ResponseStore**: in-process, path-keyed adapter with tag tracking
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enable_response_cache = true
//! response_limit = 500
//! response_body_limit_bytes = 2097152
//! ```

mod config;
mod lock;
mod middleware;
mod planner;
mod registry;
mod store;
pub mod tags;

pub use config::CacheConfig;
pub use middleware::{CacheState, response_cache_layer};
pub use planner::{InvalidationPlan, POST_LISTING_PAGES};
pub use registry::TagRegistry;
pub use store::{CacheError, CachedResponse, Epoch, RenderCache, ResponseStore};
