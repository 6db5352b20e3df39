//! Response cache configuration.
//!
//! Controls the in-process render cache via the `[cache]` table.

use std::num::NonZeroUsize;

const DEFAULT_RESPONSE_LIMIT: usize = 500;
const DEFAULT_RESPONSE_BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

/// Runtime configuration for [`super::ResponseStore`] and its middleware.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Serve and store rendered responses.
    pub enable_response_cache: bool,
    /// Maximum number of cached paths.
    pub response_limit: usize,
    /// Largest body that will be buffered and stored.
    pub response_body_limit_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_response_cache: true,
            response_limit: DEFAULT_RESPONSE_LIMIT,
            response_body_limit_bytes: DEFAULT_RESPONSE_BODY_LIMIT_BYTES,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enable_response_cache: settings.enable_response_cache,
            response_limit: settings.response_limit.get(),
            response_body_limit_bytes: settings.response_body_limit_bytes.get(),
        }
    }
}

impl CacheConfig {
    /// Returns the response limit as NonZeroUsize, clamping to 1 if zero.
    pub fn response_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.response_limit).unwrap_or(NonZeroUsize::MIN)
    }
}
