//! Render cache interface and the in-process response store.

use std::collections::HashSet;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use thiserror::Error;

use super::config::CacheConfig;
use super::lock::{rw_read, rw_write};
use super::registry::TagRegistry;

const SOURCE: &str = "cache::store";
const METRIC_CACHE_EVICT_TOTAL: &str = "revalidator_cache_evict_total";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("render cache unavailable: {0}")]
    Unavailable(String),
    #[error("render cache rejected `{target}`: {reason}")]
    Rejected { target: String, reason: String },
}

impl CacheError {
    pub fn rejected(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            target: target.into(),
            reason: reason.into(),
        }
    }
}

/// Capabilities the invalidator needs from whatever caches rendered output.
///
/// Both operations must be idempotent: striking an entry that is absent or
/// already stale succeeds.
#[async_trait]
pub trait RenderCache: Send + Sync {
    /// Drop the cached rendering of a single path.
    async fn invalidate_path(&self, path: &str) -> Result<(), CacheError>;

    /// Drop every cached rendering that was tagged with `tag` at render time.
    async fn invalidate_tag(&self, tag: &str) -> Result<(), CacheError>;
}

/// A rendered response held by [`ResponseStore`].
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// Invalidation counter; a rendering begun at an older epoch is never stored.
pub type Epoch = u64;

/// Path-keyed LRU of rendered responses with tag-group tracking.
///
/// The response map lock is held across every registry update, so an entry
/// and its tags are always added and dropped together.
#[derive(Debug)]
pub struct ResponseStore {
    responses: RwLock<LruCache<String, CachedResponse>>,
    registry: TagRegistry,
    epoch: AtomicU64,
}

impl ResponseStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            responses: RwLock::new(LruCache::new(config.response_limit_non_zero())),
            registry: TagRegistry::new(),
            epoch: AtomicU64::new(0),
        }
    }

    /// Current invalidation epoch; capture it before rendering.
    pub fn epoch(&self) -> Epoch {
        self.epoch.load(Ordering::SeqCst)
    }

    pub fn get(&self, path: &str) -> Option<CachedResponse> {
        rw_write(&self.responses, SOURCE, "get").get(path).cloned()
    }

    /// Store a rendering and register the tags it was produced under.
    ///
    /// Returns the path evicted to make room, if any.
    pub fn set(
        &self,
        path: &str,
        response: CachedResponse,
        tags: HashSet<String>,
    ) -> Option<String> {
        let mut responses = rw_write(&self.responses, SOURCE, "set");
        self.insert(&mut responses, path, response, tags)
    }

    /// Store a rendering only if nothing was invalidated since `rendered_at`.
    ///
    /// Returns `false` when the rendering was discarded as stale.
    pub fn set_if_current(
        &self,
        path: &str,
        response: CachedResponse,
        tags: HashSet<String>,
        rendered_at: Epoch,
    ) -> bool {
        let mut responses = rw_write(&self.responses, SOURCE, "set_if_current");
        if self.epoch.load(Ordering::SeqCst) != rendered_at {
            return false;
        }
        self.insert(&mut responses, path, response, tags);
        true
    }

    fn insert(
        &self,
        responses: &mut LruCache<String, CachedResponse>,
        path: &str,
        response: CachedResponse,
        tags: HashSet<String>,
    ) -> Option<String> {
        let evicted = responses
            .push(path.to_string(), response)
            .map(|(key, _)| key)
            .filter(|key| key != path);

        if let Some(key) = evicted.as_deref() {
            self.registry.unregister(key);
            counter!(METRIC_CACHE_EVICT_TOTAL).increment(1);
        }
        self.registry.register(path, tags);

        evicted
    }

    pub fn remove(&self, path: &str) -> bool {
        let mut responses = rw_write(&self.responses, SOURCE, "remove");
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let removed = responses.pop(path).is_some();
        self.registry.unregister(path);
        removed
    }

    /// Remove every path rendered under `tag`, returning how many were cached.
    pub fn remove_tag(&self, tag: &str) -> usize {
        let mut responses = rw_write(&self.responses, SOURCE, "remove_tag");
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let paths = self.registry.take_tag(tag);
        paths
            .iter()
            .filter(|path| responses.pop(path.as_str()).is_some())
            .count()
    }

    pub fn invalidate_all(&self) {
        let mut responses = rw_write(&self.responses, SOURCE, "invalidate_all");
        self.epoch.fetch_add(1, Ordering::SeqCst);
        responses.clear();
        self.registry.clear();
    }

    pub fn registry(&self) -> &TagRegistry {
        &self.registry
    }

    /// Get the number of cached responses.
    pub fn len(&self) -> usize {
        rw_read(&self.responses, SOURCE, "len").len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RenderCache for ResponseStore {
    async fn invalidate_path(&self, path: &str) -> Result<(), CacheError> {
        let removed = self.remove(path);
        tracing::debug!(path, removed, "Render cache path invalidated");
        Ok(())
    }

    async fn invalidate_tag(&self, tag: &str) -> Result<(), CacheError> {
        let removed = self.remove_tag(tag);
        tracing::debug!(tag, removed, "Render cache tag invalidated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    fn page(body: &'static str) -> CachedResponse {
        CachedResponse {
            status: 200,
            headers: vec![("content-type".to_string(), "text/html".to_string())],
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    fn tags(values: &[&str]) -> HashSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn set_get_remove_roundtrip() {
        let store = ResponseStore::new(&CacheConfig::default());

        assert!(store.get("/posts").is_none());
        store.set("/posts", page("listing"), HashSet::new());

        let cached = store.get("/posts").expect("cached response");
        assert_eq!(cached.status, 200);
        assert_eq!(cached.body, Bytes::from_static(b"listing"));

        assert!(store.remove("/posts"));
        assert!(store.get("/posts").is_none());
        assert!(!store.remove("/posts"));
    }

    #[test]
    fn lru_eviction_unregisters_tags() {
        let config = CacheConfig {
            response_limit: 2,
            ..Default::default()
        };
        let store = ResponseStore::new(&config);

        store.set("/a", page("a"), tags(&["header"]));
        store.set("/b", page("b"), tags(&["header"]));
        let evicted = store.set("/c", page("c"), tags(&["header"]));

        assert_eq!(evicted.as_deref(), Some("/a"));
        assert!(store.get("/a").is_none());
        assert!(!store.registry().paths_for_tag("header").contains("/a"));
    }

    #[test]
    fn overwriting_a_path_is_not_an_eviction() {
        let store = ResponseStore::new(&CacheConfig::default());
        store.set("/a", page("one"), HashSet::new());
        assert!(store.set("/a", page("two"), HashSet::new()).is_none());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn tag_invalidation_drops_tagged_paths_only() {
        let store = ResponseStore::new(&CacheConfig::default());
        store.set("/about", page("about"), tags(&["header", "footer"]));
        store.set("/contact", page("contact"), tags(&["footer"]));
        store.set("/posts", page("posts"), HashSet::new());

        store.invalidate_tag("footer").await.expect("tag invalidation");

        assert!(store.get("/about").is_none());
        assert!(store.get("/contact").is_none());
        assert!(store.get("/posts").is_some());
    }

    #[tokio::test]
    async fn invalidation_is_idempotent() {
        let store = ResponseStore::new(&CacheConfig::default());
        store.set("/", page("home"), tags(&["header"]));

        store.invalidate_path("/").await.expect("first strike");
        store.invalidate_path("/").await.expect("second strike");
        store.invalidate_tag("header").await.expect("tag strike");
        store.invalidate_tag("header").await.expect("tag strike again");

        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn rendering_begun_before_a_strike_is_discarded() {
        let store = ResponseStore::new(&CacheConfig::default());

        let rendered_at = store.epoch();
        store.invalidate_path("/about").await.expect("path strike");
        assert!(!store.set_if_current(
            "/about",
            page("v1"),
            tags(&["footer"]),
            rendered_at
        ));
        assert!(store.get("/about").is_none());
        assert!(store.registry().paths_for_tag("footer").is_empty());

        let rendered_at = store.epoch();
        store.invalidate_tag("header").await.expect("tag strike");
        assert!(!store.set_if_current(
            "/about",
            page("v1"),
            HashSet::new(),
            rendered_at
        ));

        let rendered_at = store.epoch();
        assert!(store.set_if_current(
            "/about",
            page("v2"),
            tags(&["footer"]),
            rendered_at
        ));
        let cached = store.get("/about").expect("fresh rendering is stored");
        assert_eq!(cached.body, Bytes::from_static(b"v2"));
    }

    #[test]
    fn removal_drops_entry_and_tags_together() {
        let store = ResponseStore::new(&CacheConfig::default());
        store.set("/about", page("about"), tags(&["footer"]));
        store.set("/contact", page("contact"), tags(&["footer", "header"]));

        assert!(store.remove("/about"));
        assert!(store.registry().tags_for_path("/about").is_empty());

        assert_eq!(store.remove_tag("footer"), 1);
        assert!(store.registry().tags_for_path("/contact").is_empty());
        assert!(store.registry().paths_for_tag("header").is_empty());
    }

    #[test]
    fn store_recovers_from_poisoned_lock() {
        let store = ResponseStore::new(&CacheConfig::default());

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store
                .responses
                .write()
                .expect("responses lock should be acquired");
            panic!("poison responses lock");
        }));

        store.set("/", page("home"), HashSet::new());
        assert!(store.get("/").is_some());
    }
}
