//! Render-time tag collector.
//!
//! Uses `tokio::task_local!` so render code can mark the page it is producing
//! with tag groups (for example the shared `header` and `footer`) without
//! threading a collector through every call. The response cache middleware
//! scopes a collector around each render and registers the tags with the path.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};

use super::lock::mutex_lock;

const SOURCE: &str = "cache::tags";

type TagSet = Arc<Mutex<HashSet<String>>>;

tokio::task_local! {
    static TAGS: TagSet;
}

/// Record a tag for the rendering in progress.
///
/// If no collector is active, the call is silently ignored.
pub fn record(tag: impl Into<String>) {
    let tag = tag.into();
    let _ = TAGS.try_with(|tags| {
        mutex_lock(tags, SOURCE, "record").insert(tag);
    });
}

/// Run a future with a tag collector and return its output with the tags it recorded.
pub async fn with_collector<F, R>(f: F) -> (R, HashSet<String>)
where
    F: Future<Output = R>,
{
    let tags = TagSet::default();
    let result = TAGS.scope(tags.clone(), f).await;
    let collected = std::mem::take(&mut *mutex_lock(&tags, SOURCE, "collect"));
    (result, collected)
}
