//! Bidirectional tag registry.
//!
//! Tracks which cached paths were rendered under which tag groups, so a single
//! tag invalidation can find every path without the caller enumerating them.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::registry";

/// Tracks tag → paths and path → tags mappings.
#[derive(Debug, Default)]
pub struct TagRegistry {
    tag_to_paths: RwLock<HashMap<String, HashSet<String>>>,
    path_to_tags: RwLock<HashMap<String, HashSet<String>>>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cached path with the tags it was rendered under.
    ///
    /// Replaces any tags previously registered for the path.
    pub fn register(&self, path: &str, tags: HashSet<String>) {
        self.unregister(path);
        if tags.is_empty() {
            return;
        }

        let mut t2p = rw_write(&self.tag_to_paths, SOURCE, "register");
        let mut p2t = rw_write(&self.path_to_tags, SOURCE, "register");

        for tag in &tags {
            t2p.entry(tag.clone()).or_default().insert(path.to_string());
        }
        p2t.insert(path.to_string(), tags);
    }

    /// Get all paths rendered under a tag.
    pub fn paths_for_tag(&self, tag: &str) -> HashSet<String> {
        rw_read(&self.tag_to_paths, SOURCE, "paths_for_tag")
            .get(tag)
            .cloned()
            .unwrap_or_default()
    }

    /// Get all tags a path was rendered under.
    pub fn tags_for_path(&self, path: &str) -> HashSet<String> {
        rw_read(&self.path_to_tags, SOURCE, "tags_for_path")
            .get(path)
            .cloned()
            .unwrap_or_default()
    }

    /// Remove a path and clean up its tag mappings.
    pub fn unregister(&self, path: &str) {
        let mut t2p = rw_write(&self.tag_to_paths, SOURCE, "unregister");
        let mut p2t = rw_write(&self.path_to_tags, SOURCE, "unregister");

        if let Some(tags) = p2t.remove(path) {
            for tag in tags {
                if let Some(paths) = t2p.get_mut(&tag) {
                    paths.remove(path);
                    if paths.is_empty() {
                        t2p.remove(&tag);
                    }
                }
            }
        }
    }

    /// Remove a tag and every path registered under it.
    ///
    /// Returns the affected paths so the caller can drop their cached bodies.
    pub fn take_tag(&self, tag: &str) -> HashSet<String> {
        let mut t2p = rw_write(&self.tag_to_paths, SOURCE, "take_tag");
        let mut p2t = rw_write(&self.path_to_tags, SOURCE, "take_tag");

        let paths = t2p.remove(tag).unwrap_or_default();
        for path in &paths {
            if let Some(tags) = p2t.remove(path) {
                for other in tags.iter().filter(|other| other.as_str() != tag) {
                    if let Some(siblings) = t2p.get_mut(other) {
                        siblings.remove(path);
                        if siblings.is_empty() {
                            t2p.remove(other);
                        }
                    }
                }
            }
        }
        paths
    }

    /// Clear all mappings.
    pub fn clear(&self) {
        rw_write(&self.tag_to_paths, SOURCE, "clear").clear();
        rw_write(&self.path_to_tags, SOURCE, "clear").clear();
    }

    /// Get the number of tracked tags.
    pub fn tag_count(&self) -> usize {
        rw_read(&self.tag_to_paths, SOURCE, "tag_count").len()
    }

    /// Get the number of tracked paths.
    pub fn path_count(&self) -> usize {
        rw_read(&self.path_to_tags, SOURCE, "path_count").len()
    }
}
