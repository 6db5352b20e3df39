//! Content-change notification and render-cache invalidation.
//!
//! The emitter side runs next to the content store and posts change
//! descriptors after writes commit. The invalidator side authenticates those
//! notifications and strikes the affected paths and tag groups from the
//! render cache.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
