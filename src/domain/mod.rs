//! Domain layer types and invariants.

pub mod changes;
pub mod error;
