//! Application services: the change emitter and the invalidator.

pub mod emitter;
pub mod error;
pub mod invalidator;
