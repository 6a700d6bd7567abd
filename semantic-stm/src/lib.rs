//! Semantic short-term memory facade.
//!
//! Depend on this crate via `cargo add semantic-stm`. It bundles the engine
//! crates behind feature flags so downstream users can enable or disable
//! components as needed.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use stm_primitives as primitives;

/// The bounded memory engine (enabled by the `engine` feature).
#[cfg(feature = "engine")]
pub use stm_core as engine;

/// Envelope-based service surface (enabled by the `api` feature).
#[cfg(feature = "api")]
pub use stm_api as api;
