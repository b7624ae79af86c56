//! Shared types for the arbor dynamics engine.
//!
//! This crate is the leaf of the workspace: it defines the error taxonomy
//! ([`SimError`]) and the scene configuration document ([`SceneConfig`])
//! consumed by `arbor-core`. It carries no simulation logic.

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]

mod config;
mod error;

pub use config::{SceneConfig, Scenario, Stabilization};
pub use error::SimError;
