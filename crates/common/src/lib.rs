//! Cadence Common Utilities
//!
//! Shared infrastructure for all Cadence crates:
//! - Error types and result aliases
//! - Floating-point tolerance helpers for duration comparisons
//! - Tracing/logging initialization
//! - Configuration loading

pub mod config;
pub mod error;
pub mod logging;
pub mod tolerance;

pub use config::*;
pub use error::*;
pub use tolerance::*;
