//! liverec common utilities
//!
//! Shared infrastructure for all liverec crates:
//! - Error types, result aliases and failure classification
//! - Recording wall-clock anchoring and duration formatting
//! - Tracing/logging initialization
//! - Fleet configuration loading and validation

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
