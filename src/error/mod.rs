//! Error handling
//!
//! Defines error types for the registry and the listening server.

pub mod types;

pub use types::*;
