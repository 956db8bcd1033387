//! Utility functions
//!
//! Provides logging setup and process signal helpers for the binary.

pub mod logging;
pub mod signal;
