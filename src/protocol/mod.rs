//! Chat wire protocol
//!
//! Command parsing for client lines and formatting of every server line.

pub mod commands;
pub mod responses;

pub use commands::{Command, parse_command};
