//! Server core functionality
//!
//! Binds the listening socket, accepts connections and supervises one
//! handler task per connection.

pub mod core;

pub use core::Server;
