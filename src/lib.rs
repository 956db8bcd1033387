//! Multi-client TCP chat relay
//!
//! Clients connect, answer a name prompt and then exchange newline
//! terminated messages that the server relays to everyone else.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod protocol;
pub mod server;
pub mod utils;

pub use config::ServerConfig;
pub use server::Server;
