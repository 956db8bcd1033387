//! Error types
//!
//! Delivery failures and disconnects are not errors at this level: the
//! broadcaster prunes failed recipients and handlers route every
//! disconnect through their closing path.

use std::io;

use thiserror::Error;

use crate::client::ClientId;

/// Client registry errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("client {0} is already registered")]
    AlreadyRegistered(ClientId),
}

/// Errors that stop the server from starting or running
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("bind address {0} did not resolve")]
    InvalidAddress(String),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
