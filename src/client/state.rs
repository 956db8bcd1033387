//! Module `state`
//!
//! The connection lifecycle as data. A handler reads one [`Inbound`]
//! outcome at a time and asks [`transition`] what to do with it; all
//! protocol decisions live here, all I/O lives in the handler.

use std::fmt;
use std::io;

use crate::protocol::{Command, parse_command};

/// Lifecycle of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Prompt sent, waiting for the display name
    Handshake,
    /// Registered and exchanging messages
    Active,
    /// Unregistering and announcing the departure
    Closing,
    /// Terminal
    Closed,
}

/// Result of one receive on the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// One line, terminator removed
    Data(String),
    /// The peer closed its side
    Closed,
    Error(io::ErrorKind),
}

/// Why a connection left the active loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Quit,
    PeerClosed,
    Error(io::ErrorKind),
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Quit => write!(f, "quit"),
            CloseReason::PeerClosed => write!(f, "connection closed by peer"),
            CloseReason::Error(kind) => write!(f, "connection error: {}", kind),
            CloseReason::Shutdown => write!(f, "server shutting down"),
        }
    }
}

/// What the handler must do after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Register under this name and announce the join
    Register(String),
    /// Reply to the sender with everyone's names
    SendClientList,
    /// Relay this text to everyone but the sender
    Broadcast(String),
    /// Leave through the closing path
    Close(CloseReason),
    Ignore,
}

/// Computes the next state and action for one receive outcome.
pub fn transition(state: ConnectionState, inbound: Inbound) -> (ConnectionState, Action) {
    use ConnectionState::*;

    match (state, inbound) {
        (Handshake, Inbound::Data(line)) => (Active, Action::Register(line.trim().to_string())),
        (Handshake | Active, Inbound::Closed) => {
            (Closing, Action::Close(CloseReason::PeerClosed))
        }
        (Handshake | Active, Inbound::Error(kind)) => {
            (Closing, Action::Close(CloseReason::Error(kind)))
        }
        (Active, Inbound::Data(line)) => match parse_command(&line) {
            Command::List => (Active, Action::SendClientList),
            Command::Quit => (Closing, Action::Close(CloseReason::Quit)),
            Command::Message(text) => (Active, Action::Broadcast(text)),
        },
        (state @ (Closing | Closed), _) => (state, Action::Ignore),
    }
}
