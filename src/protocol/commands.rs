//! Module `commands`
//!
//! Turns one received client line into a [`Command`].

/// A line received from a client in the active state.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Command {
    /// `/list`: reply with the names of everyone connected
    List,
    /// `/quit`: leave the chat
    Quit,
    /// Anything else is chat text for the other clients
    Message(String),
}

/// Parses a raw client line.
///
/// Surrounding whitespace (including the line terminator) is stripped first.
/// Commands are matched exactly and case-sensitively; `/LIST` or `/list now`
/// are plain messages.
pub fn parse_command(raw: &str) -> Command {
    match raw.trim() {
        "/list" => Command::List,
        "/quit" => Command::Quit,
        text => Command::Message(text.to_string()),
    }
}
