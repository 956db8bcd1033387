//! Server lines sent to clients.

/// Sent once on connect, without a line terminator.
pub const NAME_PROMPT: &[u8] = b"Enter your name: ";

/// Reply to a line longer than the configured limit.
pub const MESSAGE_TOO_LONG: &[u8] = b"Message too long\n";

pub fn join_notice(name: &str) -> String {
    format!("{} joined the chat!\n", name)
}

pub fn leave_notice(name: &str) -> String {
    format!("{} left the chat!\n", name)
}

/// A chat message as the other clients see it.
pub fn chat_line(name: &str, message: &str) -> String {
    format!("[{}] {}\n", name, message)
}

/// Reply to `/list`.
pub fn client_list<'a, I>(names: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let names: Vec<&str> = names.into_iter().collect();
    format!("Current clients: {}\n", names.join(", "))
}
