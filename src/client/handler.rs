use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::client::lines::{LineReader, LineTooLong};
use crate::client::state::{Action, CloseReason, ConnectionState, transition};
use crate::client::{Broadcaster, ClientHandle, ClientRegistry};
use crate::events::{EventSink, ServerEvent};
use crate::protocol::responses::{
    MESSAGE_TOO_LONG, NAME_PROMPT, chat_line, client_list, join_notice, leave_notice,
};

/// State shared by every connection handler.
pub struct ChatContext {
    pub registry: Arc<ClientRegistry>,
    pub broadcaster: Broadcaster,
    pub events: Arc<dyn EventSink>,
    pub max_line_length: usize,
    /// Bound for replies sent straight back to one client
    pub write_timeout: Duration,
}

/// Owns one accepted connection from prompt to close.
///
/// - Reads newline-terminated lines of at most `max_line_length` bytes.
/// - Feeds each receive outcome through [`transition`] and performs the action.
/// - Always leaves through [`ConnectionHandler::close`], whatever the cause.
pub struct ConnectionHandler<R> {
    handle: ClientHandle,
    reader: LineReader<R>,
    state: ConnectionState,
    name: Option<String>,
    context: Arc<ChatContext>,
    shutdown: CancellationToken,
}

impl<R> ConnectionHandler<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pub fn new(
        handle: ClientHandle,
        reader: R,
        context: Arc<ChatContext>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            handle,
            reader: LineReader::new(reader, context.max_line_length),
            state: ConnectionState::Handshake,
            name: None,
            context,
            shutdown,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Runs the connection to completion.
    pub async fn run(mut self) -> ConnectionState {
        let reason = self.drive().await;
        self.close(reason).await;
        self.state
    }

    async fn drive(&mut self) -> CloseReason {
        if let Err(e) = self.reply(NAME_PROMPT).await {
            return CloseReason::Error(e.kind());
        }

        let shutdown = self.shutdown.clone();
        loop {
            let received = tokio::select! {
                received = self.reader.recv() => Some(received),
                _ = shutdown.cancelled() => None,
            };
            let inbound = match received {
                Some(Ok(inbound)) => inbound,
                Some(Err(LineTooLong)) => {
                    if let Err(e) = self.reject_oversized().await {
                        self.state = ConnectionState::Closing;
                        return CloseReason::Error(e.kind());
                    }
                    continue;
                }
                None => {
                    self.state = ConnectionState::Closing;
                    return CloseReason::Shutdown;
                }
            };

            let (next, action) = transition(self.state, inbound);
            self.state = next;

            let outcome = match action {
                Action::Register(name) => self.join(name).await,
                Action::SendClientList => self.send_client_list().await,
                Action::Broadcast(text) => {
                    self.relay(&text).await;
                    Ok(())
                }
                Action::Close(reason) => return reason,
                Action::Ignore => Ok(()),
            };

            if let Err(e) = outcome {
                self.state = ConnectionState::Closing;
                return CloseReason::Error(e.kind());
            }
        }
    }

    /// Sends directly to this connection under the write timeout.
    async fn reply(&self, payload: &[u8]) -> io::Result<()> {
        self.handle
            .send_timeout(payload, self.context.write_timeout)
            .await
    }

    async fn join(&mut self, name: String) -> io::Result<()> {
        let id = self.handle.id();
        let registry = &self.context.registry;

        if let Err(e) = registry.register(self.handle.clone(), name.clone()).await {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, e));
        }
        self.context.events.emit(ServerEvent::Joined {
            id,
            name: name.clone(),
            clients: registry.len().await,
        });

        self.context
            .broadcaster
            .deliver(join_notice(&name).as_bytes(), None)
            .await;
        self.name = Some(name);
        Ok(())
    }

    async fn send_client_list(&self) -> io::Result<()> {
        let snapshot = self.context.registry.snapshot().await;
        let reply = client_list(snapshot.iter().map(|(_, name)| name.as_str()));
        self.reply(reply.as_bytes()).await
    }

    async fn relay(&self, text: &str) {
        let name = self.name.as_deref().unwrap_or_default();
        let report = self
            .context
            .broadcaster
            .deliver(chat_line(name, text).as_bytes(), Some(self.handle.id()))
            .await;
        self.context.events.emit(ServerEvent::Relayed {
            id: self.handle.id(),
            name: name.to_string(),
            recipients: report.delivered,
        });
    }

    /// Oversized names are asked for again; oversized messages are dropped.
    async fn reject_oversized(&self) -> io::Result<()> {
        self.context.events.emit(ServerEvent::OversizedLine {
            id: self.handle.id(),
            limit: self.context.max_line_length,
        });
        self.reply(MESSAGE_TOO_LONG).await?;
        if self.state == ConnectionState::Handshake {
            self.reply(NAME_PROMPT).await?;
        }
        Ok(())
    }

    async fn close(&mut self, reason: CloseReason) {
        self.state = ConnectionState::Closing;
        let id = self.handle.id();
        let registry = &self.context.registry;

        match self.name.take() {
            Some(name) => {
                // None here means a broadcast already pruned us; stay quiet
                let removed = registry.unregister(id).await;
                self.context.events.emit(ServerEvent::Left {
                    id,
                    name,
                    reason,
                    clients: registry.len().await,
                });
                if let Some(removed) = removed {
                    self.context
                        .broadcaster
                        .deliver(leave_notice(&removed).as_bytes(), None)
                        .await;
                }
            }
            None => self.context.events.emit(ServerEvent::HandshakeAborted {
                id,
                peer: self.handle.peer(),
                reason,
            }),
        }

        let _ = self.handle.close().await;
        self.state = ConnectionState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientId;
    use crate::events::testing::RecordingSink;
    use std::net::SocketAddr;
    use tokio::io::{
        AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf,
    };
    use tokio::task::JoinHandle;

    struct Harness {
        registry: Arc<ClientRegistry>,
        sink: Arc<RecordingSink>,
        context: Arc<ChatContext>,
        shutdown: CancellationToken,
    }

    struct TestClient {
        reader: BufReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
        task: JoinHandle<ConnectionState>,
    }

    impl Harness {
        fn new(max_line_length: usize) -> Self {
            Self::with_write_timeout(max_line_length, Duration::from_secs(1))
        }

        fn with_write_timeout(max_line_length: usize, write_timeout: Duration) -> Self {
            let registry = Arc::new(ClientRegistry::new());
            let sink = Arc::new(RecordingSink::default());
            let events: Arc<dyn EventSink> = sink.clone();
            let context = Arc::new(ChatContext {
                registry: Arc::clone(&registry),
                broadcaster: Broadcaster::new(
                    Arc::clone(&registry),
                    write_timeout,
                    Arc::clone(&events),
                ),
                events,
                max_line_length,
                write_timeout,
            });
            Self {
                registry,
                sink,
                context,
                shutdown: CancellationToken::new(),
            }
        }

        fn connect(&self, id: u64) -> TestClient {
            self.connect_with_buffer(id, 4096)
        }

        // `buffer` bounds how much the handler can write before the client reads
        fn connect_with_buffer(&self, id: u64, buffer: usize) -> TestClient {
            let (server_side, client_side) = tokio::io::duplex(buffer);
            let (server_read, server_write) = tokio::io::split(server_side);
            let (client_read, client_write) = tokio::io::split(client_side);
            let peer: SocketAddr = "127.0.0.1:40000".parse().unwrap();

            let handle = ClientHandle::new(ClientId::new(id), peer, server_write);
            let handler = ConnectionHandler::new(
                handle,
                server_read,
                Arc::clone(&self.context),
                self.shutdown.child_token(),
            );
            TestClient {
                reader: BufReader::new(client_read),
                writer: client_write,
                task: tokio::spawn(handler.run()),
            }
        }
    }

    impl TestClient {
        async fn expect_prompt(&mut self) {
            let mut prompt = vec![0u8; NAME_PROMPT.len()];
            self.reader.read_exact(&mut prompt).await.unwrap();
            assert_eq!(prompt, NAME_PROMPT);
        }

        async fn send(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
        }

        async fn line(&mut self) -> String {
            let mut line = String::new();
            self.reader.read_line(&mut line).await.unwrap();
            line
        }

        async fn join(&mut self, name: &str) {
            self.expect_prompt().await;
            self.send(&format!("{name}\n")).await;
            assert_eq!(self.line().await, join_notice(name));
        }
    }

    #[tokio::test]
    async fn test_handshake_registers_and_announces_to_self() {
        let harness = Harness::new(64);
        let mut alice = harness.connect(1);

        alice.join("Alice").await;

        let snapshot = harness.registry.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].1, "Alice");
    }

    #[tokio::test]
    async fn test_list_then_quit() {
        let harness = Harness::new(64);
        let mut alice = harness.connect(1);
        let mut bob = harness.connect(2);
        alice.join("Alice").await;
        bob.join("Bob").await;
        assert_eq!(alice.line().await, "Bob joined the chat!\n");

        alice.send("/list\n").await;
        assert_eq!(alice.line().await, "Current clients: Alice, Bob\n");

        alice.send("/quit\n").await;
        assert_eq!(alice.line().await, "");
        assert_eq!((&mut alice.task).await.unwrap(), ConnectionState::Closed);
        assert_eq!(bob.line().await, "Alice left the chat!\n");
        assert_eq!(harness.registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_message_relayed_with_name_prefix() {
        let harness = Harness::new(64);
        let mut alice = harness.connect(1);
        let mut bob = harness.connect(2);
        alice.join("Alice").await;
        bob.join("Bob").await;
        alice.line().await;

        alice.send("Hello everyone!\r\n").await;
        assert_eq!(bob.line().await, "[Alice] Hello everyone!\n");

        // no echo: the next thing alice reads is the /list reply
        alice.send("/list\n").await;
        assert_eq!(alice.line().await, "Current clients: Alice, Bob\n");
    }

    #[tokio::test]
    async fn test_unterminated_fragment_relayed_before_leave() {
        let harness = Harness::new(64);
        let mut alice = harness.connect(1);
        let mut bob = harness.connect(2);
        alice.join("Alice").await;
        bob.join("Bob").await;
        assert_eq!(alice.line().await, "Bob joined the chat!\n");

        alice.send("tail").await;
        alice.writer.shutdown().await.unwrap();

        assert_eq!(bob.line().await, "[Alice] tail\n");
        assert_eq!(bob.line().await, "Alice left the chat!\n");
        assert_eq!((&mut alice.task).await.unwrap(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_oversized_message_rejected() {
        let harness = Harness::new(8);
        let mut alice = harness.connect(1);
        let mut bob = harness.connect(2);
        alice.join("Alice").await;
        bob.join("Bob").await;
        alice.line().await;

        alice.send("this line is far too long\n").await;
        assert_eq!(alice.line().await, "Message too long\n");
        alice.send("short\n").await;
        assert_eq!(bob.line().await, "[Alice] short\n");
    }

    #[tokio::test]
    async fn test_oversized_name_prompts_again() {
        let harness = Harness::new(4);
        let mut client = harness.connect(1);
        client.expect_prompt().await;

        client.send("Bartholomew\n").await;
        assert_eq!(client.line().await, "Message too long\n");
        assert!(harness.registry.is_empty().await);

        client.join("Bart").await;
        assert_eq!(harness.registry.len().await, 1);
        assert!(harness.sink.events().contains(&ServerEvent::OversizedLine {
            id: ClientId::new(1),
            limit: 4,
        }));
    }

    #[tokio::test]
    async fn test_pruned_client_leaves_silently() {
        let harness = Harness::with_write_timeout(64, Duration::from_millis(50));
        let mut alice = harness.connect(1);
        let mut bob = harness.connect_with_buffer(2, 64);
        alice.join("Alice").await;
        bob.join("Bob").await;
        assert_eq!(alice.line().await, "Bob joined the chat!\n");

        // bob stops reading, so a relay larger than his pipe times out
        alice.send(&format!("{}\n", "x".repeat(60))).await;
        alice.send("/list\n").await;
        assert_eq!(alice.line().await, "Current clients: Alice\n");
        assert_eq!(harness.registry.len().await, 1);

        bob.send("/quit\n").await;
        assert_eq!((&mut bob.task).await.unwrap(), ConnectionState::Closed);

        // a leave notice for bob would arrive ahead of this reply
        alice.send("/list\n").await;
        assert_eq!(alice.line().await, "Current clients: Alice\n");
        assert!(harness.sink.events().iter().any(|event| matches!(
            event,
            ServerEvent::Left { name, reason: CloseReason::Quit, clients: 1, .. } if name == "Bob"
        )));
    }

    #[tokio::test]
    async fn test_unread_direct_reply_times_out() {
        let harness = Harness::with_write_timeout(64, Duration::from_millis(50));
        let mut client = harness.connect_with_buffer(1, 32);
        client.join("Al").await;

        // each reply is 20 bytes; the second cannot fit in the pipe
        client.send("/list\n/list\n/list\n").await;

        assert_eq!((&mut client.task).await.unwrap(), ConnectionState::Closed);
        assert!(harness.registry.is_empty().await);
        assert!(harness.sink.events().iter().any(|event| matches!(
            event,
            ServerEvent::Left {
                reason: CloseReason::Error(io::ErrorKind::TimedOut),
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_disconnect_during_handshake_registers_nothing() {
        let harness = Harness::new(64);
        let mut client = harness.connect(1);
        client.expect_prompt().await;
        client.writer.shutdown().await.unwrap();

        assert_eq!(client.task.await.unwrap(), ConnectionState::Closed);
        assert!(harness.registry.is_empty().await);
        assert!(harness.sink.events().iter().any(|event| matches!(
            event,
            ServerEvent::HandshakeAborted {
                reason: CloseReason::PeerClosed,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_idle_handler() {
        let harness = Harness::new(64);
        let mut alice = harness.connect(1);
        alice.join("Alice").await;

        harness.shutdown.cancel();

        assert_eq!(alice.task.await.unwrap(), ConnectionState::Closed);
        assert!(harness.registry.is_empty().await);
        assert!(harness.sink.events().iter().any(|event| matches!(
            event,
            ServerEvent::Left {
                reason: CloseReason::Shutdown,
                ..
            }
        )));
    }
}
