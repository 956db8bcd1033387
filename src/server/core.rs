use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket, TcpStream, lookup_host};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::client::{
    Broadcaster, ChatContext, ClientHandle, ClientId, ClientRegistry, ConnectionHandler,
    ConnectionState,
};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::events::{EventSink, LogSink, ServerEvent};

/// Pause after a failed accept so a persistent error (EMFILE) cannot spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// The chat relay listener.
///
/// Accepts connections until shut down, spawning one handler task per
/// connection. Handlers are tracked so shutdown can cancel and join them.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: Arc<ServerConfig>,
    context: Arc<ChatContext>,
    shutdown: CancellationToken,
    next_id: u64,
}

impl Server {
    /// Binds with events going to the `log` facade.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        Self::bind_with_events(config, Arc::new(LogSink)).await
    }

    pub async fn bind_with_events(
        config: ServerConfig,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, ServerError> {
        config.validate()?;

        let address = config.bind_address();
        let addr = lookup_host(&address)
            .await
            .map_err(|source| ServerError::Bind {
                addr: address.clone(),
                source,
            })?
            .next()
            .ok_or_else(|| ServerError::InvalidAddress(address.clone()))?;

        let listener = bind_listener(addr, config.backlog).map_err(|source| ServerError::Bind {
            addr: address.clone(),
            source,
        })?;
        let local_addr = listener.local_addr()?;

        let registry = Arc::new(ClientRegistry::new());
        let broadcaster = Broadcaster::new(
            Arc::clone(&registry),
            config.write_timeout(),
            Arc::clone(&events),
        );
        let context = Arc::new(ChatContext {
            registry,
            broadcaster,
            events,
            max_line_length: config.max_line_length,
            write_timeout: config.write_timeout(),
        });

        Ok(Self {
            listener,
            local_addr,
            config: Arc::new(config),
            context,
            shutdown: CancellationToken::new(),
            next_id: 1,
        })
    }

    /// The address actually bound, useful when the configured port is 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.context.registry)
    }

    /// Cancelling this token stops the server.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs until [`Server::shutdown_token`] is cancelled.
    pub async fn run(self) {
        let token = self.shutdown.clone();
        self.run_until(async move { token.cancelled().await }).await
    }

    /// Runs until `signal` resolves or the shutdown token is cancelled, then
    /// closes the listening socket and drains the handlers.
    pub async fn run_until<F>(mut self, signal: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(signal);
        let events = Arc::clone(&self.context.events);
        let mut handlers: JoinSet<ConnectionState> = JoinSet::new();

        events.emit(ServerEvent::Listening {
            addr: self.local_addr,
        });

        loop {
            tokio::select! {
                _ = &mut signal => break,
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_handler(&mut handlers, stream, peer),
                    Err(e) => accept_failed(events.as_ref(), e).await,
                },
                Some(finished) = handlers.join_next(), if !handlers.is_empty() => {
                    report_finished(events.as_ref(), finished);
                }
            }
        }

        let Server {
            listener,
            config,
            shutdown,
            ..
        } = self;
        drop(listener);
        shutdown.cancel();
        drain(handlers, config.shutdown_grace(), events.as_ref()).await;
        events.emit(ServerEvent::Stopped);
    }

    fn spawn_handler(
        &mut self,
        handlers: &mut JoinSet<ConnectionState>,
        stream: TcpStream,
        peer: SocketAddr,
    ) {
        let id = ClientId::new(self.next_id);
        self.next_id += 1;

        let (read_half, write_half) = stream.into_split();
        let handle = ClientHandle::new(id, peer, write_half);
        self.context
            .events
            .emit(ServerEvent::Connected { id, peer });

        let handler = ConnectionHandler::new(
            handle,
            read_half,
            Arc::clone(&self.context),
            self.shutdown.child_token(),
        );
        handlers.spawn(handler.run());
    }
}

async fn accept_failed(events: &dyn EventSink, error: io::Error) {
    events.emit(ServerEvent::AcceptFailed {
        error: error.to_string(),
    });
    sleep(ACCEPT_BACKOFF).await;
}

fn bind_listener(addr: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(backlog)
}

/// Joins every handler, aborting whatever is still running after `grace`.
async fn drain(
    mut handlers: JoinSet<ConnectionState>,
    grace: Duration,
    events: &dyn EventSink,
) {
    events.emit(ServerEvent::ShuttingDown {
        handlers: handlers.len(),
    });

    let joined = timeout(grace, async {
        while let Some(finished) = handlers.join_next().await {
            report_finished(events, finished);
        }
    })
    .await;

    if joined.is_err() {
        events.emit(ServerEvent::DrainTimedOut {
            remaining: handlers.len(),
        });
        handlers.shutdown().await;
    }
}

fn report_finished(events: &dyn EventSink, finished: Result<ConnectionState, JoinError>) {
    if let Err(e) = finished {
        if e.is_panic() {
            events.emit(ServerEvent::HandlerPanicked {
                error: e.to_string(),
            });
        }
    }
}
