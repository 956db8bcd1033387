//! Server events
//!
//! The relay core reports what happens through an [`EventSink`] instead of
//! writing to the console. [`LogSink`] forwards everything to the `log`
//! facade; tests and embedders can supply their own sink.

use std::net::SocketAddr;

use log::{debug, error, info, warn};

use crate::client::{ClientId, CloseReason};

/// Something observable that happened inside the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    Listening {
        addr: SocketAddr,
    },
    AcceptFailed {
        error: String,
    },
    Connected {
        id: ClientId,
        peer: SocketAddr,
    },
    /// The peer went away before sending a name.
    HandshakeAborted {
        id: ClientId,
        peer: SocketAddr,
        reason: CloseReason,
    },
    Joined {
        id: ClientId,
        name: String,
        clients: usize,
    },
    Left {
        id: ClientId,
        name: String,
        reason: CloseReason,
        clients: usize,
    },
    Relayed {
        id: ClientId,
        name: String,
        recipients: usize,
    },
    DeliveryFailed {
        id: ClientId,
        error: String,
    },
    Pruned {
        id: ClientId,
        name: String,
    },
    OversizedLine {
        id: ClientId,
        limit: usize,
    },
    ShuttingDown {
        handlers: usize,
    },
    DrainTimedOut {
        remaining: usize,
    },
    HandlerPanicked {
        error: String,
    },
    Stopped,
}

/// Destination for [`ServerEvent`]s.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ServerEvent);
}

/// Sink that writes every event through the `log` macros.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: ServerEvent) {
        match event {
            ServerEvent::Listening { addr } => info!("Chat relay listening on {}", addr),
            ServerEvent::AcceptFailed { error } => error!("Error accepting connection: {}", error),
            ServerEvent::Connected { id, peer } => debug!("Client {} connected from {}", id, peer),
            ServerEvent::HandshakeAborted { id, peer, reason } => {
                info!("Client {} ({}) left before naming itself: {}", id, peer, reason)
            }
            ServerEvent::Joined { id, name, clients } => {
                info!("{} joined as client {} ({} clients)", name, id, clients)
            }
            ServerEvent::Left {
                id,
                name,
                reason,
                clients,
            } => info!("{} (client {}) left: {} ({} clients)", name, id, reason, clients),
            ServerEvent::Relayed {
                id,
                name,
                recipients,
            } => debug!("[{}] client {} relayed to {} recipients", name, id, recipients),
            ServerEvent::DeliveryFailed { id, error } => {
                warn!("Delivery to client {} failed: {}", id, error)
            }
            ServerEvent::Pruned { id, name } => {
                warn!("Pruned unreachable client {} ({})", id, name)
            }
            ServerEvent::OversizedLine { id, limit } => {
                warn!("Client {} sent a line over {} bytes", id, limit)
            }
            ServerEvent::ShuttingDown { handlers } => {
                info!("Shutting down, draining {} handlers", handlers)
            }
            ServerEvent::DrainTimedOut { remaining } => {
                warn!("Aborting {} handlers that did not finish in time", remaining)
            }
            ServerEvent::HandlerPanicked { error } => error!("Connection handler panicked: {}", error),
            ServerEvent::Stopped => info!("Chat relay stopped"),
        }
    }
}
