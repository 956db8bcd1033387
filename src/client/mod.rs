//! Client management system
//!
//! Connection handles, the shared registry of named clients, broadcast
//! delivery, bounded line framing and the per-connection state machine.

pub mod broadcast;
pub mod handle;
pub mod handler;
pub mod lines;
pub mod registry;
pub mod state;

pub use broadcast::{Broadcaster, DeliveryReport};
pub use handle::{ClientHandle, ClientId};
pub use handler::{ChatContext, ConnectionHandler};
pub use lines::{LineReader, LineTooLong};
pub use registry::ClientRegistry;
pub use state::{Action, CloseReason, ConnectionState, Inbound, transition};
