//! Broadcast delivery
//!
//! Delivery works from a registry snapshot, so the registry lock is never
//! held while a send is in flight. Recipients whose send fails or times out
//! are unregistered after the pass; the sender never sees those failures.

use std::sync::Arc;
use std::time::Duration;

use crate::client::{ClientId, ClientRegistry};
use crate::events::{EventSink, ServerEvent};

/// Outcome of one [`Broadcaster::deliver`] call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub pruned: Vec<ClientId>,
}

#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ClientRegistry>,
    write_timeout: Duration,
    events: Arc<dyn EventSink>,
}

impl Broadcaster {
    pub fn new(
        registry: Arc<ClientRegistry>,
        write_timeout: Duration,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            registry,
            write_timeout,
            events,
        }
    }

    /// Sends `payload` to every registered client except `exclude`.
    pub async fn deliver(&self, payload: &[u8], exclude: Option<ClientId>) -> DeliveryReport {
        let snapshot = self.registry.snapshot().await;
        let mut report = DeliveryReport::default();

        for (handle, _) in snapshot.iter().filter(|(h, _)| Some(h.id()) != exclude) {
            if let Err(e) = handle.send_timeout(payload, self.write_timeout).await {
                self.events.emit(ServerEvent::DeliveryFailed {
                    id: handle.id(),
                    error: e.to_string(),
                });
                report.pruned.push(handle.id());
                continue;
            }
            report.delivered += 1;
        }

        for id in &report.pruned {
            if let Some(name) = self.registry.unregister(*id).await {
                self.events.emit(ServerEvent::Pruned { id: *id, name });
            }
        }

        report
    }
}
