//! Client registry
//!
//! The single source of truth for who is connected. Every operation takes
//! the lock for a plain map operation only; nothing here performs I/O.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use tokio::sync::Mutex;

use crate::client::{ClientHandle, ClientId};
use crate::error::RegistryError;

struct Registration {
    handle: ClientHandle,
    name: String,
}

/// Registry mapping connection ids to display names
pub struct ClientRegistry {
    clients: Mutex<BTreeMap<ClientId, Registration>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(BTreeMap::new()),
        }
    }

    /// Records `name` for the handle's connection.
    ///
    /// Names are stored as given; duplicates across clients are allowed.
    pub async fn register(&self, handle: ClientHandle, name: String) -> Result<(), RegistryError> {
        let mut clients = self.clients.lock().await;
        match clients.entry(handle.id()) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyRegistered(handle.id())),
            Entry::Vacant(slot) => {
                slot.insert(Registration { handle, name });
                Ok(())
            }
        }
    }

    /// Removes the connection, returning its name if it was registered.
    pub async fn unregister(&self, id: ClientId) -> Option<String> {
        self.clients
            .lock()
            .await
            .remove(&id)
            .map(|registration| registration.name)
    }

    /// Point-in-time copy of all entries in join order.
    pub async fn snapshot(&self) -> Vec<(ClientHandle, String)> {
        self.clients
            .lock()
            .await
            .values()
            .map(|registration| (registration.handle.clone(), registration.name.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
