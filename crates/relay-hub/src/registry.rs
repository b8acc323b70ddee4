//! Server-side map from connection id to live connection.
//!
//! A single mutex guards the map. At most one entry exists per id; a
//! duplicate registration fails without touching the existing entry.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::errors::RegistryError;
use crate::metrics as names;

/// Live connections keyed by id.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<String, Arc<Connection>>>,
}

impl ConnectionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `conn` and link it back to this registry so that closing it
    /// unregisters it.
    pub fn register(self: &Arc<Self>, conn: &Arc<Connection>) -> Result<(), RegistryError> {
        {
            let mut map = self.connections.lock();
            if map.contains_key(conn.id()) {
                counter!(names::REGISTRY_DUPLICATES_TOTAL).increment(1);
                warn!(connection_id = %conn.id(), "duplicate connection id rejected");
                return Err(RegistryError::Duplicate {
                    id: conn.id().to_owned(),
                });
            }
            let _ = map.insert(conn.id().to_owned(), Arc::clone(conn));
        }
        conn.attach_registry(Arc::downgrade(self));
        debug!(connection_id = %conn.id(), "connection registered");
        Ok(())
    }

    /// Remove the entry for `id`, if any. Idempotent.
    pub fn unregister(&self, id: &str) -> Option<Arc<Connection>> {
        let removed = self.connections.lock().remove(id);
        if removed.is_some() {
            debug!(connection_id = %id, "connection unregistered");
        }
        removed
    }

    /// Remove the entry for `id` only if it is still the instance `serial`.
    pub(crate) fn unregister_instance(&self, id: &str, serial: u64) -> bool {
        let mut map = self.connections.lock();
        if map.get(id).is_some_and(|c| c.serial() == serial) {
            let _ = map.remove(id);
            true
        } else {
            false
        }
    }

    /// Replace whatever is registered under `conn`'s id with `conn`, in one
    /// critical section. Returns the displaced connection.
    pub fn reset(self: &Arc<Self>, conn: &Arc<Connection>) -> Option<Arc<Connection>> {
        let previous = self
            .connections
            .lock()
            .insert(conn.id().to_owned(), Arc::clone(conn));
        conn.attach_registry(Arc::downgrade(self));
        debug!(connection_id = %conn.id(), replaced = previous.is_some(), "connection reset");
        previous
    }

    /// Connection registered under `id`.
    pub fn get(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.lock().get(id).cloned()
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.connections.lock().contains_key(id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.connections.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// All registered connections.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.lock().values().cloned().collect()
    }
}
