//! Client registry
//!
//! The single structure shared across session tasks: the authoritative set
//! of currently registered clients, keyed by unique name. All access goes
//! through the registry mutex; the registry itself never touches the
//! network, so the lock is never held across I/O.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::client::state::{ClientHandle, ClientRecord, SessionState};
use crate::error::RegistryError;

/// Registry shared by every session task.
pub type SharedRegistry = Arc<Mutex<ClientRegistry>>;

/// Registry for tracking active clients.
///
/// Backed by a `Vec` so `snapshot()` iterates in registration order, which
/// fixes broadcast delivery order for the current membership.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Vec<ClientRecord>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: Vec::new(),
        }
    }

    /// Inserts a record for `name`, failing if the name is already taken.
    ///
    /// Uniqueness is checked and the insert performed under one lock
    /// acquisition by the caller, so two sessions racing on the same name
    /// cannot both succeed.
    pub fn register(
        &mut self,
        name: &str,
        handle: ClientHandle,
    ) -> Result<ClientRecord, RegistryError> {
        if self.clients.iter().any(|c| c.name() == name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }
        let record = ClientRecord::new(name.to_string(), handle);
        self.clients.push(record.clone());
        Ok(record)
    }

    /// Removes the record for `name`. Removing an absent name is a no-op.
    pub fn remove(&mut self, name: &str) {
        self.clients.retain(|c| c.name() != name);
    }

    /// Looks up a single record by name.
    pub fn lookup(&self, name: &str) -> Option<ClientRecord> {
        self.clients.iter().find(|c| c.name() == name).cloned()
    }

    /// Point-in-time copy of the membership, in registration order.
    ///
    /// Callers iterate the copy after releasing the registry lock, so an
    /// in-progress fan-out is never corrupted by a concurrent join or leave
    /// and a slow send never stalls registry access.
    pub fn snapshot(&self) -> Vec<ClientRecord> {
        self.clients.clone()
    }

    /// Updates the lifecycle state of `name`'s record, if present.
    ///
    /// Only the owning session task transitions its own record.
    pub fn set_state(&mut self, name: &str, state: SessionState) {
        if let Some(record) = self.clients.iter_mut().find(|c| c.name() == name) {
            record.set_state(state);
        }
    }

    /// Currently registered names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.clients.iter().map(|c| c.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
