//! Message dispatch
//!
//! Turns an operator send request into a message plus its delivery fan-out.
//! Broadcasts stay open: clients known now get a record immediately, and
//! clients that show up later get theirs from [`MessageStore::pending_for`].

use std::sync::Arc;

use tracing::{info, warn};

use crate::client::ClientRegistry;
use crate::message::{Message, MessageStore, Scope};
use crate::Result;

/// Stateless dispatch over the registry and message store
pub struct Dispatcher {
    registry: Arc<ClientRegistry>,
    store: Arc<MessageStore>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ClientRegistry>, store: Arc<MessageStore>) -> Self {
        Self { registry, store }
    }

    /// Validate, create and fan out a message
    pub fn dispatch(
        &self,
        url: &str,
        text: &str,
        scope: Scope,
        target_id: Option<&str>,
    ) -> Result<Message> {
        let message = self.store.create_message(url, text, scope, target_id)?;

        match scope {
            Scope::Broadcast => {
                let fanned_out = self.fan_out(&message);
                info!(
                    "Dispatched broadcast #{} to {} known client(s)",
                    message.id, fanned_out
                );
            }
            Scope::Targeted => {
                info!(
                    "Dispatched message #{} to client {}",
                    message.id,
                    message.target_id.as_deref().unwrap_or_default()
                );
            }
        }

        Ok(message)
    }

    /// Dispatch to every client, present and future
    pub fn broadcast(&self, url: &str, text: &str) -> Result<Message> {
        self.dispatch(url, text, Scope::Broadcast, None)
    }

    /// Dispatch to one known client
    pub fn send(&self, client_id: &str, url: &str, text: &str) -> Result<Message> {
        self.dispatch(url, text, Scope::Targeted, Some(client_id))
    }

    /// Eager records for currently known clients.
    ///
    /// Failures are logged only: late delivery is guaranteed by
    /// `pending_for`, this step just makes receipts visible sooner.
    fn fan_out(&self, message: &Message) -> usize {
        let clients = match self.registry.list() {
            Ok(clients) => clients,
            Err(e) => {
                warn!("Broadcast #{} fan-out skipped: {}", message.id, e);
                return 0;
            }
        };

        let mut created = 0;
        for client in &clients {
            match self.store.record_delivery_if_absent(message.id, &client.machine_id) {
                Ok(true) => created += 1,
                Ok(false) => {}
                Err(e) => warn!(
                    "Broadcast #{} fan-out to {} failed: {}",
                    message.id, client.machine_id, e
                ),
            }
        }
        created
    }
}
