//! Gateway: the single API surface for every front-end
//!
//! The HTTP routes and the Telegram bridge both go through [`Gateway`].
//! Operator actions take an [`Operator`], which can only be obtained by
//! presenting the admin secret or by an entry point that has done its own
//! authorization ([`Operator::bridge`]). Where a request came from is
//! logged but never stored.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::AdminSecret;
use crate::client::{Client, ClientRegistry};
use crate::config::Config;
use crate::db::Database;
use crate::dispatch::Dispatcher;
use crate::message::{DeliveryRecord, Message, MessageId, MessageStore};
use crate::receipts::ReceiptTracker;
use crate::{Error, Result};

/// Proof that an operator entry point authenticated the caller
#[derive(Debug, Clone)]
pub struct Operator {
    origin: String,
}

impl Operator {
    /// Operator authorized by another channel (e.g. an allow-listed chat)
    pub fn bridge(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }
}

/// One row of the operator's client listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSummary {
    pub client_id: String,
    pub display_label: Option<String>,
    pub platform: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Delivery records not yet acknowledged
    pub unread: usize,
}

impl ClientSummary {
    fn new(client: Client, unread: usize) -> Self {
        Self {
            client_id: client.machine_id,
            display_label: client.display_label,
            platform: client.platform,
            first_seen: client.first_seen,
            last_seen: client.last_seen,
            unread,
        }
    }
}

/// Broadcast server API surface
pub struct Gateway {
    admin_secret: AdminSecret,
    registry: Arc<ClientRegistry>,
    store: Arc<MessageStore>,
    dispatcher: Dispatcher,
    receipts: ReceiptTracker,
    recent_limit: usize,
}

impl Gateway {
    /// Build the component graph over an existing database
    pub fn new(db: Arc<Database>, admin_secret: impl Into<AdminSecret>) -> Self {
        Self::with_options(db, admin_secret, None, 10)
    }

    fn with_options(
        db: Arc<Database>,
        admin_secret: impl Into<AdminSecret>,
        open_broadcasts: Option<usize>,
        recent_limit: usize,
    ) -> Self {
        let registry = Arc::new(ClientRegistry::new(Arc::clone(&db)));
        let store = Arc::new(
            MessageStore::new(db, Arc::clone(&registry)).with_open_broadcasts(open_broadcasts),
        );
        Self {
            admin_secret: admin_secret.into(),
            dispatcher: Dispatcher::new(Arc::clone(&registry), Arc::clone(&store)),
            receipts: ReceiptTracker::new(Arc::clone(&registry), Arc::clone(&store)),
            registry,
            store,
            recent_limit,
        }
    }

    /// Open the configured database and build the gateway
    pub fn from_config(config: &Config) -> Result<Self> {
        let db = if config.storage.db_path == ":memory:" {
            Database::in_memory()?
        } else {
            Database::open(&config.storage.db_path)?
        };
        Ok(Self::with_options(
            Arc::new(db),
            config.server.admin_secret.as_str(),
            config.dispatch.open_broadcasts,
            config.dispatch.recent_limit,
        ))
    }

    /// Check the admin secret
    pub fn authenticate(&self, secret: Option<&str>) -> Result<Operator> {
        match secret {
            Some(secret) if self.admin_secret.verify(secret) => Ok(Operator {
                origin: "admin-secret".to_string(),
            }),
            _ => {
                warn!("Rejected operator request: invalid admin secret");
                Err(Error::Auth)
            }
        }
    }

    // ========================================================================
    // Operator actions
    // ========================================================================

    /// Broadcast to every client
    pub fn broadcast(&self, operator: &Operator, url: &str, text: &str) -> Result<Message> {
        let message = self.dispatcher.broadcast(url, text)?;
        info!("Broadcast #{} queued via {}", message.id, operator.origin());
        Ok(message)
    }

    /// Send to one registered client
    pub fn send(
        &self,
        operator: &Operator,
        client_id: &str,
        url: &str,
        text: &str,
    ) -> Result<Message> {
        let message = self.dispatcher.send(client_id, url, text)?;
        info!(
            "Message #{} for {} queued via {}",
            message.id,
            client_id,
            operator.origin()
        );
        Ok(message)
    }

    /// Client listing with unread counts, most recently seen first
    pub fn clients(&self, _operator: &Operator) -> Result<Vec<ClientSummary>> {
        let unread = self.store.unread_counts()?;
        Ok(self
            .registry
            .list()?
            .into_iter()
            .map(|client| {
                let count = unread.get(&client.machine_id).copied().unwrap_or(0);
                ClientSummary::new(client, count)
            })
            .collect())
    }

    /// Single client entry
    pub fn client(&self, _operator: &Operator, client_id: &str) -> Result<ClientSummary> {
        let client = self.registry.get(client_id)?;
        let unread = self.store.unread_count(&client.machine_id)?;
        Ok(ClientSummary::new(client, unread))
    }

    /// Delivery records of one message
    pub fn receipts(&self, _operator: &Operator, message_id: MessageId) -> Result<Vec<DeliveryRecord>> {
        self.store.receipts_for(message_id)
    }

    /// Most recent messages, newest first; `None` uses the configured default
    pub fn recent_messages(&self, _operator: &Operator, limit: Option<usize>) -> Result<Vec<Message>> {
        self.store.recent(limit.unwrap_or(self.recent_limit))
    }

    // ========================================================================
    // Client actions (authenticated only by possessing the machine id)
    // ========================================================================

    /// Explicit registration with descriptive attributes
    pub fn register(
        &self,
        client_id: &str,
        label: Option<&str>,
        platform: Option<&str>,
    ) -> Result<Client> {
        self.registry.register_or_touch(client_id, label, platform)
    }

    /// Pending messages for the client, marked delivered
    pub fn poll(&self, client_id: &str) -> Result<Vec<Message>> {
        self.receipts.on_poll(client_id, None, None)
    }

    /// Read acknowledgement
    pub fn ack(&self, client_id: &str, message_id: MessageId) -> Result<bool> {
        self.receipts.on_read(message_id, client_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> Gateway {
        Gateway::new(Arc::new(Database::in_memory().unwrap()), "s3cret")
    }

    #[test]
    fn test_authenticate() {
        let gw = gateway();
        assert!(gw.authenticate(Some("s3cret")).is_ok());
        assert!(matches!(gw.authenticate(Some("wrong")), Err(Error::Auth)));
        assert!(matches!(gw.authenticate(None), Err(Error::Auth)));
    }

    #[test]
    fn test_broadcast_poll_ack_scenario() {
        let gw = gateway();
        let op = gw.authenticate(Some("s3cret")).unwrap();

        let msg = gw.broadcast(&op, "https://example.com/x", "hello").unwrap();

        let polled = gw.poll("m-1").unwrap();
        assert_eq!(polled.len(), 1);
        assert_eq!(polled[0].id, msg.id);
        assert_eq!(polled[0].url, "https://example.com/x");
        assert_eq!(polled[0].text, "hello");

        let receipts = gw.receipts(&op, msg.id).unwrap();
        assert!(receipts[0].delivered_at.is_some());
        assert!(receipts[0].read_at.is_none());

        assert!(gw.ack("m-1", msg.id).unwrap());
        let receipts = gw.receipts(&op, msg.id).unwrap();
        assert!(receipts[0].read_at.is_some());

        let clients = gw.clients(&op).unwrap();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].client_id, "m-1");
        assert_eq!(clients[0].unread, 0);
    }

    #[test]
    fn test_send_to_unknown_client_creates_nothing() {
        let gw = gateway();
        let op = gw.authenticate(Some("s3cret")).unwrap();

        let err = gw.send(&op, "m-404", "https://example.com", "hi").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(gw.recent_messages(&op, None).unwrap().is_empty());
    }

    #[test]
    fn test_ack_of_unsent_message() {
        let gw = gateway();
        let op = gw.authenticate(Some("s3cret")).unwrap();
        gw.register("m-1", None, None).unwrap();
        let msg = gw.send(&op, "m-1", "https://example.com", "hi").unwrap();

        gw.register("m-2", None, None).unwrap();
        assert!(matches!(gw.ack("m-2", msg.id), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_bridge_operator_uses_same_pipeline() {
        let gw = gateway();
        let bot = Operator::bridge("telegram:42");
        gw.register("m-1", Some("desk"), None).unwrap();

        let msg = gw.send(&bot, "m-1", "https://example.com", "hi").unwrap();
        assert_eq!(gw.poll("m-1").unwrap()[0].id, msg.id);

        let summary = gw.client(&bot, "m-1").unwrap();
        assert_eq!(summary.display_label.as_deref(), Some("desk"));
        assert_eq!(summary.unread, 1);
    }

    #[test]
    fn test_machine_ids_are_not_normalized() {
        let gw = gateway();
        let op = Operator::bridge("test");
        let msg = gw.broadcast(&op, "https://example.com", "hi").unwrap();

        assert_eq!(gw.poll("m-1").unwrap().len(), 1);
        assert!(matches!(gw.poll(" m-1 "), Err(Error::Validation(_))));
        assert!(matches!(
            gw.send(&op, " m-1", "https://example.com", "hi"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(gw.ack("m-1 ", msg.id), Err(Error::Validation(_))));
        assert_eq!(gw.clients(&op).unwrap().len(), 1);
    }

    #[test]
    fn test_client_lookup_unknown() {
        let gw = gateway();
        let op = Operator::bridge("test");
        assert!(matches!(gw.client(&op, "nobody"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_from_config_in_memory() {
        let mut config = Config::default();
        config.storage.db_path = ":memory:".to_string();
        config.dispatch.recent_limit = 1;
        let gw = Gateway::from_config(&config).unwrap();
        let op = gw.authenticate(Some(crate::config::DEFAULT_ADMIN_SECRET)).unwrap();

        gw.broadcast(&op, "https://example.com/1", "one").unwrap();
        gw.broadcast(&op, "https://example.com/2", "two").unwrap();
        assert_eq!(gw.recent_messages(&op, None).unwrap().len(), 1);
        assert_eq!(gw.recent_messages(&op, Some(5)).unwrap().len(), 2);
    }

    #[test]
    fn test_state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.db_path = dir.path().join("bmsg.db").to_string_lossy().into_owned();

        let msg_id = {
            let gw = Gateway::from_config(&config).unwrap();
            let op = Operator::bridge("test");
            gw.register("m-1", None, None).unwrap();
            gw.send(&op, "m-1", "https://example.com", "hi").unwrap().id
        };

        let gw = Gateway::from_config(&config).unwrap();
        let polled = gw.poll("m-1").unwrap();
        assert_eq!(polled.len(), 1);
        assert_eq!(polled[0].id, msg_id);
    }
}
