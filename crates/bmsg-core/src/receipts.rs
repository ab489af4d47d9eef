//! Poll and acknowledgement tracking
//!
//! Delivery is recorded when a poll hands a message out, not when the
//! client renders it. A client that crashes between fetch and display is
//! still counted as delivered.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::client::{ClientRegistry, check_machine_id};
use crate::message::{Message, MessageId, MessageStore};
use crate::Result;

/// Client-facing entry points over the registry and message store
pub struct ReceiptTracker {
    registry: Arc<ClientRegistry>,
    store: Arc<MessageStore>,
}

impl ReceiptTracker {
    pub fn new(registry: Arc<ClientRegistry>, store: Arc<MessageStore>) -> Self {
        Self { registry, store }
    }

    /// Register or touch the client and hand out its pending messages
    ///
    /// Only messages whose delivery transition this call won are returned,
    /// so two overlapping polls by the same client never both receive a
    /// message.
    pub fn on_poll(
        &self,
        client_id: &str,
        label: Option<&str>,
        platform: Option<&str>,
    ) -> Result<Vec<Message>> {
        let client = self.registry.register_or_touch(client_id, label, platform)?;
        let pending = self.store.pending_for(&client.machine_id)?;

        let now = Utc::now();
        let mut delivered = Vec::with_capacity(pending.len());
        for message in pending {
            if self.store.mark_delivered(message.id, &client.machine_id, now)? {
                delivered.push(message);
            }
        }

        debug!(
            "Poll from {}: {} message(s) delivered",
            client.machine_id,
            delivered.len()
        );
        Ok(delivered)
    }

    /// Record that the client read a message
    ///
    /// Returns `false` when the read was already recorded. Fails with
    /// `NotFound` if the message was never sent to this client.
    pub fn on_read(&self, message_id: MessageId, client_id: &str) -> Result<bool> {
        check_machine_id(client_id)?;
        let changed = self.store.mark_read(message_id, client_id, Utc::now())?;
        if changed {
            debug!("Client {} read message #{}", client_id, message_id);
        } else {
            debug!("Duplicate read of message #{} by {}", message_id, client_id);
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::dispatch::Dispatcher;
    use crate::message::DeliveryState;
    use crate::Error;

    struct Fixture {
        registry: Arc<ClientRegistry>,
        store: Arc<MessageStore>,
        dispatcher: Dispatcher,
        tracker: Arc<ReceiptTracker>,
    }

    fn setup() -> Fixture {
        let db = Arc::new(Database::in_memory().unwrap());
        let registry = Arc::new(ClientRegistry::new(Arc::clone(&db)));
        let store = Arc::new(MessageStore::new(db, Arc::clone(&registry)));
        let dispatcher = Dispatcher::new(Arc::clone(&registry), Arc::clone(&store));
        let tracker = Arc::new(ReceiptTracker::new(Arc::clone(&registry), Arc::clone(&store)));
        Fixture {
            registry,
            store,
            dispatcher,
            tracker,
        }
    }

    fn assert_record_invariant(record: &crate::DeliveryRecord) {
        if let Some(read) = record.read_at {
            let delivered = record.delivered_at.expect("read implies delivered");
            assert!(delivered <= read);
        }
    }

    #[test]
    fn test_broadcast_delivered_exactly_once() {
        let f = setup();
        let before = f.dispatcher.broadcast("https://example.com/before", "early").unwrap();

        let first = f.tracker.on_poll("m-1", None, None).unwrap();
        assert_eq!(first, vec![before.clone()]);

        let after = f.dispatcher.broadcast("https://example.com/after", "late").unwrap();
        let second = f.tracker.on_poll("m-1", None, None).unwrap();
        assert_eq!(second, vec![after]);

        assert!(f.tracker.on_poll("m-1", None, None).unwrap().is_empty());
    }

    #[test]
    fn test_second_poll_is_empty() {
        let f = setup();
        f.registry.register_or_touch("m-1", None, None).unwrap();
        f.dispatcher.send("m-1", "https://example.com", "hi").unwrap();

        assert_eq!(f.tracker.on_poll("m-1", None, None).unwrap().len(), 1);
        assert!(f.tracker.on_poll("m-1", None, None).unwrap().is_empty());
    }

    #[test]
    fn test_poll_registers_unknown_client() {
        let f = setup();
        assert!(f.tracker.on_poll("fresh", Some("host-1"), None).unwrap().is_empty());
        let client = f.registry.get("fresh").unwrap();
        assert_eq!(client.display_label.as_deref(), Some("host-1"));
    }

    #[test]
    fn test_read_twice_is_noop() {
        let f = setup();
        let msg = f.dispatcher.broadcast("https://example.com", "hi").unwrap();
        f.tracker.on_poll("m-1", None, None).unwrap();

        assert!(f.tracker.on_read(msg.id, "m-1").unwrap());
        let first = f.store.record(msg.id, "m-1").unwrap().unwrap();

        assert!(!f.tracker.on_read(msg.id, "m-1").unwrap());
        let second = f.store.record(msg.id, "m-1").unwrap().unwrap();
        assert_eq!(first.read_at, second.read_at);
        assert_eq!(second.state(), DeliveryState::Read);
        assert_record_invariant(&second);
    }

    #[test]
    fn test_read_of_undelivered_message_rejected() {
        let f = setup();
        f.registry.register_or_touch("m-1", None, None).unwrap();
        let msg = f.dispatcher.send("m-1", "https://example.com", "hi").unwrap();

        let err = f.tracker.on_read(msg.id, "m-2").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let err = f.tracker.on_read(9999, "m-1").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_read_before_poll_marks_delivered() {
        let f = setup();
        f.registry.register_or_touch("m-1", None, None).unwrap();
        let msg = f.dispatcher.send("m-1", "https://example.com", "hi").unwrap();

        assert!(f.tracker.on_read(msg.id, "m-1").unwrap());
        let record = f.store.record(msg.id, "m-1").unwrap().unwrap();
        assert!(record.delivered_at.is_some());
        assert_record_invariant(&record);

        // already delivered, nothing left to poll
        assert!(f.tracker.on_poll("m-1", None, None).unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_first_polls_create_one_record() {
        let f = setup();
        let msg = f.dispatcher.broadcast("https://example.com", "hi").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&f.tracker);
                std::thread::spawn(move || tracker.on_poll("never-seen", None, None).unwrap())
            })
            .collect();

        let delivered: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap().len())
            .sum();

        assert_eq!(delivered, 1);
        assert_eq!(f.store.receipts_for(msg.id).unwrap().len(), 1);
        assert_eq!(f.registry.count().unwrap(), 1);
    }

    #[test]
    fn test_concurrent_delivery_and_read_converge() {
        let f = setup();
        let msg = f.dispatcher.broadcast("https://example.com", "hi").unwrap();
        f.store.record_delivery_if_absent(msg.id, "m-1").unwrap();

        let poller = {
            let tracker = Arc::clone(&f.tracker);
            std::thread::spawn(move || tracker.on_poll("m-1", None, None).unwrap())
        };
        let reader = {
            let tracker = Arc::clone(&f.tracker);
            std::thread::spawn(move || tracker.on_read(msg.id, "m-1").unwrap())
        };
        poller.join().unwrap();
        reader.join().unwrap();

        let record = f.store.record(msg.id, "m-1").unwrap().unwrap();
        assert_eq!(record.state(), DeliveryState::Read);
        assert_record_invariant(&record);
    }
}
