//! Connection Registry
//!
//! Identifier to live connection mapping plus the routing rule. Only the
//! Coordinator's control loop owns one, so nothing here is synchronized.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::connection::{Connection, ConnectionInfo};
use crate::protocol::{Envelope, Payload};

use super::queue::Delivery;

/// Result of one routing pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteReport {
    /// Queues the payload was placed on
    pub delivered: usize,
    /// Queues that lost a message to overflow or had no reader
    pub dropped: usize,
}

#[derive(Debug, Default)]
pub struct Registry {
    connections: HashMap<String, Connection>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.connections.len()
    }

    /// Insert a connection, handing it back if its identifier is already taken
    pub fn insert(&mut self, connection: Connection) -> Result<(), Connection> {
        if self.connections.contains_key(connection.id()) {
            return Err(connection);
        }
        self.connections.insert(connection.id().to_string(), connection);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<Connection> {
        self.connections.remove(id)
    }

    /// Deliver `payload` to the recipient named in `envelope`, or to every
    /// registered connection (sender included) when there is none.
    pub fn route(&self, envelope: &Envelope, payload: &Payload) -> RouteReport {
        let mut report = RouteReport::default();

        if envelope.is_broadcast() {
            for connection in self.connections.values() {
                Self::deliver_to(connection, payload, &mut report);
            }
        } else {
            match self.connections.get(&envelope.recipient) {
                Some(connection) => Self::deliver_to(connection, payload, &mut report),
                None => {
                    debug!(
                        sender = %envelope.sender,
                        recipient = %envelope.recipient,
                        "Recipient is not connected, message dropped"
                    );
                }
            }
        }

        report
    }

    fn deliver_to(connection: &Connection, payload: &Payload, report: &mut RouteReport) {
        match connection.deliver(Payload::clone(payload)) {
            Delivery::Queued => report.delivered += 1,
            Delivery::Evicted => {
                warn!(conn_id = %connection.id(), "Delivery queue full, oldest message evicted");
                report.delivered += 1;
                report.dropped += 1;
            }
            Delivery::Rejected => {
                warn!(conn_id = %connection.id(), "Delivery queue full, message dropped");
                report.dropped += 1;
            }
            Delivery::Closed => {
                debug!(conn_id = %connection.id(), "Delivery queue closed, message dropped");
                report.dropped += 1;
            }
        }
    }

    pub fn infos(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<ConnectionInfo> =
            self.connections.values().map(Connection::info).collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }
}

#[cfg(test)]
impl Registry {
    fn contains(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    /// Registered identifiers in sorted order
    fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.connections.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::queue::{DeliveryPolicy, DeliveryReceiver};

    fn register(registry: &mut Registry, id: &str) -> DeliveryReceiver {
        let (conn, rx) = Connection::new(id, "127.0.0.1", DeliveryPolicy::Unbounded);
        registry.insert(conn).unwrap();
        rx
    }

    fn drain(rx: &mut DeliveryReceiver) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(payload) = rx.try_recv() {
            out.push(payload.to_string());
        }
        out
    }

    #[test]
    fn test_insert_rejects_duplicate_id() {
        let mut registry = Registry::new();
        let _rx = register(&mut registry, "a");

        let (dup, _dup_rx) = Connection::new("a", "10.0.0.9", DeliveryPolicy::Unbounded);
        let rejected = registry.insert(dup).unwrap_err();
        assert_eq!(rejected.addr(), "10.0.0.9");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_broadcast_reaches_everyone_including_sender() {
        let mut registry = Registry::new();
        let mut rx_a = register(&mut registry, "a");
        let mut rx_b = register(&mut registry, "b");
        let mut rx_c = register(&mut registry, "c");

        let envelope = Envelope::new("a", "", "hello all");
        let payload = envelope.encode().unwrap();
        let report = registry.route(&envelope, &payload);

        assert_eq!(report, RouteReport { delivered: 3, dropped: 0 });
        for rx in [&mut rx_a, &mut rx_b, &mut rx_c] {
            assert_eq!(drain(rx), vec![payload.to_string()]);
        }
    }

    #[test]
    fn test_directed_delivery_only_reaches_recipient() {
        let mut registry = Registry::new();
        let mut rx_a = register(&mut registry, "a");
        let mut rx_b = register(&mut registry, "b");

        let envelope = Envelope::new("a", "b", "psst");
        let payload = envelope.encode().unwrap();
        let report = registry.route(&envelope, &payload);

        assert_eq!(report.delivered, 1);
        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(drain(&mut rx_b), vec![payload.to_string()]);
    }

    #[test]
    fn test_unknown_recipient_is_silently_dropped() {
        let mut registry = Registry::new();
        let mut rx_a = register(&mut registry, "a");

        let envelope = Envelope::new("a", "ghost", "anyone?");
        let payload = envelope.encode().unwrap();
        let report = registry.route(&envelope, &payload);

        assert_eq!(report, RouteReport::default());
        assert!(drain(&mut rx_a).is_empty());
    }

    #[test]
    fn test_closed_reader_counts_as_dropped() {
        let mut registry = Registry::new();
        let rx_a = register(&mut registry, "a");
        let _rx_b = register(&mut registry, "b");
        drop(rx_a);

        let envelope = Envelope::new("b", "", "hi");
        let payload = envelope.encode().unwrap();
        let report = registry.route(&envelope, &payload);
        assert_eq!(report, RouteReport { delivered: 1, dropped: 1 });
    }

    #[test]
    fn test_overflow_accounting_per_policy() {
        let mut registry = Registry::new();
        let (newest, _rx_newest) =
            Connection::new("newest", "127.0.0.1", DeliveryPolicy::DropNewest { capacity: 1 });
        let (oldest, _rx_oldest) =
            Connection::new("oldest", "127.0.0.1", DeliveryPolicy::DropOldest { capacity: 1 });
        registry.insert(newest).unwrap();
        registry.insert(oldest).unwrap();

        let envelope = Envelope::new("x", "", "first");
        let payload = envelope.encode().unwrap();
        assert_eq!(registry.route(&envelope, &payload), RouteReport { delivered: 2, dropped: 0 });

        // Full: one queue rejects the newcomer, the other evicts its head
        let report = registry.route(&envelope, &payload);
        assert_eq!(report, RouteReport { delivered: 1, dropped: 2 });
    }

    #[test]
    fn test_key_set_tracks_inserts_and_removes() {
        let mut registry = Registry::new();
        let _rx = ["a", "b", "c", "d"].map(|id| register(&mut registry, id));

        assert!(registry.remove("b").is_some());
        assert!(registry.remove("b").is_none());
        assert!(registry.remove("d").is_some());

        assert_eq!(registry.ids(), vec!["a".to_string(), "c".to_string()]);
        assert!(registry.contains("a"));
        assert!(!registry.contains("d"));
        assert_eq!(registry.infos().len(), 2);
    }
}
