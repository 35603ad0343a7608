//! Connection Types

use std::time::Instant;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::protocol::Payload;
use crate::relay::queue::{delivery_queue, Delivery, DeliveryPolicy, DeliveryReceiver, DeliverySender};

/// One live duplex channel to a client, as the Coordinator sees it.
///
/// Holds the write side of the connection's delivery queue. The transport
/// halves and the read side of the queue belong to the connection's pumps.
/// Dropping a `Connection` closes its delivery queue.
#[derive(Debug)]
pub struct Connection {
    id: String,
    addr: String,
    queue: DeliverySender,
    connected_at: Instant,
}

/// Connection information for the stats endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub id: String,
    pub addr: String,
    pub connected_seconds: u64,
}

impl Connection {
    /// Create a connection together with the read side of its delivery queue
    pub fn new(
        id: impl Into<String>,
        addr: impl Into<String>,
        policy: DeliveryPolicy,
    ) -> (Self, DeliveryReceiver) {
        let (queue, receiver) = delivery_queue(policy);
        let connection = Self {
            id: id.into(),
            addr: addr.into(),
            queue,
            connected_at: Instant::now(),
        };
        debug!(conn_id = %connection.id, addr = %connection.addr, ?policy, "Created connection");
        (connection, receiver)
    }

    /// Create a connection under a fresh random identifier
    pub fn with_generated_id(
        addr: impl Into<String>,
        policy: DeliveryPolicy,
    ) -> (Self, DeliveryReceiver) {
        Self::new(Uuid::new_v4().to_string(), addr, policy)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Address observed when the connection was accepted
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn deliver(&self, payload: Payload) -> Delivery {
        self.queue.deliver(payload)
    }

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id.clone(),
            addr: self.addr.clone(),
            connected_seconds: self.connected_at.elapsed().as_secs(),
        }
    }
}
