//! Per-connection Delivery Queues
//!
//! The Coordinator is the only writer of a delivery queue and the owning
//! outbound pump is the only reader. None of the variants can block the
//! writer: an unbounded queue always accepts, a bounded queue sheds either
//! the incoming message or the oldest queued one. Dropping the sender closes
//! the queue; the reader still drains whatever was queued before it sees the
//! close.

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use crate::config::{DeliveryConfig, DeliveryMode, DropPolicy};
use crate::protocol::Payload;

/// Overflow behaviour of a delivery queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryPolicy {
    #[default]
    Unbounded,
    /// Reject the incoming message when full
    DropNewest { capacity: usize },
    /// Evict the oldest queued message when full. The capacity is rounded up
    /// to the next power of two.
    DropOldest { capacity: usize },
}

impl From<&DeliveryConfig> for DeliveryPolicy {
    fn from(config: &DeliveryConfig) -> Self {
        match (config.mode, config.drop) {
            (DeliveryMode::Unbounded, _) => DeliveryPolicy::Unbounded,
            (DeliveryMode::BoundedDrop, DropPolicy::Newest) => DeliveryPolicy::DropNewest {
                capacity: config.capacity,
            },
            (DeliveryMode::BoundedDrop, DropPolicy::Oldest) => DeliveryPolicy::DropOldest {
                capacity: config.capacity,
            },
        }
    }
}

/// Outcome of handing one payload to a delivery queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// Queued, but the oldest queued message was evicted
    Evicted,
    /// The queue was full and this message was discarded
    Rejected,
    /// The reader is gone
    Closed,
}

/// Create a connected sender/receiver pair
pub fn delivery_queue(policy: DeliveryPolicy) -> (DeliverySender, DeliveryReceiver) {
    match policy {
        DeliveryPolicy::Unbounded => {
            let (tx, rx) = mpsc::unbounded_channel();
            (DeliverySender::Unbounded(tx), DeliveryReceiver::Unbounded(rx))
        }
        DeliveryPolicy::DropNewest { capacity } => {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            (DeliverySender::DropNewest(tx), DeliveryReceiver::DropNewest(rx))
        }
        DeliveryPolicy::DropOldest { capacity } => {
            let capacity = capacity.max(1).next_power_of_two();
            let (tx, rx) = broadcast::channel(capacity);
            (
                DeliverySender::DropOldest { tx, capacity },
                DeliveryReceiver::DropOldest(rx),
            )
        }
    }
}

/// Write side, held by the Coordinator's registry
#[derive(Debug)]
pub enum DeliverySender {
    Unbounded(mpsc::UnboundedSender<Payload>),
    DropNewest(mpsc::Sender<Payload>),
    DropOldest {
        tx: broadcast::Sender<Payload>,
        capacity: usize,
    },
}

impl DeliverySender {
    /// Enqueue without waiting
    pub fn deliver(&self, payload: Payload) -> Delivery {
        match self {
            DeliverySender::Unbounded(tx) => match tx.send(payload) {
                Ok(()) => Delivery::Queued,
                Err(_) => Delivery::Closed,
            },
            DeliverySender::DropNewest(tx) => match tx.try_send(payload) {
                Ok(()) => Delivery::Queued,
                Err(TrySendError::Full(_)) => Delivery::Rejected,
                Err(TrySendError::Closed(_)) => Delivery::Closed,
            },
            DeliverySender::DropOldest { tx, capacity } => {
                let evicting = tx.len() >= *capacity;
                match tx.send(payload) {
                    Ok(_) if evicting => Delivery::Evicted,
                    Ok(_) => Delivery::Queued,
                    Err(_) => Delivery::Closed,
                }
            }
        }
    }
}

/// Read side, owned by the connection's outbound pump
#[derive(Debug)]
pub enum DeliveryReceiver {
    Unbounded(mpsc::UnboundedReceiver<Payload>),
    DropNewest(mpsc::Receiver<Payload>),
    DropOldest(broadcast::Receiver<Payload>),
}

impl DeliveryReceiver {
    /// Next payload in order, or `None` once the queue is closed and drained
    pub async fn recv(&mut self) -> Option<Payload> {
        match self {
            DeliveryReceiver::Unbounded(rx) => rx.recv().await,
            DeliveryReceiver::DropNewest(rx) => rx.recv().await,
            DeliveryReceiver::DropOldest(rx) => loop {
                match rx.recv().await {
                    Ok(payload) => return Some(payload),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Delivery queue overflowed, oldest messages dropped");
                    }
                    Err(RecvError::Closed) => return None,
                }
            },
        }
    }

    /// Next payload if one is already queued
    pub fn try_recv(&mut self) -> Option<Payload> {
        match self {
            DeliveryReceiver::Unbounded(rx) => rx.try_recv().ok(),
            DeliveryReceiver::DropNewest(rx) => rx.try_recv().ok(),
            DeliveryReceiver::DropOldest(rx) => loop {
                match rx.try_recv() {
                    Ok(payload) => return Some(payload),
                    Err(TryRecvError::Lagged(skipped)) => {
                        warn!(skipped, "Delivery queue overflowed, oldest messages dropped");
                    }
                    Err(_) => return None,
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn payload(s: &str) -> Payload {
        Arc::from(s)
    }

    #[tokio::test]
    async fn test_unbounded_drains_after_close() {
        let (tx, mut rx) = delivery_queue(DeliveryPolicy::Unbounded);
        for i in 0..100 {
            assert_eq!(tx.deliver(payload(&i.to_string())), Delivery::Queued);
        }
        drop(tx);

        let mut received = Vec::new();
        while let Some(p) = rx.recv().await {
            received.push(p.to_string());
        }
        assert_eq!(received.len(), 100);
        assert_eq!(received[0], "0");
        assert_eq!(received[99], "99");
    }

    #[tokio::test]
    async fn test_drop_newest_rejects_when_full() {
        let (tx, mut rx) = delivery_queue(DeliveryPolicy::DropNewest { capacity: 2 });
        assert_eq!(tx.deliver(payload("a")), Delivery::Queued);
        assert_eq!(tx.deliver(payload("b")), Delivery::Queued);
        assert_eq!(tx.deliver(payload("c")), Delivery::Rejected);
        drop(tx);

        assert_eq!(rx.recv().await.as_deref(), Some("a"));
        assert_eq!(rx.recv().await.as_deref(), Some("b"));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_drop_oldest_evicts_head() {
        let (tx, mut rx) = delivery_queue(DeliveryPolicy::DropOldest { capacity: 2 });
        assert_eq!(tx.deliver(payload("a")), Delivery::Queued);
        assert_eq!(tx.deliver(payload("b")), Delivery::Queued);
        assert_eq!(tx.deliver(payload("c")), Delivery::Evicted);
        drop(tx);

        assert_eq!(rx.recv().await.as_deref(), Some("b"));
        assert_eq!(rx.recv().await.as_deref(), Some("c"));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_closed_reader_is_reported() {
        for policy in [
            DeliveryPolicy::Unbounded,
            DeliveryPolicy::DropNewest { capacity: 4 },
            DeliveryPolicy::DropOldest { capacity: 4 },
        ] {
            let (tx, rx) = delivery_queue(policy);
            drop(rx);
            assert_eq!(tx.deliver(payload("x")), Delivery::Closed, "{:?}", policy);
        }
    }

    #[test]
    fn test_policy_from_config() {
        let mut config = DeliveryConfig::default();
        assert_eq!(DeliveryPolicy::from(&config), DeliveryPolicy::Unbounded);

        config.mode = DeliveryMode::BoundedDrop;
        config.capacity = 8;
        config.drop = DropPolicy::Newest;
        assert_eq!(
            DeliveryPolicy::from(&config),
            DeliveryPolicy::DropNewest { capacity: 8 }
        );

        config.drop = DropPolicy::Oldest;
        assert_eq!(
            DeliveryPolicy::from(&config),
            DeliveryPolicy::DropOldest { capacity: 8 }
        );
    }
}
