//! Relay Module
//!
//! The Coordinator, its registry and routing rule, and the delivery queues it
//! fans messages out to.

pub mod coordinator;
pub mod queue;
pub mod registry;

pub use coordinator::{Command, Coordinator, CoordinatorHandle};
pub use queue::{Delivery, DeliveryPolicy, DeliveryReceiver, DeliverySender};
pub use registry::{Registry, RouteReport};
