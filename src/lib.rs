//! wsrelay Library
//!
//! A WebSocket message relay. Clients connect, get an identity, and exchange
//! JSON envelopes addressed either to one peer or to everyone. A single
//! Coordinator task owns the set of live connections and routes every message.

pub mod config;
pub mod connection;
pub mod metrics;
pub mod protocol;
pub mod relay;
pub mod shutdown;
pub mod transport;

pub use config::Config;
pub use protocol::Envelope;
pub use relay::{Coordinator, CoordinatorHandle};
pub use shutdown::ShutdownSignal;
pub use transport::RelayServer;

/// Common error type for the relay
pub type Result<T> = anyhow::Result<T>;
