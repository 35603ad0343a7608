//! Connection Module
//!
//! The per-client connection object and the pumps that move envelopes between
//! its transport and the Coordinator.

pub mod pump;
pub mod types;

pub use pump::{run_inbound, run_outbound, serve_connection, InboundExit};
pub use types::{Connection, ConnectionInfo};
