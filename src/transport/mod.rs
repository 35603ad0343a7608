//! Transport Module
//!
//! HTTP and WebSocket plumbing around the relay core: the upgrade endpoint,
//! liveness, stats and metrics routes, and local address discovery.

pub mod address;
pub mod api;
pub mod handlers;
pub mod server;

pub use api::RelayApi;
pub use handlers::{AppState, RelayStats};
pub use server::RelayServer;
