//! Relay Protocol Constants

// Lifecycle announcement prefixes, followed by the connection's observed address
pub const JOIN_NOTICE_PREFIX: &str = "/A new socket has connected. ";
pub const LEAVE_NOTICE_PREFIX: &str = "/A socket has disconnected. ";

// Default HTTP routes
pub const DEFAULT_WS_PATH: &str = "/ws";
pub const DEFAULT_HEALTH_PATH: &str = "/health";
pub const DEFAULT_METRICS_PATH: &str = "/metrics";
pub const DEFAULT_STATS_PATH: &str = "/stats";

// Liveness response body
pub const HEALTH_RESPONSE: &str = "ok";

// Address reported when local address discovery finds nothing better
pub const FALLBACK_LOCAL_ADDRESS: &str = "localhost";
