//! Configuration Types

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::protocol::constants::*;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub relay: RelayConfig,
    pub monitoring: MonitoringConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub ws_path: String,
    pub health_path: String,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

/// Relay behaviour
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    pub announce_address: AnnounceAddress,
    /// Drop frames that fail to decode instead of relaying an empty envelope
    pub strict_decoding: bool,
    pub delivery: DeliveryConfig,
}

/// Which address goes into join/leave notices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnounceAddress {
    /// The remote peer's socket address
    #[default]
    Peer,
    /// The relay host's own non-loopback address
    Local,
}

/// Per-connection delivery queue configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub mode: DeliveryMode,
    /// Queue capacity, only used by `bounded_drop`
    pub capacity: usize,
    /// Which message is lost when a bounded queue overflows
    pub drop: DropPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    #[default]
    Unbounded,
    BoundedDrop,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    #[default]
    Oldest,
    Newest,
}

/// Monitoring configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub metrics_enabled: bool,
    pub metrics_path: String,
    pub stats_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            ws_path: DEFAULT_WS_PATH.to_string(),
            health_path: DEFAULT_HEALTH_PATH.to_string(),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::Unbounded,
            capacity: 256,
            drop: DropPolicy::Oldest,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_path: DEFAULT_METRICS_PATH.to_string(),
            stats_path: DEFAULT_STATS_PATH.to_string(),
        }
    }
}

impl FromStr for DeliveryMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unbounded" => Ok(DeliveryMode::Unbounded),
            "bounded_drop" => Ok(DeliveryMode::BoundedDrop),
            other => Err(anyhow::anyhow!(
                "delivery mode must be 'unbounded' or 'bounded_drop', got '{}'",
                other
            )),
        }
    }
}

impl FromStr for DropPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oldest" => Ok(DropPolicy::Oldest),
            "newest" => Ok(DropPolicy::Newest),
            other => Err(anyhow::anyhow!(
                "drop policy must be 'oldest' or 'newest', got '{}'",
                other
            )),
        }
    }
}
