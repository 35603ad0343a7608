//! Configuration Manager

use super::{Config, DeliveryMode, DropPolicy};
use crate::Result;
use anyhow::{Context, bail};
use std::net::SocketAddr;
use std::path::Path;

const MAX_QUEUE_CAPACITY: usize = 1_000_000;

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            config.validate()
                .with_context(|| "Configuration validation failed")?;

            tracing::info!("Configuration loaded and validated successfully");
            Ok(config)
        } else {
            tracing::warn!("Configuration file not found at {}, using defaults", path.display());
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        let mut config = Config::default();

        if let Ok(bind_addr) = std::env::var("WSRELAY_BIND_ADDR") {
            config.server.bind_addr = bind_addr.parse::<SocketAddr>()
                .with_context(|| format!("Invalid WSRELAY_BIND_ADDR: {}", bind_addr))?;
        }

        if let Ok(ws_path) = std::env::var("WSRELAY_WS_PATH") {
            config.server.ws_path = ws_path;
        }

        if let Ok(mode) = std::env::var("WSRELAY_DELIVERY_MODE") {
            config.relay.delivery.mode = mode.parse::<DeliveryMode>()
                .with_context(|| format!("Invalid WSRELAY_DELIVERY_MODE: {}", mode))?;
        }

        if let Ok(capacity) = std::env::var("WSRELAY_QUEUE_CAPACITY") {
            config.relay.delivery.capacity = capacity.parse::<usize>()
                .with_context(|| format!("Invalid WSRELAY_QUEUE_CAPACITY: {}", capacity))?;
        }

        if let Ok(drop) = std::env::var("WSRELAY_DROP_POLICY") {
            config.relay.delivery.drop = drop.parse::<DropPolicy>()
                .with_context(|| format!("Invalid WSRELAY_DROP_POLICY: {}", drop))?;
        }

        if let Ok(strict) = std::env::var("WSRELAY_STRICT_DECODING") {
            config.relay.strict_decoding = strict.parse::<bool>()
                .with_context(|| format!("Invalid WSRELAY_STRICT_DECODING: {}", strict))?;
        }

        if let Ok(log_level) = std::env::var("WSRELAY_LOG_LEVEL") {
            config.monitoring.log_level = log_level;
        }

        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_server_config()
            .with_context(|| "Server configuration validation failed")?;

        self.validate_relay_config()
            .with_context(|| "Relay configuration validation failed")?;

        self.validate_monitoring_config()
            .with_context(|| "Monitoring configuration validation failed")?;

        Ok(())
    }

    /// Validate server configuration
    fn validate_server_config(&self) -> Result<()> {
        for (name, path) in self.http_paths() {
            if !path.starts_with('/') {
                bail!("{} must start with '/', got '{}'", name, path);
            }
        }

        let paths = self.http_paths();
        for (i, (name, path)) in paths.iter().enumerate() {
            if let Some((other, _)) = paths[i + 1..].iter().find(|(_, p)| p == path) {
                bail!("{} and {} must not share the route '{}'", name, other, path);
            }
        }

        if self.server.shutdown_timeout.is_zero() {
            bail!("shutdown_timeout must be greater than 0");
        }

        Ok(())
    }

    /// Validate relay configuration
    fn validate_relay_config(&self) -> Result<()> {
        let delivery = &self.relay.delivery;
        if delivery.mode == DeliveryMode::BoundedDrop {
            if delivery.capacity == 0 {
                bail!("delivery.capacity must be greater than 0 for bounded_drop");
            }

            if delivery.capacity > MAX_QUEUE_CAPACITY {
                bail!("delivery.capacity cannot exceed {}", MAX_QUEUE_CAPACITY);
            }
        }

        Ok(())
    }

    /// Validate monitoring configuration
    fn validate_monitoring_config(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.monitoring.log_level.as_str()) {
            bail!("monitoring.log_level must be one of: {}", valid_log_levels.join(", "));
        }

        Ok(())
    }

    /// Routes served over HTTP, labelled by their config key
    fn http_paths(&self) -> Vec<(&'static str, &str)> {
        let mut paths = vec![
            ("server.ws_path", self.server.ws_path.as_str()),
            ("server.health_path", self.server.health_path.as_str()),
            ("monitoring.stats_path", self.monitoring.stats_path.as_str()),
        ];
        if self.monitoring.metrics_enabled {
            paths.push(("monitoring.metrics_path", self.monitoring.metrics_path.as_str()));
        }
        paths
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(
        &mut self,
        bind: Option<&str>,
        port: Option<u16>,
        queue_capacity: Option<usize>,
        strict_decoding: bool,
    ) {
        if let Some(bind_str) = bind {
            if let Ok(addr) = bind_str.parse::<SocketAddr>() {
                self.server.bind_addr = addr;
                tracing::info!("CLI override: bind address set to {}", addr);
            } else {
                tracing::warn!("Invalid bind address provided: {}", bind_str);
            }
        }

        if let Some(port) = port {
            self.server.bind_addr.set_port(port);
            tracing::info!("CLI override: port set to {}", port);
        }

        // A capacity on the command line implies a bounded queue
        if let Some(capacity) = queue_capacity {
            self.relay.delivery.mode = DeliveryMode::BoundedDrop;
            self.relay.delivery.capacity = capacity;
            tracing::info!("CLI override: bounded delivery queue with capacity {}", capacity);
        }

        if strict_decoding {
            self.relay.strict_decoding = true;
            tracing::info!("CLI override: strict envelope decoding enabled");
        }
    }
}
