//! Metrics Collector

use anyhow::Context;
use prometheus::{IntCounter, IntGauge, Registry, TextEncoder};
use serde::Serialize;

use crate::Result;

/// Relay counters, exported in Prometheus text format
pub struct RelayMetrics {
    prometheus_registry: Registry,

    connections_total: IntCounter,
    active_connections: IntGauge,
    messages_routed_total: IntCounter,
    deliveries_total: IntCounter,
    deliveries_dropped_total: IntCounter,
    decode_failures_total: IntCounter,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub active_connections: i64,
    pub messages_routed: u64,
    pub deliveries: u64,
    pub deliveries_dropped: u64,
    pub decode_failures: u64,
}

impl RelayMetrics {
    /// Create a collector with its own registry, so independent relays never share counters
    pub fn new() -> Result<Self> {
        let prometheus_registry = Registry::new();

        let connections_total = IntCounter::new(
            "wsrelay_connections_total",
            "Total number of connections registered",
        )?;
        let active_connections = IntGauge::new(
            "wsrelay_active_connections",
            "Number of currently registered connections",
        )?;
        let messages_routed_total = IntCounter::new(
            "wsrelay_messages_routed_total",
            "Envelopes routed, including join and leave notices",
        )?;
        let deliveries_total = IntCounter::new(
            "wsrelay_deliveries_total",
            "Envelopes placed on a connection's delivery queue",
        )?;
        let deliveries_dropped_total = IntCounter::new(
            "wsrelay_deliveries_dropped_total",
            "Envelopes lost to a full or closed delivery queue",
        )?;
        let decode_failures_total = IntCounter::new(
            "wsrelay_decode_failures_total",
            "Inbound frames that did not decode as an envelope",
        )?;

        prometheus_registry
            .register(Box::new(connections_total.clone()))
            .context("Failed to register connections_total")?;
        prometheus_registry
            .register(Box::new(active_connections.clone()))
            .context("Failed to register active_connections")?;
        prometheus_registry
            .register(Box::new(messages_routed_total.clone()))
            .context("Failed to register messages_routed_total")?;
        prometheus_registry
            .register(Box::new(deliveries_total.clone()))
            .context("Failed to register deliveries_total")?;
        prometheus_registry
            .register(Box::new(deliveries_dropped_total.clone()))
            .context("Failed to register deliveries_dropped_total")?;
        prometheus_registry
            .register(Box::new(decode_failures_total.clone()))
            .context("Failed to register decode_failures_total")?;

        Ok(Self {
            prometheus_registry,
            connections_total,
            active_connections,
            messages_routed_total,
            deliveries_total,
            deliveries_dropped_total,
            decode_failures_total,
        })
    }

    pub fn connection_registered(&self, active: usize) {
        self.connections_total.inc();
        self.active_connections.set(active as i64);
    }

    pub fn connection_unregistered(&self, active: usize) {
        self.active_connections.set(active as i64);
    }

    /// Record one routing pass
    pub fn message_routed(&self, delivered: usize, dropped: usize) {
        self.messages_routed_total.inc();
        self.deliveries_total.inc_by(delivered as u64);
        self.deliveries_dropped_total.inc_by(dropped as u64);
    }

    pub fn decode_failed(&self) {
        self.decode_failures_total.inc();
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.get(),
            active_connections: self.active_connections.get(),
            messages_routed: self.messages_routed_total.get(),
            deliveries: self.deliveries_total.get(),
            deliveries_dropped: self.deliveries_dropped_total.get(),
            decode_failures: self.decode_failures_total.get(),
        }
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.prometheus_registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .context("Failed to encode Prometheus metrics")
    }
}
