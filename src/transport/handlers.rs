//! Relay HTTP Handlers

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use axum::{
    extract::{ws::WebSocket, ConnectInfo, State, WebSocketUpgrade},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, error};

use crate::config::{AnnounceAddress, RelayConfig};
use crate::connection::{serve_connection, Connection, ConnectionInfo};
use crate::metrics::MetricsSnapshot;
use crate::protocol::HEALTH_RESPONSE;
use crate::relay::{CoordinatorHandle, DeliveryPolicy};

use super::address::peer_address;

/// Shared application state for handlers
#[derive(Clone)]
pub struct AppState {
    pub coordinator: CoordinatorHandle,
    pub relay: Arc<RelayConfig>,
    /// Discovered once at startup, used when announcing the local address
    pub local_addr: Arc<str>,
    pub start_time: SystemTime,
}

/// Body of the stats endpoint
#[derive(Debug, Serialize)]
pub struct RelayStats {
    pub active_connections: usize,
    pub uptime_seconds: u64,
    pub counters: MetricsSnapshot,
    pub connections: Vec<ConnectionInfo>,
}

/// Liveness check
pub async fn health_check() -> &'static str {
    HEALTH_RESPONSE
}

/// Upgrade to a WebSocket and hand the socket to the relay
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let addr = match state.relay.announce_address {
        AnnounceAddress::Peer => peer_address(peer),
        AnnounceAddress::Local => state.local_addr.to_string(),
    };
    debug!(%peer, "WebSocket upgrade requested");

    ws.on_upgrade(move |socket| relay_socket(socket, addr, state))
}

async fn relay_socket(socket: WebSocket, addr: String, state: AppState) {
    let policy = DeliveryPolicy::from(&state.relay.delivery);
    let (connection, queue) = Connection::with_generated_id(addr, policy);
    let (writer, reader) = socket.split();

    serve_connection(
        connection,
        queue,
        reader,
        writer,
        state.coordinator.clone(),
        state.relay.strict_decoding,
    )
    .await;
}

/// Live connections and relay counters
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<RelayStats>, StatusCode> {
    let connections = state.coordinator.snapshot().await.map_err(|e| {
        error!("Failed to read connection snapshot: {:#}", e);
        StatusCode::SERVICE_UNAVAILABLE
    })?;

    let uptime_seconds = SystemTime::now()
        .duration_since(state.start_time)
        .unwrap_or_default()
        .as_secs();

    Ok(Json(RelayStats {
        active_connections: connections.len(),
        uptime_seconds,
        counters: state.coordinator.metrics().snapshot(),
        connections,
    }))
}

/// Prometheus scrape endpoint
pub async fn get_metrics(State(state): State<AppState>) -> Response {
    match state.coordinator.metrics().export_prometheus() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to export metrics: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
