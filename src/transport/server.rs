//! Relay Server
//!
//! Binds the listener, starts the Coordinator and serves the relay router.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use super::{address::discover_local_ip, api::RelayApi, handlers::AppState};
use crate::config::{AnnounceAddress, Config};
use crate::metrics::RelayMetrics;
use crate::protocol::FALLBACK_LOCAL_ADDRESS;
use crate::relay::{Coordinator, CoordinatorHandle};
use crate::Result;

/// A bound relay, ready to serve
pub struct RelayServer {
    listener: TcpListener,
    router: Router,
    coordinator: CoordinatorHandle,
}

impl RelayServer {
    /// Bind the configured address and start a fresh Coordinator
    pub async fn bind(config: &Config) -> Result<Self> {
        let metrics = Arc::new(RelayMetrics::new()?);
        let (coordinator, _task) = Coordinator::spawn(metrics);

        let local_addr = match config.relay.announce_address {
            AnnounceAddress::Local => {
                let ip = discover_local_ip().await;
                info!("Announcing local address {}", ip);
                ip
            }
            AnnounceAddress::Peer => FALLBACK_LOCAL_ADDRESS.to_string(),
        };

        let state = AppState {
            coordinator: coordinator.clone(),
            relay: Arc::new(config.relay.clone()),
            local_addr: Arc::from(local_addr),
            start_time: SystemTime::now(),
        };
        let router = RelayApi::create_router(state, config);

        let bind_addr = config.server.bind_addr;
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind relay server to {}", bind_addr))?;

        Ok(Self {
            listener,
            router,
            coordinator,
        })
    }

    /// Address actually bound, useful when the configured port was 0
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read relay listener address")
    }

    pub fn coordinator(&self) -> &CoordinatorHandle {
        &self.coordinator
    }

    /// Serve until the process exits
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves; open WebSockets are not drained
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        info!("Relay server listening on {}", addr);

        axum::serve(
            self.listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .context("Relay server error")?;

        info!("Relay server stopped accepting connections");
        Ok(())
    }
}
