//! Relay HTTP Routes

use super::handlers::*;
use crate::config::Config;
use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;

/// Relay router
pub struct RelayApi;

impl RelayApi {
    /// Create the relay router: WebSocket endpoint, liveness, stats and metrics
    pub fn create_router(state: AppState, config: &Config) -> Router {
        let mut router = Router::new()
            .route(&config.server.ws_path, get(ws_upgrade))
            .route(&config.server.health_path, get(health_check))
            .route(&config.monitoring.stats_path, get(get_stats));

        if config.monitoring.metrics_enabled {
            router = router.route(&config.monitoring.metrics_path, get(get_metrics));
        }

        router
            .layer(CorsLayer::permissive()) // browsers connect from any origin
            .with_state(state)
    }
}
