//! Realtime presence-aware message router.
//! The binary entry point is in main.rs; modules are public for integration testing.

pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod lifecycle;
pub mod metrics;
pub mod models;
pub mod presence;
pub mod registry;
pub mod router;

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use config::Config;
use identity::IdentityVerifier;
use metrics::Metrics;
use registry::PresenceRegistry;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<PresenceRegistry>,
    pub metrics: Arc<Metrics>,
    pub verifier: Arc<dyn IdentityVerifier>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::status::health))
        .route("/metrics", get(handlers::status::metrics))
        .route("/ws", get(handlers::ws::ws_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Periodically close connections whose keepalive expired. Runs until the task is aborted.
pub async fn prune_stale_connections(registry: Arc<PresenceRegistry>, every: Duration, max_age_secs: u64) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let closed = registry.prune_stale(max_age_secs);
        if closed > 0 {
            tracing::info!(closed, online = registry.len(), "pruned stale connections");
        }
    }
}
