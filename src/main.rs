use std::sync::Arc;
use std::time::Duration;

use rtchat_backend::config::Config;
use rtchat_backend::identity::JwtVerifier;
use rtchat_backend::metrics::Metrics;
use rtchat_backend::registry::PresenceRegistry;
use rtchat_backend::{build_router, prune_stale_connections, AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rtchat_backend=info,tower_http=info"));
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let registry = Arc::new(PresenceRegistry::new());
    let state = AppState {
        verifier: Arc::new(JwtVerifier::new(config.jwt_secret.as_bytes())),
        metrics: Arc::new(Metrics::new()?),
        registry: registry.clone(),
        config: Arc::new(config.clone()),
    };

    let pruner = tokio::spawn(prune_stale_connections(
        registry,
        Duration::from_secs(config.prune_interval_secs.max(1)),
        config.ping_timeout_secs,
    ));

    let app = build_router(state);
    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("rtchat-backend v{} listening on {}", env!("CARGO_PKG_VERSION"), addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;

    pruner.abort();
    Ok(())
}
