use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use crate::AppState;

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}

/// GET /metrics — Prometheus text format.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
