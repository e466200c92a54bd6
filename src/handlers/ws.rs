//! WebSocket handler: identity check before upgrade, then the per-connection loop that
//! multiplexes the outbound queue, inbound frames, transport pings, and the registry's
//! shutdown signal.

use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::identity::extract_token;
use crate::lifecycle::ConnectionLifecycle;
use crate::models::Identity;
use crate::AppState;

/// Close code sent to a connection turned away because its user is already online.
pub const CLOSE_DUPLICATE_SESSION: u16 = 4009;
/// Close code sent when the client stopped answering.
pub const CLOSE_STALE: u16 = 1001;

/// GET /ws — verify the caller, then upgrade. Unverified callers never reach the registry.
pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let identity = match extract_token(&headers).and_then(|token| state.verifier.verify(&token)) {
        Ok(identity) => identity,
        Err(e) => {
            debug!("ws auth failed: {}", e);
            return e.into_response();
        }
    };

    ws.max_message_size(state.config.max_message_bytes)
        .on_upgrade(move |socket| handle_socket(socket, state, identity))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, identity: Identity) {
    let (mut conn, mut rx) = ConnectionLifecycle::new(
        state.registry.clone(),
        state.metrics.clone(),
        identity,
        state.config.outbound_buffer,
    );

    if conn.admit().is_err() {
        flush_queued(&mut socket, &mut rx).await;
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_DUPLICATE_SESSION,
                reason: "already connected elsewhere".into(),
            })))
            .await;
        return;
    }

    // Pongs to these pings refresh liveness for clients that never type.
    let mut ping_timer = interval(Duration::from_secs(state.config.ping_interval_secs.max(1)));
    ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ping_timer.tick().await;

    let shutdown = conn.shutdown_token();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!(user_id = %conn.identity().user_id, conn_id = conn.conn_id(), "ws liveness timeout");
                let _ = socket
                    .send(Message::Close(Some(CloseFrame {
                        code: CLOSE_STALE,
                        reason: "ping timeout".into(),
                    })))
                    .await;
                break;
            }
            _ = ping_timer.tick() => {
                if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            msg = rx.recv() => {
                match msg {
                    Some(text) => {
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = conn.handle_inbound(text.as_str()) {
                            debug!(conn_id = conn.conn_id(), "ws inbound ignored: {}", e);
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_))) => {
                        conn.mark_alive();
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                }
            }
        }
    }
    conn.close();
}

/// Write out whatever the lifecycle queued before the socket is closed.
async fn flush_queued(socket: &mut WebSocket, rx: &mut mpsc::Receiver<String>) {
    while let Ok(text) = rx.try_recv() {
        if socket.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }
}
