//! Per-connection lifecycle: admission, inbound dispatch, and teardown.
//!
//! ```text
//! Connecting -> Admitted -> Active -> Closed
//! Connecting -> Rejected -> Closed
//! ```
//!
//! Teardown runs from `close()` or, failing that, from `Drop`, so a registered session is
//! removed and the departure broadcast exactly once however the socket task ends.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{AdmitError, ProtocolError};
use crate::metrics::Metrics;
use crate::models::{ClientEvent, Identity, ServerEvent};
use crate::presence;
use crate::registry::{ConnectionEntry, ConnectionHandle, PresenceRegistry, Session};
use crate::router;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Admitted,
    Active,
    Rejected,
    Closed,
}

pub struct ConnectionLifecycle {
    registry: Arc<PresenceRegistry>,
    metrics: Arc<Metrics>,
    identity: Identity,
    conn: ConnectionHandle,
    session: Option<Arc<Session>>,
    phase: Phase,
}

impl ConnectionLifecycle {
    /// Start a connection in `Connecting`. The receiver feeds the socket writer.
    pub fn new(
        registry: Arc<PresenceRegistry>,
        metrics: Arc<Metrics>,
        identity: Identity,
        outbound_buffer: usize,
    ) -> (Self, mpsc::Receiver<String>) {
        let (conn, rx) = ConnectionEntry::open(outbound_buffer);
        let lifecycle = Self {
            registry,
            metrics,
            identity,
            conn,
            session: None,
            phase: Phase::Connecting,
        };
        (lifecycle, rx)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn conn_id(&self) -> u64 {
        self.conn.conn_id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Cancelled when the registry wants this connection gone (stale keepalive).
    pub fn shutdown_token(&self) -> CancellationToken {
        self.conn.shutdown_token()
    }

    /// Register the session. On success the connection gets its own snapshot and every
    /// other session gets the new member list. On conflict a single `duplicate_session`
    /// frame is queued and the caller must close the socket.
    pub fn admit(&mut self) -> Result<(), AdmitError> {
        if self.phase != Phase::Connecting {
            tracing::warn!(conn_id = self.conn.conn_id, phase = ?self.phase, "admit called twice");
            return Ok(());
        }
        let session = Session::new(self.identity.clone(), self.conn.clone());

        let _membership = self.registry.lock_membership();
        match self.registry.admit(session) {
            Ok(session) => {
                self.phase = Phase::Admitted;
                self.metrics.admissions.with_label_values(&["admitted"]).inc();
                self.metrics.online_sessions.set(self.registry.len() as i64);
                presence::send_snapshot_to(&self.registry, &self.metrics, &self.conn);
                presence::broadcast_presence(&self.registry, &self.metrics, Some(self.conn.conn_id));
                tracing::info!(
                    user_id = %session.user_id,
                    username = %session.username,
                    conn_id = session.conn_id(),
                    online = self.registry.len(),
                    "session admitted"
                );
                self.session = Some(session);
                self.phase = Phase::Active;
                Ok(())
            }
            Err(e) => {
                self.phase = Phase::Rejected;
                self.metrics.admissions.with_label_values(&["rejected"]).inc();
                if let Some(json) = ServerEvent::DuplicateSession.to_json() {
                    self.conn.send(&json);
                }
                tracing::info!(
                    user_id = %self.identity.user_id,
                    conn_id = self.conn.conn_id,
                    "rejected duplicate session"
                );
                Err(e)
            }
        }
    }

    /// Record transport activity (any frame, pings and pongs included).
    pub fn mark_alive(&self) {
        self.conn.touch();
    }

    /// Handle one inbound text frame. Any frame counts as activity, whatever its content.
    pub fn handle_inbound(&self, text: &str) -> Result<(), ProtocolError> {
        self.mark_alive();
        let session = match (&self.session, self.phase) {
            (Some(session), Phase::Active) => session,
            _ => return Err(ProtocolError::NotActive),
        };
        match serde_json::from_str::<ClientEvent>(text)? {
            ClientEvent::PublicMessage { body } => {
                router::route_public(&self.registry, &self.metrics, session, &body);
            }
            ClientEvent::PrivateMessage {
                target_user_id,
                body,
            } => {
                router::route_private(&self.registry, &self.metrics, session, &target_user_id, &body);
            }
            ClientEvent::Ping => {
                tracing::trace!(user_id = %session.user_id, conn_id = self.conn.conn_id, "ws ping received");
                if let Some(json) = ServerEvent::Pong.to_json() {
                    self.conn.send(&json);
                }
            }
        }
        Ok(())
    }

    /// Tear the connection down. Idempotent.
    pub fn close(&mut self) {
        let was_registered = matches!(self.phase, Phase::Admitted | Phase::Active);
        if self.phase == Phase::Closed {
            return;
        }
        self.phase = Phase::Closed;
        self.session = None;
        if !was_registered {
            return;
        }

        let _membership = self.registry.lock_membership();
        match self.registry.remove(self.conn.conn_id) {
            Some(session) => {
                self.metrics.online_sessions.set(self.registry.len() as i64);
                presence::broadcast_presence(&self.registry, &self.metrics, None);
                tracing::info!(
                    user_id = %session.user_id,
                    conn_id = session.conn_id(),
                    online = self.registry.len(),
                    "session closed"
                );
            }
            None => {
                // Registered but already gone: nothing changed, so nothing to announce.
                tracing::error!(
                    user_id = %self.identity.user_id,
                    conn_id = self.conn.conn_id,
                    "active connection missing from presence registry"
                );
            }
        }
    }
}

impl Drop for ConnectionLifecycle {
    fn drop(&mut self) {
        self.close();
    }
}
