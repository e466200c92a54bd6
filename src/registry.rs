//! Presence registry: the set of live sessions keyed by user id, at most one per user.
//! Admission is an atomic check-and-insert; sends to a connection never block.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::AdmitError;
use crate::models::{Identity, Member};

/// Per-connection state: sender to push frames to the socket task, last inbound activity for
/// the liveness timeout, and a token the registry cancels to force the connection closed.
#[derive(Debug)]
pub struct ConnectionEntry {
    pub conn_id: u64,
    tx: mpsc::Sender<String>,
    /// Unix timestamp (seconds) of the last frame received from the client, pongs included.
    pub last_seen_at: AtomicU64,
    shutdown: CancellationToken,
}

/// Opaque address of one live connection.
pub type ConnectionHandle = Arc<ConnectionEntry>;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(0);

fn next_conn_id() -> u64 {
    NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed)
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl ConnectionEntry {
    /// Create a handle with a bounded outbound queue of `buffer` frames.
    /// The receiver belongs to the socket task.
    pub fn open(buffer: usize) -> (ConnectionHandle, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let entry = Arc::new(ConnectionEntry {
            conn_id: next_conn_id(),
            tx,
            last_seen_at: AtomicU64::new(now_secs()),
            shutdown: CancellationToken::new(),
        });
        (entry, rx)
    }

    /// Best-effort enqueue. A full or closed queue drops the frame; returns whether it was queued.
    pub fn send(&self, message: &str) -> bool {
        match self.tx.try_send(message.to_string()) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(conn_id = self.conn_id, "ws try_send dropped: {}", e);
                false
            }
        }
    }

    pub fn touch(&self) {
        self.last_seen_at.store(now_secs(), Ordering::Relaxed);
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Ask the owning socket task to close this connection.
    pub fn close(&self) {
        self.shutdown.cancel();
    }
}

/// One live connection bound to an authenticated identity.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub username: String,
    pub conn: ConnectionHandle,
    /// Admission sequence number, assigned by the registry.
    joined_seq: u64,
}

impl Session {
    pub fn new(identity: Identity, conn: ConnectionHandle) -> Self {
        Self {
            user_id: identity.user_id,
            username: identity.username,
            conn,
            joined_seq: 0,
        }
    }

    pub fn conn_id(&self) -> u64 {
        self.conn.conn_id
    }

    pub fn member(&self) -> Member {
        Member {
            user_id: self.user_id.clone(),
            username: self.username.clone(),
        }
    }
}

/// Registry of live sessions per user id. Thread-safe; shared via Arc.
pub struct PresenceRegistry {
    /// user id -> its single session.
    sessions: DashMap<String, Arc<Session>>,
    /// Held across a membership change and the broadcast that announces it.
    membership: Mutex<()>,
    next_seq: AtomicU64,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            membership: Mutex::new(()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Serializes membership changes together with their presence broadcast.
    pub fn lock_membership(&self) -> MutexGuard<'_, ()> {
        self.membership.lock()
    }

    /// Insert the session iff no session exists for its user id. Check and insert happen
    /// under the same shard lock, so two concurrent admissions of one user cannot both pass.
    pub fn admit(&self, mut session: Session) -> Result<Arc<Session>, AdmitError> {
        match self.sessions.entry(session.user_id.clone()) {
            Entry::Occupied(existing) => {
                tracing::debug!(
                    user_id = %session.user_id,
                    existing_conn_id = existing.get().conn_id(),
                    rejected_conn_id = session.conn_id(),
                    "admission rejected"
                );
                Err(AdmitError::AlreadyOnline(session.user_id))
            }
            Entry::Vacant(slot) => {
                session.joined_seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                let session = Arc::new(session);
                slot.insert(session.clone());
                Ok(session)
            }
        }
    }

    /// Remove the session owning `conn_id`. Absent handles are a no-op.
    pub fn remove(&self, conn_id: u64) -> Option<Arc<Session>> {
        let user_id = self
            .sessions
            .iter()
            .find(|s| s.conn_id() == conn_id)
            .map(|s| s.key().clone())?;
        // Only remove if the slot still belongs to this connection.
        self.sessions
            .remove_if(&user_id, |_, s| s.conn_id() == conn_id)
            .map(|(_, session)| session)
    }

    pub fn find(&self, user_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(user_id).map(|s| s.value().clone())
    }

    /// Current sessions in admission order, optionally leaving one connection out.
    pub fn snapshot(&self, exclude: Option<u64>) -> Vec<Arc<Session>> {
        let mut sessions: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .filter(|s| Some(s.conn_id()) != exclude)
            .map(|s| s.value().clone())
            .collect();
        sessions.sort_by_key(|s| s.joined_seq);
        sessions
    }

    pub fn members(&self) -> Vec<Member> {
        self.snapshot(None).iter().map(|s| s.member()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Signal connections that have sent nothing, not even a pong, for more than `max_age_secs`
    /// seconds to close.
    /// Removal is left to each connection's own teardown so it happens exactly once.
    /// Call periodically (e.g. every 60s) from a background task.
    pub fn prune_stale(&self, max_age_secs: u64) -> usize {
        let now = now_secs();
        let stale: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .filter(|s| {
                now.saturating_sub(s.conn.last_seen_at.load(Ordering::Relaxed)) > max_age_secs
            })
            .map(|s| s.value().clone())
            .collect();
        for session in &stale {
            tracing::info!(
                user_id = %session.user_id,
                conn_id = session.conn_id(),
                "closing stale connection"
            );
            session.conn.close();
        }
        stale.len()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
