//! Presence broadcaster. Every membership change re-sends the full member list; there is no diff protocol.
//!
//! Snapshots always list every registered member, the recipient included. Clients drop
//! their own entry by user id.

use crate::metrics::Metrics;
use crate::models::ServerEvent;
use crate::registry::{ConnectionHandle, PresenceRegistry};

pub fn snapshot_event(registry: &PresenceRegistry) -> ServerEvent {
    ServerEvent::PresenceSnapshot {
        members: registry.members(),
    }
}

/// Push the current member list to every session except `exclude`. Returns how many were queued.
pub fn broadcast_presence(
    registry: &PresenceRegistry,
    metrics: &Metrics,
    exclude: Option<u64>,
) -> usize {
    let Some(json) = snapshot_event(registry).to_json() else {
        return 0;
    };
    let recipients = registry.snapshot(exclude);
    let delivered = recipients.iter().filter(|s| s.conn.send(&json)).count();
    metrics.record_drops(recipients.len() - delivered);
    tracing::debug!(
        members = registry.len(),
        recipients = recipients.len(),
        delivered,
        "presence broadcast"
    );
    delivered
}

/// Send the current member list to a single connection.
pub fn send_snapshot_to(registry: &PresenceRegistry, metrics: &Metrics, conn: &ConnectionHandle) -> bool {
    let sent = snapshot_event(registry)
        .to_json()
        .is_some_and(|json| conn.send(&json));
    if !sent {
        metrics.record_drops(1);
    }
    sent
}
