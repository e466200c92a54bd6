//! Message router: public broadcast and private point-to-point delivery over the presence registry.
//! Fire-and-forget; a dead or slow recipient is skipped, never waited on.

use crate::metrics::Metrics;
use crate::models::ServerEvent;
use crate::registry::{PresenceRegistry, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivateOutcome {
    Delivered,
    RecipientOffline,
}

/// Deliver `body` to every session except the sender's connection. Returns how many were queued.
pub fn route_public(
    registry: &PresenceRegistry,
    metrics: &Metrics,
    sender: &Session,
    body: &str,
) -> usize {
    metrics.messages_routed.with_label_values(&["public"]).inc();
    let event = ServerEvent::PublicMessage {
        from_user_id: sender.user_id.clone(),
        from_username: sender.username.clone(),
        body: body.to_string(),
    };
    let Some(json) = event.to_json() else {
        return 0;
    };
    let recipients = registry.snapshot(Some(sender.conn_id()));
    let delivered = recipients.iter().filter(|s| s.conn.send(&json)).count();
    metrics.record_drops(recipients.len() - delivered);
    tracing::debug!(
        user_id = %sender.user_id,
        recipients = recipients.len(),
        delivered,
        "public message routed"
    );
    delivered
}

/// Deliver `body` to `target_user_id` and confirm to the sender, or tell the sender the target is offline.
pub fn route_private(
    registry: &PresenceRegistry,
    metrics: &Metrics,
    sender: &Session,
    target_user_id: &str,
    body: &str,
) -> PrivateOutcome {
    let Some(target) = registry.find(target_user_id) else {
        metrics.messages_routed.with_label_values(&["offline"]).inc();
        tracing::debug!(
            user_id = %sender.user_id,
            target_user_id,
            "private message target offline"
        );
        deliver(metrics, sender, &ServerEvent::RecipientOffline);
        return PrivateOutcome::RecipientOffline;
    };

    metrics.messages_routed.with_label_values(&["private"]).inc();
    deliver(
        metrics,
        &target,
        &ServerEvent::PrivateMessage {
            from_user_id: sender.user_id.clone(),
            from_username: sender.username.clone(),
            body: body.to_string(),
        },
    );
    deliver(
        metrics,
        sender,
        &ServerEvent::MessageDelivered {
            body: body.to_string(),
        },
    );
    tracing::debug!(
        user_id = %sender.user_id,
        target_user_id,
        target_conn_id = target.conn_id(),
        "private message routed"
    );
    PrivateOutcome::Delivered
}

fn deliver(metrics: &Metrics, session: &Session, event: &ServerEvent) {
    let sent = event.to_json().is_some_and(|json| session.conn.send(&json));
    if !sent {
        metrics.record_drops(1);
    }
}
