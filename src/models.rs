//! Wire events exchanged over the WebSocket and the identity bound to each connection.

use serde::{Deserialize, Serialize};

/// Authenticated identity handed to the core by the verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
}

/// One entry of a presence snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub user_id: String,
    pub username: String,
}

/// Frames a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    PublicMessage { body: String },
    PrivateMessage { target_user_id: String, body: String },
    Ping,
}

/// Frames the server pushes to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    PresenceSnapshot {
        members: Vec<Member>,
    },
    PublicMessage {
        from_user_id: String,
        from_username: String,
        body: String,
    },
    PrivateMessage {
        from_user_id: String,
        from_username: String,
        body: String,
    },
    /// Sent back to the author of a private message once it reached the target.
    MessageDelivered {
        body: String,
    },
    RecipientOffline,
    DuplicateSession,
    Pong,
}

impl ServerEvent {
    /// Serialize once so the same text can be pushed to many connections.
    pub fn to_json(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(json) => Some(json),
            Err(e) => {
                tracing::error!("serialize server event: {:?}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_private_message_with_camel_case_target() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"type":"private_message","targetUserId":"u2","body":"yo"}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::PrivateMessage {
                target_user_id: "u2".into(),
                body: "yo".into()
            }
        );
    }

    #[test]
    fn parses_ping_without_payload() {
        let event: ClientEvent = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(event, ClientEvent::Ping);
    }

    #[test]
    fn rejects_unknown_client_event() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"type":"join_room"}"#).is_err());
    }

    #[test]
    fn server_events_use_type_tag_and_camel_case_fields() {
        let public = ServerEvent::PublicMessage {
            from_user_id: "u1".into(),
            from_username: "alice".into(),
            body: "hi".into(),
        };
        let value: serde_json::Value = serde_json::from_str(&public.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "public_message", "fromUserId": "u1", "fromUsername": "alice", "body": "hi"})
        );

        let offline: serde_json::Value =
            serde_json::from_str(&ServerEvent::RecipientOffline.to_json().unwrap()).unwrap();
        assert_eq!(offline, json!({"type": "recipient_offline"}));
    }

    #[test]
    fn snapshot_members_serialize_in_order() {
        let snapshot = ServerEvent::PresenceSnapshot {
            members: vec![
                Member { user_id: "u1".into(), username: "alice".into() },
                Member { user_id: "u2".into(), username: "bob".into() },
            ],
        };
        let value: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "presence_snapshot");
        assert_eq!(value["members"][0]["userId"], "u1");
        assert_eq!(value["members"][1]["username"], "bob");
    }
}
