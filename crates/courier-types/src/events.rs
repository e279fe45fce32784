use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Events pushed from the server over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum GatewayEvent {
    /// Server confirms the connection joined its room.
    Ready { user_id: Uuid },

    /// A new message was persisted. Sent to both participant rooms, so the
    /// sender's other open sessions observe their own sends.
    NewMessage {
        id: Uuid,
        sender_id: Uuid,
        receiver_id: Uuid,
        message: String,
        created_at: DateTime<Utc>,
    },

    /// A user's room gained its first connection or lost its last one.
    Presence { user_id: Uuid, online: bool },
}

impl GatewayEvent {
    /// The pushed message, when this event carries one.
    pub fn message(&self) -> Option<Message> {
        match self {
            Self::NewMessage {
                id,
                sender_id,
                receiver_id,
                message,
                created_at,
            } => Some(Message {
                id: *id,
                sender_id: *sender_id,
                receiver_id: *receiver_id,
                message: message.clone(),
                created_at: *created_at,
            }),
            _ => None,
        }
    }
}

/// Commands sent from client to server over the WebSocket gateway.
/// The join payload is a trusted identity; the caller authenticates the
/// session before connecting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum GatewayCommand {
    /// Join the per-user broadcast room for `user_id`.
    Join { user_id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_message_wire_shape() {
        let event = GatewayEvent::NewMessage {
            id: Uuid::nil(),
            sender_id: Uuid::nil(),
            receiver_id: Uuid::nil(),
            message: "hi".into(),
            created_at: DateTime::<Utc>::default(),
        };

        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(json["type"], "newMessage");
        assert_eq!(json["data"]["senderId"], Uuid::nil().to_string());
        assert_eq!(json["data"]["message"], "hi");
        assert!(json["data"]["createdAt"].is_string());
    }

    #[test]
    fn join_command_parses() {
        let user_id = Uuid::new_v4();
        let raw = format!(r#"{{"type":"join","data":{{"userId":"{user_id}"}}}}"#);

        let cmd: GatewayCommand = serde_json::from_str(&raw).unwrap();
        let GatewayCommand::Join { user_id: parsed } = cmd;
        assert_eq!(parsed, user_id);
    }
}
