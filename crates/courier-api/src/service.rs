use std::sync::Arc;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use tracing::{error, warn};
use uuid::Uuid;

use courier_db::Database;
use courier_db::models::MessageRow;
use courier_gateway::dispatcher::Dispatcher;
use courier_types::api::HistoryResponse;
use courier_types::events::GatewayEvent;
use courier_types::models::Message;

/// Upper bound on a message body, in characters, after trimming.
pub const MAX_MESSAGE_CHARS: usize = 5000;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Rejected before any persistence attempt.
    #[error("{0}")]
    Validation(String),

    /// No conversation exists for the pair. An empty-history signal, not a
    /// server failure.
    #[error("conversation not found")]
    NotFound,

    /// Store read/write failure. The operation is not retried and nothing
    /// is pushed to the gateway.
    #[error("storage failure")]
    Persistence(#[from] anyhow::Error),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::NotFound => (StatusCode::NOT_FOUND, "Conversation not found".to_string()),
            Self::Persistence(e) => {
                error!("message store failure: {e:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(serde_json::json!({ "message": message }))).into_response()
    }
}

/// Orchestrates message traffic: on send, find-or-create the conversation,
/// persist the message, then push it to both participant rooms; on read,
/// reconstruct the ordered pairwise history.
///
/// The gateway handle is injected at construction — the dispatcher is
/// in-process and observable, so tests join rooms on a real one and assert
/// deliveries instead of mocking.
#[derive(Clone)]
pub struct MessageService {
    db: Arc<Database>,
    gateway: Dispatcher,
}

impl MessageService {
    pub fn new(db: Arc<Database>, gateway: Dispatcher) -> Self {
        Self { db, gateway }
    }

    pub async fn send_message(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        body: &str,
    ) -> Result<Message, ServiceError> {
        let body = body.trim();
        if sender_id == receiver_id {
            return Err(ServiceError::Validation(
                "sender and receiver must be distinct".into(),
            ));
        }
        if body.is_empty() {
            return Err(ServiceError::Validation("message must not be empty".into()));
        }
        if body.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ServiceError::Validation(format!(
                "message exceeds {MAX_MESSAGE_CHARS} characters"
            )));
        }

        // Run blocking DB work off the async runtime
        let db = self.db.clone();
        let body_owned = body.to_string();
        let message_id = Uuid::new_v4();
        let row = tokio::task::spawn_blocking(move || {
            match db.get_user_by_id(&receiver_id.to_string()) {
                Ok(Some(_)) => db
                    .append_message(message_id, sender_id, receiver_id, &body_owned)
                    .map_err(ServiceError::Persistence),
                Ok(None) => Err(ServiceError::Validation(format!(
                    "unknown receiver {receiver_id}"
                ))),
                Err(e) => Err(ServiceError::Persistence(e)),
            }
        })
        .await
        .map_err(|e| ServiceError::Persistence(anyhow::anyhow!("blocking task failed: {e}")))??;

        let message = message_from_row(&row);

        // Persisted — push to both rooms so every open session of either
        // participant sees it live. Rooms with no members drop it; those
        // clients catch up from history.
        let event = GatewayEvent::NewMessage {
            id: message.id,
            sender_id,
            receiver_id,
            message: message.message.clone(),
            created_at: message.created_at,
        };
        self.gateway.publish(sender_id, event.clone()).await;
        self.gateway.publish(receiver_id, event).await;

        Ok(message)
    }

    /// History for the unordered pair, partitioned into the requester's sent
    /// and received sequences. Chronological merging is the consumer's job.
    pub async fn get_history(
        &self,
        requester_id: Uuid,
        counterpart_id: Uuid,
    ) -> Result<HistoryResponse, ServiceError> {
        let db = self.db.clone();
        let found = tokio::task::spawn_blocking(
            move || -> anyhow::Result<Option<(String, Vec<MessageRow>)>> {
                let Some(convo) = db.find_conversation(requester_id, counterpart_id)? else {
                    return Ok(None);
                };
                let rows = db.conversation_messages(&convo.id)?;
                Ok(Some((convo.id, rows)))
            },
        )
        .await
        .map_err(|e| ServiceError::Persistence(anyhow::anyhow!("blocking task failed: {e}")))?
        .map_err(ServiceError::Persistence)?;

        let Some((conversation_id, rows)) = found else {
            return Err(ServiceError::NotFound);
        };

        let mut sent = Vec::new();
        let mut received = Vec::new();
        for row in &rows {
            let message = message_from_row(row);
            if message.sender_id == requester_id {
                sent.push(message);
            } else {
                received.push(message);
            }
        }

        Ok(HistoryResponse {
            sender_messages: sent,
            receiver_messages: received,
            conversation_id: parse_uuid(&conversation_id, "conversation id"),
            sender_id: requester_id,
            receiver_id: counterpart_id,
        })
    }
}

fn message_from_row(row: &MessageRow) -> Message {
    Message {
        id: parse_uuid(&row.id, "message id"),
        sender_id: parse_uuid(&row.sender_id, "sender id"),
        receiver_id: parse_uuid(&row.receiver_id, "receiver id"),
        message: row.body.clone(),
        created_at: parse_created_at(&row.created_at, &row.id),
    }
}

fn parse_uuid(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {what} '{raw}': {e}");
        Uuid::default()
    })
}

fn parse_created_at(raw: &str, message_id: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') stores "YYYY-MM-DD HH:MM:SS" without
            // a timezone. Parse as naive UTC and convert.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{raw}' on message '{message_id}': {e}");
            DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> MessageService {
        let db = Arc::new(Database::open_in_memory().unwrap());
        MessageService::new(db, Dispatcher::new())
    }

    #[tokio::test]
    async fn rejects_self_send() {
        let svc = service();
        let me = Uuid::new_v4();

        let err = svc.send_message(me, me, "hi").await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn rejects_blank_body() {
        let svc = service();

        let err = svc
            .send_message(Uuid::new_v4(), Uuid::new_v4(), "   \n\t ")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn rejects_unknown_receiver() {
        let svc = service();

        let err = svc
            .send_message(Uuid::new_v4(), Uuid::new_v4(), "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn created_at_parses_both_formats() {
        let rfc = parse_created_at("2025-04-01T12:00:00.000000Z", "m1");
        let naive = parse_created_at("2025-04-01 12:00:00", "m2");
        assert_eq!(rfc, naive);
    }
}
