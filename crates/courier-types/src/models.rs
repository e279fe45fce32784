use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's public profile as served by the API. The password hash never
/// leaves courier-db.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: Option<String>,
    /// Base64-encoded avatar, if one was uploaded.
    pub image: Option<String>,
    pub profile_setup: bool,
}

/// A contact listing entry. Same as [`Profile`] plus live presence,
/// derived from gateway room membership rather than storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub image: Option<String>,
    pub online: bool,
}

/// A single direct message. Immutable once persisted; `created_at` is
/// assigned by the server at persistence time and is the authoritative
/// ordering key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub message: String,
    pub created_at: DateTime<Utc>,
}
