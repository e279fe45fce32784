/// Database row types — these map directly to SQLite rows.
/// Distinct from the courier-types API models to keep the DB layer
/// independent.

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub image: Option<String>,
    pub profile_setup: bool,
    pub created_at: String,
}

pub struct ConversationRow {
    pub id: String,
    pub participant_lo: String,
    pub participant_hi: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub seq: i64,
    pub sender_id: String,
    pub receiver_id: String,
    pub body: String,
    pub created_at: String,
}
