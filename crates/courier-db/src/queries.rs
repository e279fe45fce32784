use crate::Database;
use crate::models::{ConversationRow, MessageRow, UserRow};
use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use courier_types::convo::sorted_pair;

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        password_hash: &str,
        first_name: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, password, first_name) VALUES (?1, ?2, ?3, ?4)",
                (id, email, password_hash, first_name),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Updates name and (optionally) avatar, and marks the profile set up.
    /// A `None` image keeps whatever is stored.
    pub fn update_profile(
        &self,
        id: &str,
        first_name: &str,
        last_name: Option<&str>,
        image: Option<&str>,
    ) -> Result<Option<UserRow>> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users
                 SET first_name = ?2,
                     last_name = ?3,
                     image = COALESCE(?4, image),
                     profile_setup = 1
                 WHERE id = ?1",
                rusqlite::params![id, first_name, last_name, image],
            )?;
            query_user(conn, "id", id)
        })
    }

    /// All users except `excluding`, for the contact browser.
    pub fn list_contacts(&self, excluding: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE id != ?1 ORDER BY first_name, email"
            ))?;
            let rows = stmt
                .query_map([excluding], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Case-insensitive substring search over name and email, excluding the
    /// searching user. The term is escaped so `%` and `_` match literally.
    pub fn search_contacts(&self, excluding: &str, term: &str) -> Result<Vec<UserRow>> {
        let pattern = format!("%{}%", escape_like(term));

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE id != ?1
                   AND (first_name LIKE ?2 ESCAPE '\\'
                        OR last_name LIKE ?2 ESCAPE '\\'
                        OR email LIKE ?2 ESCAPE '\\')
                 ORDER BY first_name, email"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![excluding, pattern], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Conversations --

    pub fn find_conversation(&self, a: Uuid, b: Uuid) -> Result<Option<ConversationRow>> {
        let (lo, hi) = sorted_pair(a, b);

        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, participant_lo, participant_hi, created_at
                     FROM conversations
                     WHERE participant_lo = ?1 AND participant_hi = ?2",
                    rusqlite::params![lo.to_string(), hi.to_string()],
                    |row| {
                        Ok(ConversationRow {
                            id: row.get(0)?,
                            participant_lo: row.get(1)?,
                            participant_hi: row.get(2)?,
                            created_at: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Messages --

    /// Persists a message and its conversation membership in one transaction:
    /// find-or-create the conversation for the pair, take the next seq, insert
    /// the message with a server-assigned timestamp. Commit-or-nothing, so a
    /// reader never observes a conversation and message out of step.
    pub fn append_message(
        &self,
        message_id: Uuid,
        sender_id: Uuid,
        receiver_id: Uuid,
        body: &str,
    ) -> Result<MessageRow> {
        let (lo, hi) = sorted_pair(sender_id, receiver_id);

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO conversations (id, participant_lo, participant_hi)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(participant_lo, participant_hi) DO NOTHING",
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    lo.to_string(),
                    hi.to_string()
                ],
            )?;

            let conversation_id: String = tx.query_row(
                "SELECT id FROM conversations WHERE participant_lo = ?1 AND participant_hi = ?2",
                rusqlite::params![lo.to_string(), hi.to_string()],
                |row| row.get(0),
            )?;

            let seq: i64 = tx.query_row(
                "SELECT COALESCE(MAX(seq) + 1, 0) FROM messages WHERE conversation_id = ?1",
                [&conversation_id],
                |row| row.get(0),
            )?;

            let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

            tx.execute(
                "INSERT INTO messages (id, conversation_id, seq, sender_id, receiver_id, body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    message_id.to_string(),
                    conversation_id,
                    seq,
                    sender_id.to_string(),
                    receiver_id.to_string(),
                    body,
                    created_at
                ],
            )?;

            tx.commit()?;

            Ok(MessageRow {
                id: message_id.to_string(),
                conversation_id,
                seq,
                sender_id: sender_id.to_string(),
                receiver_id: receiver_id.to_string(),
                body: body.to_string(),
                created_at,
            })
        })
    }

    /// All messages of a conversation, chronological; seq breaks timestamp
    /// ties in insertion order.
    pub fn conversation_messages(&self, conversation_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, seq, sender_id, receiver_id, body, created_at
                 FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at, seq",
            )?;

            let rows = stmt
                .query_map([conversation_id], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        conversation_id: row.get(1)?,
                        seq: row.get(2)?,
                        sender_id: row.get(3)?,
                        receiver_id: row.get(4)?,
                        body: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

const USER_COLUMNS: &str =
    "id, email, password, first_name, last_name, image, profile_setup, created_at";

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"))?;

    let row = stmt.query_row([value], user_from_row).optional()?;

    Ok(row)
}

fn user_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<UserRow, rusqlite::Error> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        password: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        image: row.get(5)?,
        profile_setup: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
