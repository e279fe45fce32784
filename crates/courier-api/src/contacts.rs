use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::warn;
use uuid::Uuid;

use courier_db::models::UserRow;
use courier_gateway::dispatcher::Dispatcher;
use courier_types::api::{Claims, SearchRequest};
use courier_types::models::Contact;

use crate::auth::AppState;

/// Substring search over other users' names and emails.
pub async fn search(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SearchRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let term = req.search.trim();
    if term.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let rows = state
        .db
        .search_contacts(&claims.sub.to_string(), term)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(with_presence(&state.dispatcher, rows).await))
}

/// Every registered user except the caller.
pub async fn all(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let rows = state
        .db
        .list_contacts(&claims.sub.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(with_presence(&state.dispatcher, rows).await))
}

/// Presence comes from gateway room membership, not storage.
async fn with_presence(dispatcher: &Dispatcher, rows: Vec<UserRow>) -> Vec<Contact> {
    let mut contacts = Vec::with_capacity(rows.len());
    for row in rows {
        let id: Uuid = match row.id.parse() {
            Ok(id) => id,
            Err(e) => {
                warn!("Corrupt user id '{}': {}", row.id, e);
                continue;
            }
        };
        contacts.push(Contact {
            id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            image: row.image,
            online: dispatcher.is_online(id).await,
        });
    }
    contacts
}
