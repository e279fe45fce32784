use axum::{
    Extension, Json,
    extract::{Path, State},
};
use uuid::Uuid;

use courier_types::api::{Claims, HistoryResponse, SendMessageRequest, SendMessageResponse};

use crate::auth::AppState;
use crate::service::ServiceError;

pub async fn send_message(
    State(state): State<AppState>,
    Path(receiver_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ServiceError> {
    let new_message = state
        .messages
        .send_message(claims.sub, receiver_id, &req.message)
        .await?;

    Ok(Json(SendMessageResponse {
        message: "Message sent successfully".into(),
        new_message,
    }))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(receiver_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<HistoryResponse>, ServiceError> {
    let history = state.messages.get_history(claims.sub, receiver_id).await?;
    Ok(Json(history))
}
