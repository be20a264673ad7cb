use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use harbor_types::api::{Claims, SendMessageRequest};
use harbor_types::models::Message;

use crate::auth::AppState;
use crate::error::ApiError;

/// Send a direct message. Persistence happens before any live push, and the
/// response carries the stored message whether or not the recipient was
/// online to receive it immediately.
pub async fn send_message(
    State(state): State<AppState>,
    Path(recipient_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state
        .router
        .send_message(
            claims.sub,
            recipient_id,
            req.text.as_deref().unwrap_or(""),
            req.image_url.as_deref(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// Message history with one other user, oldest first. An empty list when the
/// pair never messaged — the conversation is created lazily by the first
/// send, not by reads.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(other_user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let conversation = state
        .store
        .find_conversation_by_participants(claims.sub, other_user_id)
        .await?;

    let messages = match conversation {
        Some(conversation) => state.store.list_messages(conversation.id).await?,
        None => Vec::new(),
    };

    Ok(Json(messages))
}
