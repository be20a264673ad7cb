use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use harbor_types::api::Claims;
use harbor_types::models::ConversationSummary;

use crate::auth::AppState;
use crate::error::ApiError;

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let conversations = state.store.list_conversations_for_user(claims.sub).await?;
    Ok(Json(conversations))
}

/// Mark every unseen message in the conversation as seen. Idempotent;
/// repeats and duplicate client events are persistence no-ops.
pub async fn mark_seen(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    state.reconciler.mark_seen(conversation_id, claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}
