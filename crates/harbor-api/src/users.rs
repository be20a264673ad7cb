use axum::{Extension, Json, extract::State, http::StatusCode};
use tracing::{error, warn};
use uuid::Uuid;

use harbor_types::api::Claims;
use harbor_types::models::UserSummary;

use crate::auth::AppState;

/// Everyone except the caller, for picking a conversation partner.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<UserSummary>>, StatusCode> {
    // Run the blocking DB query off the async runtime
    let db = state.db.clone();
    let me = claims.sub.to_string();
    let rows = tokio::task::spawn_blocking(move || db.list_users_except(&me))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let users = rows
        .into_iter()
        .filter_map(|row| match row.id.parse::<Uuid>() {
            Ok(id) => Some(UserSummary {
                id,
                username: row.username,
                avatar_url: row.avatar_url,
            }),
            Err(e) => {
                warn!("Corrupt user id '{}': {}", row.id, e);
                None
            }
        })
        .collect();

    Ok(Json(users))
}
