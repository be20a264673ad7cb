use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use harbor_chat::error::ChatError;
use harbor_chat::store::StoreError;

/// REST mapping of the domain error taxonomy. Validation errors keep their
/// message; store failures are logged and answered with an opaque 500.
pub struct ApiError(ChatError);

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        Self(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(ChatError::Store(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ChatError::SelfMessage | ChatError::EmptyMessage => StatusCode::BAD_REQUEST,
            ChatError::UnknownConversation(_) => StatusCode::NOT_FOUND,
            ChatError::NotAParticipant { .. } => StatusCode::FORBIDDEN,
            ChatError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self.0 {
            ChatError::Store(err) => {
                error!("store failure: {err}");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
