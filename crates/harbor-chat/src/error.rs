use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

/// Domain errors of the relay. Validation variants are rejected before any
/// persistence is attempted; `Store` wraps an adapter failure unmodified.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("cannot send a message to yourself")]
    SelfMessage,

    #[error("a message needs text or an image")]
    EmptyMessage,

    #[error("conversation {0} not found")]
    UnknownConversation(Uuid),

    #[error("user {user_id} is not a participant of conversation {conversation_id}")]
    NotAParticipant {
        user_id: Uuid,
        conversation_id: Uuid,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
