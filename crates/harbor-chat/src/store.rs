use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use harbor_types::models::{Conversation, ConversationSummary, Message};

/// Failure surfaced by the durable store. The relay performs no retries;
/// adapter errors propagate to the caller unmodified.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct StoreError(#[from] anyhow::Error);

/// Durable conversation/message persistence contract.
///
/// Each call is individually atomic; no transaction spans multiple calls.
/// Message order within a conversation is append order, and that order is
/// what readers see.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Find the conversation for the unordered pair `{a, b}`, creating it if
    /// absent. Atomic upsert keyed on the canonicalized pair: two racing
    /// first messages between the same pair resolve to one conversation.
    async fn find_or_create_conversation(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> Result<Conversation, StoreError>;

    async fn find_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<Conversation>, StoreError>;

    /// Read-only pair lookup. `None` when the pair never messaged.
    async fn find_conversation_by_participants(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> Result<Option<Conversation>, StoreError>;

    /// Insert a message and update the owning conversation's last-message
    /// summary in the same step. The new message starts unseen.
    async fn append_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        text: &str,
        image_url: Option<&str>,
    ) -> Result<Message, StoreError>;

    /// Flip every unseen message in the conversation and the summary flag.
    /// Conditional update: calling this when nothing is unseen is a no-op.
    async fn mark_conversation_seen(&self, conversation_id: Uuid) -> Result<(), StoreError>;

    /// Messages of a conversation, oldest first.
    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, StoreError>;

    /// The user's conversations with the other participant resolved to
    /// display data.
    async fn list_conversations_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ConversationSummary>, StoreError>;
}
