//! `ConversationStore` implementation over SQLite. Each trait call runs on
//! the blocking pool; atomicity per call comes from the transactions in
//! `queries`.

use async_trait::async_trait;
use uuid::Uuid;

use harbor_chat::store::{ConversationStore, StoreError};
use harbor_types::models::{Conversation, ConversationSummary, Message};

use crate::Database;
use crate::queries;

#[async_trait]
impl ConversationStore for Database {
    async fn find_or_create_conversation(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> Result<Conversation, StoreError> {
        self.run_blocking(move |conn| queries::upsert_conversation(conn, a, b))
            .await
            .map_err(StoreError::from)
    }

    async fn find_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<Conversation>, StoreError> {
        self.run_blocking(move |conn| queries::conversation_by_id(conn, conversation_id))
            .await
            .map_err(StoreError::from)
    }

    async fn find_conversation_by_participants(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> Result<Option<Conversation>, StoreError> {
        self.run_blocking(move |conn| queries::conversation_by_participants(conn, a, b))
            .await
            .map_err(StoreError::from)
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        text: &str,
        image_url: Option<&str>,
    ) -> Result<Message, StoreError> {
        let text = text.to_string();
        let image_url = image_url.map(str::to_string);
        self.run_blocking(move |conn| {
            queries::insert_message(conn, conversation_id, sender_id, &text, image_url.as_deref())
        })
        .await
        .map_err(StoreError::from)
    }

    async fn mark_conversation_seen(&self, conversation_id: Uuid) -> Result<(), StoreError> {
        self.run_blocking(move |conn| queries::mark_conversation_seen(conn, conversation_id))
            .await
            .map_err(StoreError::from)
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, StoreError> {
        self.run_blocking(move |conn| queries::messages_for_conversation(conn, conversation_id))
            .await
            .map_err(StoreError::from)
    }

    async fn list_conversations_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ConversationSummary>, StoreError> {
        self.run_blocking(move |conn| queries::conversations_for_user(conn, user_id))
            .await
            .map_err(StoreError::from)
    }
}
