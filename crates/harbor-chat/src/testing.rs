//! In-memory `ConversationStore` used by the router and reconciler tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use harbor_types::models::{
    Conversation, ConversationSummary, LastMessage, Message, UserSummary,
};

use crate::store::{ConversationStore, StoreError};

#[derive(Default)]
struct MemoryState {
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
}

pub(crate) struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub(crate) async fn conversation_count(&self) -> usize {
        self.state.lock().await.conversations.len()
    }

    pub(crate) async fn message_count(&self) -> usize {
        self.state.lock().await.messages.len()
    }
}

fn canonical_pair(a: Uuid, b: Uuid) -> [Uuid; 2] {
    if a <= b { [a, b] } else { [b, a] }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn find_or_create_conversation(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> Result<Conversation, StoreError> {
        let pair = canonical_pair(a, b);
        let mut state = self.state.lock().await;
        if let Some(existing) = state
            .conversations
            .iter()
            .find(|c| c.participants == pair)
        {
            return Ok(existing.clone());
        }
        let conversation = Conversation {
            id: Uuid::new_v4(),
            participants: pair,
            last_message: None,
            created_at: Utc::now(),
        };
        state.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn find_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<Conversation>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .conversations
            .iter()
            .find(|c| c.id == conversation_id)
            .cloned())
    }

    async fn find_conversation_by_participants(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> Result<Option<Conversation>, StoreError> {
        let pair = canonical_pair(a, b);
        let state = self.state.lock().await;
        Ok(state
            .conversations
            .iter()
            .find(|c| c.participants == pair)
            .cloned())
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        text: &str,
        image_url: Option<&str>,
    ) -> Result<Message, StoreError> {
        let mut state = self.state.lock().await;
        let conversation = state
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
            .ok_or_else(|| StoreError::from(anyhow!("no conversation {conversation_id}")))?;

        conversation.last_message = Some(LastMessage {
            text: text.to_string(),
            sender_id,
            seen: false,
        });

        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            text: text.to_string(),
            image_url: image_url.map(str::to_string),
            seen: false,
            created_at: Utc::now(),
        };
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn mark_conversation_seen(&self, conversation_id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        for message in state
            .messages
            .iter_mut()
            .filter(|m| m.conversation_id == conversation_id)
        {
            message.seen = true;
        }
        if let Some(conversation) = state
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        {
            if let Some(last) = conversation.last_message.as_mut() {
                last.seen = true;
            }
        }
        Ok(())
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn list_conversations_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ConversationSummary>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .conversations
            .iter()
            .filter_map(|c| {
                let other = c.other_participant(user_id)?;
                Some(ConversationSummary {
                    id: c.id,
                    participant: UserSummary {
                        id: other,
                        username: format!("user-{other}"),
                        avatar_url: None,
                    },
                    last_message: c.last_message.clone(),
                    created_at: c.created_at,
                })
            })
            .collect())
    }
}

/// Wraps a `MemoryStore` and fails the next `append_message` on demand, for
/// exercising the persist-then-push ordering.
pub(crate) struct FailingStore {
    inner: MemoryStore,
    fail_append: AtomicBool,
}

impl FailingStore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            fail_append: AtomicBool::new(false),
        })
    }

    pub(crate) fn fail_next_append(&self) {
        self.fail_append.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConversationStore for FailingStore {
    async fn find_or_create_conversation(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> Result<Conversation, StoreError> {
        self.inner.find_or_create_conversation(a, b).await
    }

    async fn find_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<Conversation>, StoreError> {
        self.inner.find_conversation(conversation_id).await
    }

    async fn find_conversation_by_participants(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> Result<Option<Conversation>, StoreError> {
        self.inner.find_conversation_by_participants(a, b).await
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        text: &str,
        image_url: Option<&str>,
    ) -> Result<Message, StoreError> {
        if self.fail_append.swap(false, Ordering::SeqCst) {
            return Err(StoreError::from(anyhow!("store unavailable")));
        }
        self.inner
            .append_message(conversation_id, sender_id, text, image_url)
            .await
    }

    async fn mark_conversation_seen(&self, conversation_id: Uuid) -> Result<(), StoreError> {
        self.inner.mark_conversation_seen(conversation_id).await
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, StoreError> {
        self.inner.list_messages(conversation_id).await
    }

    async fn list_conversations_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ConversationSummary>, StoreError> {
        self.inner.list_conversations_for_user(user_id).await
    }
}
