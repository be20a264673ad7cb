use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use harbor_gateway::dispatcher::Dispatcher;
use harbor_types::events::GatewayEvent;
use harbor_types::models::Message;

use crate::error::ChatError;
use crate::store::ConversationStore;

/// Persists outbound messages and pushes them to the recipient's live
/// connection when one exists.
///
/// Live delivery is an optimization, not a correctness requirement: the
/// message is durable before any push is attempted, and an offline recipient
/// picks it up on the next fetch. Ordering is always persist-then-push so a
/// delivered message is always a stored message.
pub struct DeliveryRouter {
    store: Arc<dyn ConversationStore>,
    dispatcher: Dispatcher,
}

impl DeliveryRouter {
    pub fn new(store: Arc<dyn ConversationStore>, dispatcher: Dispatcher) -> Self {
        Self { store, dispatcher }
    }

    pub async fn send_message(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        text: &str,
        image_url: Option<&str>,
    ) -> Result<Message, ChatError> {
        if sender_id == recipient_id {
            return Err(ChatError::SelfMessage);
        }
        if text.trim().is_empty() && image_url.is_none() {
            return Err(ChatError::EmptyMessage);
        }

        let conversation = self
            .store
            .find_or_create_conversation(sender_id, recipient_id)
            .await?;

        let message = self
            .store
            .append_message(conversation.id, sender_id, text, image_url)
            .await?;

        if self.dispatcher.lookup(recipient_id).await.is_some() {
            debug!(
                "delivering message {} to live connection of {}",
                message.id, recipient_id
            );
            self.dispatcher
                .send_to_user(
                    recipient_id,
                    GatewayEvent::MessageDelivered {
                        message: message.clone(),
                    },
                )
                .await;
        }

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingStore, MemoryStore};
    use harbor_types::models::LastMessage;

    fn router_with(store: Arc<dyn ConversationStore>) -> (DeliveryRouter, Dispatcher) {
        let dispatcher = Dispatcher::new();
        (DeliveryRouter::new(store, dispatcher.clone()), dispatcher)
    }

    #[tokio::test]
    async fn self_message_is_rejected_before_persistence() {
        let store = Arc::new(MemoryStore::new());
        let (router, _dispatcher) = router_with(store.clone());
        let user = Uuid::new_v4();

        let result = router.send_message(user, user, "note to self", None).await;
        assert!(matches!(result, Err(ChatError::SelfMessage)));
        assert_eq!(store.conversation_count().await, 0);
        assert_eq!(store.message_count().await, 0);
    }

    #[tokio::test]
    async fn message_without_text_or_image_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let (router, _dispatcher) = router_with(store.clone());

        let result = router
            .send_message(Uuid::new_v4(), Uuid::new_v4(), "   ", None)
            .await;
        assert!(matches!(result, Err(ChatError::EmptyMessage)));
        assert_eq!(store.message_count().await, 0);
    }

    #[tokio::test]
    async fn image_only_message_is_allowed() {
        let store = Arc::new(MemoryStore::new());
        let (router, _dispatcher) = router_with(store);

        let message = router
            .send_message(
                Uuid::new_v4(),
                Uuid::new_v4(),
                "",
                Some("https://cdn.example/cat.png"),
            )
            .await
            .unwrap();
        assert_eq!(message.image_url.as_deref(), Some("https://cdn.example/cat.png"));
    }

    #[tokio::test]
    async fn first_message_creates_conversation_with_summary() {
        let store = Arc::new(MemoryStore::new());
        let (router, _dispatcher) = router_with(store.clone());
        let u1 = Uuid::new_v4();
        let u2 = Uuid::new_v4();

        let message = router.send_message(u1, u2, "hi", None).await.unwrap();
        assert_eq!(message.sender_id, u1);
        assert_eq!(message.text, "hi");
        assert!(!message.seen);

        let conversation = store
            .find_conversation(message.conversation_id)
            .await
            .unwrap()
            .unwrap();
        assert!(conversation.participants.contains(&u1));
        assert!(conversation.participants.contains(&u2));
        assert_eq!(
            conversation.last_message,
            Some(LastMessage {
                text: "hi".into(),
                sender_id: u1,
                seen: false,
            })
        );
    }

    #[tokio::test]
    async fn messages_between_the_same_pair_share_one_conversation() {
        let store = Arc::new(MemoryStore::new());
        let (router, _dispatcher) = router_with(store.clone());
        let u1 = Uuid::new_v4();
        let u2 = Uuid::new_v4();

        let first = router.send_message(u1, u2, "hi", None).await.unwrap();
        // The reply goes the other direction; the pair is unordered.
        let reply = router.send_message(u2, u1, "hey", None).await.unwrap();

        assert_eq!(first.conversation_id, reply.conversation_id);
        assert_eq!(store.conversation_count().await, 1);

        // Summary tracks the newest message, unseen again.
        let conversation = store
            .find_conversation(first.conversation_id)
            .await
            .unwrap()
            .unwrap();
        let summary = conversation.last_message.unwrap();
        assert_eq!(summary.text, "hey");
        assert_eq!(summary.sender_id, u2);
        assert!(!summary.seen);
    }

    #[tokio::test]
    async fn send_succeeds_identically_with_recipient_offline() {
        let store = Arc::new(MemoryStore::new());
        let (router, _dispatcher) = router_with(store.clone());

        // Nobody registered: the send still persists and returns the message.
        let message = router
            .send_message(Uuid::new_v4(), Uuid::new_v4(), "hello?", None)
            .await
            .unwrap();
        assert_eq!(store.message_count().await, 1);
        assert!(!message.seen);
    }

    #[tokio::test]
    async fn online_recipient_gets_a_live_push_and_sender_does_not() {
        let store = Arc::new(MemoryStore::new());
        let (router, dispatcher) = router_with(store);
        let u1 = Uuid::new_v4();
        let u2 = Uuid::new_v4();

        let (_c1, mut sender_rx) = dispatcher.register(u1).await;
        let (_c2, mut recipient_rx) = dispatcher.register(u2).await;

        let message = router.send_message(u1, u2, "hi", None).await.unwrap();

        match recipient_rx.recv().await.unwrap() {
            GatewayEvent::MessageDelivered { message: delivered } => {
                assert_eq!(delivered, message);
            }
            other => panic!("expected MessageDelivered, got {other:?}"),
        }
        // Targeted events go only to the recipient.
        assert!(sender_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_append_propagates_and_suppresses_the_push() {
        let store = FailingStore::new();
        let (router, dispatcher) = router_with(store.clone());
        let u1 = Uuid::new_v4();
        let u2 = Uuid::new_v4();

        let (_conn, mut recipient_rx) = dispatcher.register(u2).await;
        store.fail_next_append();

        let result = router.send_message(u1, u2, "hi", None).await;
        assert!(matches!(result, Err(ChatError::Store(_))));

        // No delivering a message that was never durably stored.
        assert!(recipient_rx.try_recv().is_err());
    }
}
