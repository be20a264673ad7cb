use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use harbor_gateway::dispatcher::Dispatcher;
use harbor_types::events::GatewayEvent;

use crate::error::ChatError;
use crate::store::ConversationStore;

/// Marks a conversation's unseen messages as seen and notifies the original
/// sender's live connection.
///
/// Racing or duplicate calls for the same conversation all succeed: the
/// store's conditional update makes the repeats persistence no-ops, and the
/// ack push is best-effort like every live push.
pub struct SeenReconciler {
    store: Arc<dyn ConversationStore>,
    dispatcher: Dispatcher,
}

impl SeenReconciler {
    pub fn new(store: Arc<dyn ConversationStore>, dispatcher: Dispatcher) -> Self {
        Self { store, dispatcher }
    }

    pub async fn mark_seen(
        &self,
        conversation_id: Uuid,
        viewer_id: Uuid,
    ) -> Result<(), ChatError> {
        let conversation = self
            .store
            .find_conversation(conversation_id)
            .await?
            .ok_or(ChatError::UnknownConversation(conversation_id))?;

        // The other participant is the sender whose messages the viewer just
        // saw; only a participant may flip a conversation's seen state.
        let other = conversation
            .other_participant(viewer_id)
            .ok_or(ChatError::NotAParticipant {
                user_id: viewer_id,
                conversation_id,
            })?;

        self.store.mark_conversation_seen(conversation_id).await?;

        if self.dispatcher.lookup(other).await.is_some() {
            debug!("acking seen state of {} to {}", conversation_id, other);
            self.dispatcher
                .send_to_user(other, GatewayEvent::SeenAck { conversation_id })
                .await;
        }

        Ok(())
    }
}
