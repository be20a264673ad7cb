use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the connection is authenticated and live.
    Ready { user_id: Uuid, username: String },

    /// Full snapshot of the online user set. Broadcast to every connection
    /// on each registry mutation; clients replace their set wholesale.
    PresenceUpdate { user_ids: Vec<Uuid> },

    /// A new message for this client, pushed only to the recipient's
    /// connection and only if it was online at send time.
    MessageDelivered { message: Message },

    /// The other side viewed the conversation; sent to the original
    /// sender's connection so its UI can flip the seen indicator.
    SeenAck { conversation_id: Uuid },
}
