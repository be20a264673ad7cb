use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Denormalized summary of the newest message, stored on the conversation
/// itself so listings don't have to touch the messages table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    pub text: String,
    pub sender_id: Uuid,
    pub seen: bool,
}

/// A two-party message thread. Exactly one exists per unordered pair of
/// participants; `last_message` is `None` only before the first message
/// lands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub participants: [Uuid; 2],
    pub last_message: Option<LastMessage>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// The participant that isn't `user_id`, or `None` when `user_id`
    /// isn't part of this conversation.
    pub fn other_participant(&self, user_id: Uuid) -> Option<Uuid> {
        let [a, b] = self.participants;
        if a == user_id {
            Some(b)
        } else if b == user_id {
            Some(a)
        } else {
            None
        }
    }
}

/// Immutable once written, except `seen` which only ever flips false -> true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub text: String,
    pub image_url: Option<String>,
    pub seen: bool,
    pub created_at: DateTime<Utc>,
}

/// Display data for a user, as shown in sidebars and conversation listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// A conversation as listed for one of its participants: the *other*
/// participant is resolved to display data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub participant: UserSummary,
    pub last_message: Option<LastMessage>,
    pub created_at: DateTime<Utc>,
}
