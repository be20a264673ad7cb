/// Database row types — these map directly to SQLite rows.
/// Distinct from harbor-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub avatar_url: Option<String>,
    pub created_at: String,
}

pub struct ConversationRow {
    pub id: String,
    pub participant_lo: String,
    pub participant_hi: String,
    pub last_message_text: Option<String>,
    pub last_message_sender_id: Option<String>,
    pub last_message_seen: bool,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub text: String,
    pub image_url: Option<String>,
    pub seen: bool,
    pub created_at: String,
}
