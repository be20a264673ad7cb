use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use harbor_types::models::{
    Conversation, ConversationSummary, LastMessage, Message, UserSummary,
};

use crate::Database;
use crate::models::{ConversationRow, MessageRow, UserRow};

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Every user except `id`, for the conversation-partner sidebar.
    pub fn list_users_except(&self, id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, password, avatar_url, created_at
                 FROM users WHERE id != ?1 ORDER BY username",
            )?;
            let rows = stmt
                .query_map([id], user_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

// -- Conversations --

/// Atomic find-or-create for the unordered pair `{a, b}`. The INSERT OR
/// IGNORE against the canonicalized-pair UNIQUE key means two racing first
/// messages land on the same row.
pub(crate) fn upsert_conversation(conn: &mut Connection, a: Uuid, b: Uuid) -> Result<Conversation> {
    let (lo, hi) = canonical_pair(a, b);
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT OR IGNORE INTO conversations (id, participant_lo, participant_hi)
         VALUES (?1, ?2, ?3)",
        params![Uuid::new_v4().to_string(), lo, hi],
    )?;

    let row = conversation_row_by_pair(&tx, &lo, &hi)?
        .ok_or_else(|| anyhow!("conversation for pair ({lo}, {hi}) missing after upsert"))?;
    tx.commit()?;

    conversation_from_row(row)
}

pub(crate) fn conversation_by_id(conn: &Connection, id: Uuid) -> Result<Option<Conversation>> {
    let row = conn
        .prepare(
            "SELECT id, participant_lo, participant_hi, last_message_text,
                    last_message_sender_id, last_message_seen, created_at
             FROM conversations WHERE id = ?1",
        )?
        .query_row([id.to_string()], conversation_row)
        .optional()?;

    row.map(conversation_from_row).transpose()
}

pub(crate) fn conversation_by_participants(
    conn: &Connection,
    a: Uuid,
    b: Uuid,
) -> Result<Option<Conversation>> {
    let (lo, hi) = canonical_pair(a, b);
    conversation_row_by_pair(conn, &lo, &hi)?
        .map(conversation_from_row)
        .transpose()
}

/// Conversations of `user_id`, newest first, with the other participant
/// resolved to display data in a single JOIN (no N+1).
pub(crate) fn conversations_for_user(
    conn: &Connection,
    user_id: Uuid,
) -> Result<Vec<ConversationSummary>> {
    let uid = user_id.to_string();
    let mut stmt = conn.prepare(
        "SELECT c.id, c.last_message_text, c.last_message_sender_id,
                c.last_message_seen, c.created_at,
                u.id, u.username, u.avatar_url
         FROM conversations c
         JOIN users u ON u.id = CASE WHEN c.participant_lo = ?1
                                     THEN c.participant_hi
                                     ELSE c.participant_lo END
         WHERE c.participant_lo = ?1 OR c.participant_hi = ?1
         ORDER BY c.created_at DESC",
    )?;

    let rows = stmt
        .query_map([uid.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, bool>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, Option<String>>(7)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(
            |(id, last_text, last_sender, last_seen, created_at, other_id, username, avatar_url)| {
                Ok(ConversationSummary {
                    id: parse_uuid(&id)?,
                    participant: UserSummary {
                        id: parse_uuid(&other_id)?,
                        username,
                        avatar_url,
                    },
                    last_message: last_message_from_parts(last_text, last_sender, last_seen)?,
                    created_at: parse_timestamp(&created_at)?,
                })
            },
        )
        .collect()
}

// -- Messages --

/// Insert a message and refresh the owning conversation's last-message
/// summary in one transaction. The summary always reflects the newest
/// message and resets to unseen.
pub(crate) fn insert_message(
    conn: &mut Connection,
    conversation_id: Uuid,
    sender_id: Uuid,
    text: &str,
    image_url: Option<&str>,
) -> Result<Message> {
    let id = Uuid::new_v4();
    let created_at = Utc::now();

    let tx = conn.transaction()?;

    let updated = tx.execute(
        "UPDATE conversations
         SET last_message_text = ?2, last_message_sender_id = ?3, last_message_seen = 0
         WHERE id = ?1",
        params![conversation_id.to_string(), text, sender_id.to_string()],
    )?;
    if updated == 0 {
        bail!("conversation {} not found", conversation_id);
    }

    tx.execute(
        "INSERT INTO messages (id, conversation_id, sender_id, text, image_url, seen, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
        params![
            id.to_string(),
            conversation_id.to_string(),
            sender_id.to_string(),
            text,
            image_url,
            created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        ],
    )?;

    tx.commit()?;

    Ok(Message {
        id,
        conversation_id,
        sender_id,
        text: text.to_string(),
        image_url: image_url.map(str::to_string),
        seen: false,
        created_at,
    })
}

/// Conditional seen flip: unseen messages and the summary flag go true,
/// rows already seen are untouched. Running this twice is a no-op.
pub(crate) fn mark_conversation_seen(conn: &mut Connection, conversation_id: Uuid) -> Result<()> {
    let id = conversation_id.to_string();
    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE messages SET seen = 1 WHERE conversation_id = ?1 AND seen = 0",
        [&id],
    )?;
    tx.execute(
        "UPDATE conversations SET last_message_seen = 1
         WHERE id = ?1 AND last_message_text IS NOT NULL",
        [&id],
    )?;
    tx.commit()?;
    Ok(())
}

/// Messages oldest first. Append order: created_at with rowid as the
/// tiebreaker for same-millisecond writes.
pub(crate) fn messages_for_conversation(
    conn: &Connection,
    conversation_id: Uuid,
) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT id, conversation_id, sender_id, text, image_url, seen, created_at
         FROM messages
         WHERE conversation_id = ?1
         ORDER BY created_at, rowid",
    )?;

    let rows = stmt
        .query_map([conversation_id.to_string()], message_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter().map(message_from_row).collect()
}

// -- Row mapping --

fn user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        avatar_url: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, username, password, avatar_url, created_at FROM users WHERE {column} = ?1"
    );
    let row = conn.prepare(&sql)?.query_row([value], user_row).optional()?;
    Ok(row)
}

fn conversation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        participant_lo: row.get(1)?,
        participant_hi: row.get(2)?,
        last_message_text: row.get(3)?,
        last_message_sender_id: row.get(4)?,
        last_message_seen: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn conversation_row_by_pair(
    conn: &Connection,
    lo: &str,
    hi: &str,
) -> Result<Option<ConversationRow>> {
    let row = conn
        .prepare(
            "SELECT id, participant_lo, participant_hi, last_message_text,
                    last_message_sender_id, last_message_seen, created_at
             FROM conversations WHERE participant_lo = ?1 AND participant_hi = ?2",
        )?
        .query_row([lo, hi], conversation_row)
        .optional()?;
    Ok(row)
}

fn message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        text: row.get(3)?,
        image_url: row.get(4)?,
        seen: row.get(5)?,
        created_at: row.get(6)?,
    })
}

// -- Row -> model conversion --

fn canonical_pair(a: Uuid, b: Uuid) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    raw.parse().with_context(|| format!("corrupt uuid '{raw}'"))
}

/// SQLite defaults write RFC 3339 with millisecond precision; older rows may
/// carry the bare "YYYY-MM-DD HH:MM:SS" form.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
        })
        .with_context(|| format!("corrupt timestamp '{raw}'"))
}

fn last_message_from_parts(
    text: Option<String>,
    sender_id: Option<String>,
    seen: bool,
) -> Result<Option<LastMessage>> {
    match (text, sender_id) {
        (Some(text), Some(sender_id)) => Ok(Some(LastMessage {
            text,
            sender_id: parse_uuid(&sender_id)?,
            seen,
        })),
        _ => Ok(None),
    }
}

fn conversation_from_row(row: ConversationRow) -> Result<Conversation> {
    Ok(Conversation {
        id: parse_uuid(&row.id)?,
        participants: [parse_uuid(&row.participant_lo)?, parse_uuid(&row.participant_hi)?],
        last_message: last_message_from_parts(
            row.last_message_text,
            row.last_message_sender_id,
            row.last_message_seen,
        )?,
        created_at: parse_timestamp(&row.created_at)?,
    })
}

fn message_from_row(row: MessageRow) -> Result<Message> {
    Ok(Message {
        id: parse_uuid(&row.id)?,
        conversation_id: parse_uuid(&row.conversation_id)?,
        sender_id: parse_uuid(&row.sender_id)?,
        text: row.text,
        image_url: row.image_url,
        seen: row.seen,
        created_at: parse_timestamp(&row.created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn seed_user(db: &Database, username: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.create_user(&id.to_string(), username, "argon2-hash").unwrap();
        id
    }

    #[test]
    fn upsert_yields_one_conversation_per_pair_in_either_order() {
        let db = test_db();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");

        let first = db.with_conn(|conn| upsert_conversation(conn, alice, bob)).unwrap();
        let second = db.with_conn(|conn| upsert_conversation(conn, bob, alice)).unwrap();
        assert_eq!(first.id, second.id);

        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM conversations", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);

        let found = db
            .with_conn(|conn| conversation_by_participants(conn, bob, alice))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, first.id);
        assert!(found.last_message.is_none());
    }

    #[test]
    fn append_updates_summary_and_preserves_order() {
        let db = test_db();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");

        let conversation = db.with_conn(|conn| upsert_conversation(conn, alice, bob)).unwrap();
        db.with_conn(|conn| insert_message(conn, conversation.id, alice, "one", None)).unwrap();
        db.with_conn(|conn| insert_message(conn, conversation.id, bob, "two", None)).unwrap();
        db.with_conn(|conn| {
            insert_message(conn, conversation.id, alice, "three", Some("https://cdn/x.png"))
        })
        .unwrap();

        let messages = db
            .with_conn(|conn| messages_for_conversation(conn, conversation.id))
            .unwrap();
        let texts: Vec<_> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["one", "two", "three"]);
        assert!(messages.iter().all(|m| !m.seen));
        assert_eq!(messages[2].image_url.as_deref(), Some("https://cdn/x.png"));

        let summary = db
            .with_conn(|conn| conversation_by_id(conn, conversation.id))
            .unwrap()
            .unwrap()
            .last_message
            .unwrap();
        assert_eq!(summary.text, "three");
        assert_eq!(summary.sender_id, alice);
        assert!(!summary.seen);
    }

    #[test]
    fn append_to_missing_conversation_fails() {
        let db = test_db();
        let alice = seed_user(&db, "alice");

        let result =
            db.with_conn(|conn| insert_message(conn, Uuid::new_v4(), alice, "hello", None));
        assert!(result.is_err());
    }

    #[test]
    fn mark_seen_is_idempotent_and_monotonic() {
        let db = test_db();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");

        let conversation = db.with_conn(|conn| upsert_conversation(conn, alice, bob)).unwrap();
        db.with_conn(|conn| insert_message(conn, conversation.id, alice, "one", None)).unwrap();
        db.with_conn(|conn| insert_message(conn, conversation.id, alice, "two", None)).unwrap();

        db.with_conn(|conn| mark_conversation_seen(conn, conversation.id)).unwrap();
        let first_pass = db
            .with_conn(|conn| messages_for_conversation(conn, conversation.id))
            .unwrap();
        assert!(first_pass.iter().all(|m| m.seen));

        // Second call matches zero rows and changes nothing.
        db.with_conn(|conn| mark_conversation_seen(conn, conversation.id)).unwrap();
        let second_pass = db
            .with_conn(|conn| messages_for_conversation(conn, conversation.id))
            .unwrap();
        assert_eq!(first_pass, second_pass);

        let summary = db
            .with_conn(|conn| conversation_by_id(conn, conversation.id))
            .unwrap()
            .unwrap()
            .last_message
            .unwrap();
        assert!(summary.seen);

        // A new message resets the summary but older messages stay seen.
        db.with_conn(|conn| insert_message(conn, conversation.id, bob, "three", None)).unwrap();
        let after_new = db
            .with_conn(|conn| messages_for_conversation(conn, conversation.id))
            .unwrap();
        assert!(after_new[0].seen && after_new[1].seen);
        assert!(!after_new[2].seen);
    }

    #[test]
    fn conversations_for_user_resolve_the_other_participant() {
        let db = test_db();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let carol = seed_user(&db, "carol");

        let with_bob = db.with_conn(|conn| upsert_conversation(conn, alice, bob)).unwrap();
        db.with_conn(|conn| insert_message(conn, with_bob.id, bob, "hi alice", None)).unwrap();
        db.with_conn(|conn| upsert_conversation(conn, carol, alice)).unwrap();

        let listed = db.with_conn(|conn| conversations_for_user(conn, alice)).unwrap();
        assert_eq!(listed.len(), 2);

        let names: Vec<_> = listed.iter().map(|c| c.participant.username.as_str()).collect();
        assert!(names.contains(&"bob") && names.contains(&"carol"));

        let bob_summary = listed
            .iter()
            .find(|c| c.participant.username == "bob")
            .unwrap();
        assert_eq!(bob_summary.participant.id, bob);
        let last = bob_summary.last_message.as_ref().unwrap();
        assert_eq!(last.text, "hi alice");
        assert_eq!(last.sender_id, bob);

        // Bob's own listing shows alice on the other side.
        let bobs = db.with_conn(|conn| conversations_for_user(conn, bob)).unwrap();
        assert_eq!(bobs.len(), 1);
        assert_eq!(bobs[0].participant.id, alice);
    }

    #[test]
    fn user_queries_round_trip() {
        let db = test_db();
        let alice = seed_user(&db, "alice");
        seed_user(&db, "bob");

        let row = db.get_user_by_username("alice").unwrap().unwrap();
        assert_eq!(row.id, alice.to_string());
        assert_eq!(row.password, "argon2-hash");

        assert!(db.get_user_by_id(&alice.to_string()).unwrap().is_some());
        assert!(db.get_user_by_username("nobody").unwrap().is_none());

        // Duplicate usernames are rejected by the unique constraint.
        let dup = db.create_user(&Uuid::new_v4().to_string(), "alice", "other-hash");
        assert!(dup.is_err());

        let others = db.list_users_except(&alice.to_string()).unwrap();
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].username, "bob");
    }
}
