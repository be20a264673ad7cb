use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            avatar_url  TEXT,
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
        );

        -- One row per unordered participant pair: the pair is stored
        -- canonicalized (participant_lo < participant_hi) and the UNIQUE
        -- constraint makes find-or-create an atomic upsert.
        CREATE TABLE IF NOT EXISTS conversations (
            id                      TEXT PRIMARY KEY,
            participant_lo          TEXT NOT NULL REFERENCES users(id),
            participant_hi          TEXT NOT NULL REFERENCES users(id),
            last_message_text       TEXT,
            last_message_sender_id  TEXT REFERENCES users(id),
            last_message_seen       INTEGER NOT NULL DEFAULT 0,
            created_at              TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            UNIQUE(participant_lo, participant_hi)
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_lo
            ON conversations(participant_lo);
        CREATE INDEX IF NOT EXISTS idx_conversations_hi
            ON conversations(participant_hi);

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            sender_id       TEXT NOT NULL REFERENCES users(id),
            text            TEXT NOT NULL DEFAULT '',
            image_url       TEXT,
            seen            INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
