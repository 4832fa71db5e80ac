use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                  TEXT PRIMARY KEY,
                name                TEXT NOT NULL,
                email               TEXT NOT NULL UNIQUE,
                password            TEXT NOT NULL,
                email_verified      INTEGER NOT NULL DEFAULT 0,
                verification_token  TEXT UNIQUE,
                refresh_token       TEXT,
                is_login            INTEGER NOT NULL DEFAULT 0,
                created_at          TEXT NOT NULL
            );

            -- participant_low < participant_high, one row per unordered pair
            CREATE TABLE conversations (
                id                  TEXT PRIMARY KEY,
                participant_low     TEXT NOT NULL REFERENCES users(id),
                participant_high    TEXT NOT NULL REFERENCES users(id),
                created_at          TEXT NOT NULL,
                UNIQUE(participant_low, participant_high),
                CHECK(participant_low < participant_high)
            );

            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                sender_id       TEXT NOT NULL REFERENCES users(id),
                receiver_id     TEXT NOT NULL REFERENCES users(id),
                body            TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX idx_messages_created
                ON messages(created_at);

            -- Append sequence; seq order is chronological order
            CREATE TABLE conversation_messages (
                seq                 INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id     TEXT NOT NULL REFERENCES conversations(id),
                message_id          TEXT NOT NULL UNIQUE REFERENCES messages(id)
            );

            CREATE INDEX idx_conversation_messages_conversation
                ON conversation_messages(conversation_id, seq);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
