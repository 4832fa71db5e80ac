use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use murmur_types::models::{Conversation, Message, PairKey, User};

use crate::Database;
use crate::models::{ConversationRow, MessageRow, UserRow, timestamp};
use crate::store::{ConversationStore, MessageStore, StoreResult, UserStore};

const USER_COLUMNS: &str = "id, name, email, password, email_verified, verification_token, \
                            refresh_token, is_login, created_at";

const MESSAGE_COLUMNS: &str = "m.id, m.sender_id, m.receiver_id, m.body, m.created_at, m.updated_at";

// -- Users --

impl UserStore for Database {
    fn insert_user(&self, user: &User) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, email, password, email_verified, verification_token,
                                    refresh_token, is_login, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    user.id.to_string(),
                    user.name,
                    user.email,
                    user.password_hash,
                    user.email_verified,
                    user.verification_token,
                    user.refresh_token,
                    user.is_login,
                    timestamp(user.created_at),
                ],
            )?;
            Ok(())
        })
    }

    fn user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        self.with_conn(|conn| query_user(conn, "id", &id.to_string()))
    }

    fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    fn consume_verification_token(&self, id: Uuid, token: &str) -> StoreResult<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET email_verified = 1, verification_token = NULL
                 WHERE id = ?1 AND verification_token = ?2",
                params![id.to_string(), token],
            )?;
            Ok(changed == 1)
        })
    }

    fn swap_refresh_token(&self, id: Uuid, expected: &str, new: &str) -> StoreResult<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET refresh_token = ?3
                 WHERE id = ?1 AND refresh_token = ?2",
                params![id.to_string(), expected, new],
            )?;
            Ok(changed == 1)
        })
    }

    fn set_session(
        &self,
        id: Uuid,
        refresh_token: Option<&str>,
        is_login: bool,
    ) -> StoreResult<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET refresh_token = ?2, is_login = ?3 WHERE id = ?1",
                params![id.to_string(), refresh_token, is_login],
            )?;
            Ok(changed == 1)
        })
    }
}

// -- Conversations --

impl ConversationStore for Database {
    fn find_conversation(&self, key: PairKey) -> StoreResult<Option<Conversation>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, participant_low, participant_high, created_at FROM conversations
                     WHERE participant_low = ?1 AND participant_high = ?2",
                    params![key.low().to_string(), key.high().to_string()],
                    conversation_row,
                )
                .optional()?;
            row.map(Conversation::try_from).transpose()
        })
    }

    fn insert_conversation(&self, conversation: &Conversation) -> StoreResult<()> {
        let key = conversation.pair_key();
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO conversations (id, participant_low, participant_high, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    conversation.id.to_string(),
                    key.low().to_string(),
                    key.high().to_string(),
                    timestamp(conversation.created_at),
                ],
            )?;
            Ok(())
        })
    }

    fn conversation_by_id(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, participant_low, participant_high, created_at FROM conversations
                     WHERE id = ?1",
                    [id.to_string()],
                    conversation_row,
                )
                .optional()?;
            row.map(Conversation::try_from).transpose()
        })
    }

    fn append_message(&self, conversation_id: Uuid, message_id: Uuid) -> StoreResult<bool> {
        self.with_conn_mut(|conn| {
            // message_id is UNIQUE, so a repeated append is ignored
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO conversation_messages (conversation_id, message_id)
                 VALUES (?1, ?2)",
                params![conversation_id.to_string(), message_id.to_string()],
            )?;
            Ok(inserted == 1)
        })
    }

    fn conversation_messages(
        &self,
        conversation_id: Uuid,
        limit: Option<u32>,
    ) -> StoreResult<Vec<Message>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS}
                 FROM conversation_messages cm
                 JOIN messages m ON m.id = cm.message_id
                 WHERE cm.conversation_id = ?1
                 ORDER BY cm.seq DESC
                 LIMIT ?2"
            );
            // SQLite treats a negative LIMIT as unbounded
            let limit = limit.map(i64::from).unwrap_or(-1);

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![conversation_id.to_string(), limit], message_row)?
                .collect::<Result<Vec<_>, _>>()?;

            let mut messages = rows
                .into_iter()
                .map(Message::try_from)
                .collect::<StoreResult<Vec<_>>>()?;
            messages.reverse();
            Ok(messages)
        })
    }
}

// -- Messages --

impl MessageStore for Database {
    fn insert_message(&self, message: &Message) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, body, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.id.to_string(),
                    message.sender_id.to_string(),
                    message.receiver_id.to_string(),
                    message.body,
                    timestamp(message.created_at),
                    timestamp(message.updated_at),
                ],
            )?;
            Ok(())
        })
    }

    fn message_by_id(&self, id: Uuid) -> StoreResult<Option<Message>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.id = ?1");
            let row = conn
                .query_row(&sql, [id.to_string()], message_row)
                .optional()?;
            row.map(Message::try_from).transpose()
        })
    }

    fn orphaned_messages(
        &self,
        older_than: DateTime<Utc>,
        limit: u32,
    ) -> StoreResult<Vec<Message>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS}
                 FROM messages m
                 LEFT JOIN conversation_messages cm ON cm.message_id = m.id
                 WHERE cm.message_id IS NULL AND m.created_at < ?1
                 ORDER BY m.created_at
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![timestamp(older_than), limit], message_row)?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter().map(Message::try_from).collect()
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> StoreResult<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let row = conn
        .query_row(&sql, [value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                password: row.get(3)?,
                email_verified: row.get(4)?,
                verification_token: row.get(5)?,
                refresh_token: row.get(6)?,
                is_login: row.get(7)?,
                created_at: row.get(8)?,
            })
        })
        .optional()?;

    row.map(User::try_from).transpose()
}

fn conversation_row(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        participant_low: row.get(1)?,
        participant_high: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        body: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}
