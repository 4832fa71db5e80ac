//! Database row types. These map directly to SQLite rows and are converted
//! into the murmur-types models at the store boundary.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use uuid::Uuid;

use murmur_types::models::{Conversation, Message, User};

use crate::store::StoreError;

pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub email_verified: bool,
    pub verification_token: Option<String>,
    pub refresh_token: Option<String>,
    pub is_login: bool,
    pub created_at: String,
}

pub struct ConversationRow {
    pub id: String,
    pub participant_low: String,
    pub participant_high: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub body: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Fixed-width UTC timestamp, so text order equals time order.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_id(raw: &str, what: &str) -> Result<Uuid, StoreError> {
    raw.parse()
        .map_err(|e| StoreError::Corrupt(format!("{} '{}': {}", what, raw, e)))
}

fn parse_time(raw: &str, what: &str) -> Result<DateTime<Utc>, StoreError> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // datetime('now') defaults have no timezone; they are UTC.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .map_err(|e| StoreError::Corrupt(format!("{} '{}': {}", what, raw, e)))
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: parse_id(&row.id, "user id")?,
            created_at: parse_time(&row.created_at, "user created_at")?,
            name: row.name,
            email: row.email,
            password_hash: row.password,
            email_verified: row.email_verified,
            verification_token: row.verification_token,
            refresh_token: row.refresh_token,
            is_login: row.is_login,
        })
    }
}

impl TryFrom<ConversationRow> for Conversation {
    type Error = StoreError;

    fn try_from(row: ConversationRow) -> Result<Self, Self::Error> {
        Ok(Conversation {
            id: parse_id(&row.id, "conversation id")?,
            participants: [
                parse_id(&row.participant_low, "participant")?,
                parse_id(&row.participant_high, "participant")?,
            ],
            created_at: parse_time(&row.created_at, "conversation created_at")?,
        })
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            id: parse_id(&row.id, "message id")?,
            sender_id: parse_id(&row.sender_id, "sender_id")?,
            receiver_id: parse_id(&row.receiver_id, "receiver_id")?,
            created_at: parse_time(&row.created_at, "message created_at")?,
            updated_at: parse_time(&row.updated_at, "message updated_at")?,
            body: row.body,
        })
    }
}
