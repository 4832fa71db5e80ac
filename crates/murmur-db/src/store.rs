//! Capability traits for the durable store.
//!
//! Services depend on these traits only; [`crate::Database`] is the SQLite
//! backend. Every method is blocking, so async callers run them on the
//! blocking pool.

use chrono::{DateTime, Utc};
use rusqlite::ffi;
use uuid::Uuid;

use murmur_types::models::{Conversation, Message, PairKey, User};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("unique constraint violated: {0}")]
    Conflict(String),

    /// A foreign key points at a row that does not exist.
    #[error("missing referenced row: {0}")]
    MissingReference(String),

    /// The backend could not take the write right now; retrying may succeed.
    #[error("store busy: {0}")]
    Busy(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        let extended = match &err {
            rusqlite::Error::SqliteFailure(e, _) => Some(e.extended_code),
            _ => None,
        };
        match extended {
            Some(ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY) => {
                return Self::Conflict(err.to_string());
            }
            Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => return Self::MissingReference(err.to_string()),
            _ => {}
        }
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked) => {
                Self::Busy(err.to_string())
            }
            _ => Self::Backend(err.into()),
        }
    }
}

pub trait UserStore: Send + Sync {
    /// Fails with [`StoreError::Conflict`] on a duplicate email or verification token.
    fn insert_user(&self, user: &User) -> StoreResult<()>;

    fn user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    fn user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Marks the email verified and clears the pending token, but only while
    /// `token` is still the pending token of `id`. Returns whether it did.
    fn consume_verification_token(&self, id: Uuid, token: &str) -> StoreResult<bool>;

    /// Compare-and-set on the stored refresh token. Returns false when the
    /// stored value is no longer `expected`.
    fn swap_refresh_token(&self, id: Uuid, expected: &str, new: &str) -> StoreResult<bool>;

    /// Unconditionally sets the refresh token and login marker (login/logout).
    /// Returns false when the user does not exist.
    fn set_session(&self, id: Uuid, refresh_token: Option<&str>, is_login: bool)
    -> StoreResult<bool>;
}

pub trait ConversationStore: Send + Sync {
    fn find_conversation(&self, key: PairKey) -> StoreResult<Option<Conversation>>;

    /// Fails with [`StoreError::Conflict`] when a conversation for the same
    /// pair already exists.
    fn insert_conversation(&self, conversation: &Conversation) -> StoreResult<()>;

    fn conversation_by_id(&self, id: Uuid) -> StoreResult<Option<Conversation>>;

    /// Appends `message_id` to the conversation's sequence. Idempotent:
    /// returns false if the message was already appended.
    fn append_message(&self, conversation_id: Uuid, message_id: Uuid) -> StoreResult<bool>;

    /// Messages in append order. With `limit`, only the newest `limit`
    /// messages are returned, still oldest first.
    fn conversation_messages(
        &self,
        conversation_id: Uuid,
        limit: Option<u32>,
    ) -> StoreResult<Vec<Message>>;
}

pub trait MessageStore: Send + Sync {
    /// Fails with [`StoreError::Conflict`] if the id is taken.
    fn insert_message(&self, message: &Message) -> StoreResult<()>;

    fn message_by_id(&self, id: Uuid) -> StoreResult<Option<Message>>;

    /// Stored messages not yet appended to any conversation, created before
    /// `older_than`, oldest first.
    fn orphaned_messages(&self, older_than: DateTime<Utc>, limit: u32)
    -> StoreResult<Vec<Message>>;
}
