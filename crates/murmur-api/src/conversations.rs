use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use murmur_db::{ConversationStore, MessageStore, UserStore};
use murmur_types::models::{Conversation, Message, PairKey};

use crate::blocking::run_store;
use crate::error::ApiError;
use crate::validate::sanitize_body;

/// Find-or-create attempts before giving up on a contended pair.
const RESOLVE_ATTEMPTS: usize = 3;

/// Orphans younger than this may still be mid-send.
const ORPHAN_GRACE: chrono::Duration = chrono::Duration::seconds(30);

const ORPHAN_BATCH: u32 = 100;

#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub conversation_id: Uuid,
    pub message: Message,
    /// True if this call appended the message; false for a replay of an
    /// already appended message id.
    pub appended: bool,
}

/// A stored message that is not yet part of its conversation.
#[derive(Debug, Clone)]
pub struct PendingSend {
    pub conversation_id: Uuid,
    pub message: Message,
}

/// Resolves the single conversation of a user pair and appends messages to it.
///
/// Message creation and append are two writes. Append is idempotent by
/// message id, and [`ConversationEngine::reconcile_orphans`] repairs messages
/// whose append never happened.
#[derive(Clone)]
pub struct ConversationEngine {
    users: Arc<dyn UserStore>,
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
    store_timeout: Duration,
}

impl ConversationEngine {
    pub fn new(
        users: Arc<dyn UserStore>,
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            users,
            conversations,
            messages,
            store_timeout,
        }
    }

    /// The conversation for the unordered pair `{a, b}`, created if missing.
    /// Concurrent calls for the same pair, in either order, return the same one.
    pub async fn resolve_conversation(&self, a: Uuid, b: Uuid) -> Result<Conversation, ApiError> {
        if a == b {
            return Err(ApiError::Validation("Cannot start a conversation with yourself".into()));
        }
        let key = PairKey::new(a, b);

        for attempt in 1..=RESOLVE_ATTEMPTS {
            if let Some(existing) = self.find_conversation(key).await? {
                return Ok(existing);
            }

            let conversation = Conversation {
                id: Uuid::new_v4(),
                participants: [key.low(), key.high()],
                created_at: Utc::now(),
            };
            let record = conversation.clone();
            match run_store(&self.conversations, self.store_timeout, move |s| {
                s.insert_conversation(&record)
            })
            .await
            {
                Ok(()) => {
                    debug!("Created conversation {} for {}", conversation.id, key);
                    return Ok(conversation);
                }
                Err(ApiError::Conflict(_)) => {
                    debug!("Conversation for {} created concurrently (attempt {})", key, attempt);
                }
                Err(e) => return Err(e),
            }
        }

        // Conflict means the row exists; one last read must see it.
        self.find_conversation(key).await?.ok_or_else(|| {
            ApiError::Internal(anyhow::anyhow!("conversation for {} conflicts but is not found", key))
        })
    }

    pub async fn find_conversation(&self, key: PairKey) -> Result<Option<Conversation>, ApiError> {
        run_store(&self.conversations, self.store_timeout, move |s| s.find_conversation(key)).await
    }

    /// Persist a message from `sender` to `receiver` and append it to their
    /// conversation. With `message_id` the call is idempotent: replaying it
    /// reuses the stored message instead of creating a second one.
    pub async fn send_message(
        &self,
        sender: Uuid,
        receiver: Uuid,
        body: &str,
        message_id: Option<Uuid>,
    ) -> Result<SendOutcome, ApiError> {
        let pending = self.prepare_message(sender, receiver, body, message_id).await?;
        self.commit(pending).await
    }

    /// First half of [`send_message`](Self::send_message): validate, resolve the
    /// conversation and store the message, without appending it yet.
    pub async fn prepare_message(
        &self,
        sender: Uuid,
        receiver: Uuid,
        body: &str,
        message_id: Option<Uuid>,
    ) -> Result<PendingSend, ApiError> {
        let body = sanitize_body(body)?;

        let exists = run_store(&self.users, self.store_timeout, move |s| s.user_by_id(receiver))
            .await?
            .is_some();
        if !exists {
            return Err(ApiError::UserNotFound);
        }

        let conversation = self.resolve_conversation(sender, receiver).await?;

        let now = Utc::now();
        let candidate = Message {
            id: message_id.unwrap_or_else(Uuid::new_v4),
            sender_id: sender,
            receiver_id: receiver,
            body,
            created_at: now,
            updated_at: now,
        };
        let message = self.persist_message(candidate).await?;

        Ok(PendingSend {
            conversation_id: conversation.id,
            message,
        })
    }

    /// Append a prepared message. The append fixes its position in the
    /// conversation.
    pub async fn commit(&self, pending: PendingSend) -> Result<SendOutcome, ApiError> {
        let appended = self.append(pending.conversation_id, pending.message.id).await?;
        Ok(SendOutcome {
            conversation_id: pending.conversation_id,
            message: pending.message,
            appended,
        })
    }

    /// Messages of a conversation in append order.
    pub async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, ApiError> {
        run_store(&self.conversations, self.store_timeout, move |s| {
            s.conversation_by_id(conversation_id)
        })
        .await?
        .ok_or(ApiError::ConversationNotFound)?;

        self.conversation_messages(conversation_id, limit).await
    }

    /// Messages between `user` and `peer`. Reading never creates a conversation.
    pub async fn messages_with(
        &self,
        user: Uuid,
        peer: Uuid,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, ApiError> {
        match self.find_conversation(PairKey::new(user, peer)).await? {
            Some(conversation) => self.conversation_messages(conversation.id, limit).await,
            None => Ok(Vec::new()),
        }
    }

    /// Append stored-but-unappended messages to their conversations.
    /// Returns how many were repaired.
    pub async fn reconcile_orphans(&self) -> Result<usize, ApiError> {
        let older_than = Utc::now() - ORPHAN_GRACE;
        let orphans = run_store(&self.messages, self.store_timeout, move |s| {
            s.orphaned_messages(older_than, ORPHAN_BATCH)
        })
        .await?;

        let mut repaired = 0;
        for message in orphans {
            let conversation = self
                .resolve_conversation(message.sender_id, message.receiver_id)
                .await?;
            if self.append(conversation.id, message.id).await? {
                repaired += 1;
            }
        }

        if repaired > 0 {
            info!("Reconciled {} orphaned messages", repaired);
        }
        Ok(repaired)
    }

    async fn persist_message(&self, message: Message) -> Result<Message, ApiError> {
        let record = message.clone();
        match run_store(&self.messages, self.store_timeout, move |s| s.insert_message(&record)).await
        {
            Ok(()) => Ok(message),
            Err(ApiError::Conflict(_)) => {
                // Replay of a client-chosen id: reuse what is stored if it is the same send.
                let id = message.id;
                let stored = run_store(&self.messages, self.store_timeout, move |s| {
                    s.message_by_id(id)
                })
                .await?
                .ok_or_else(|| ApiError::Conflict("Message id already used".into()))?;

                if stored.sender_id != message.sender_id || stored.receiver_id != message.receiver_id {
                    warn!("Message id {} reused by {} for a different pair", id, message.sender_id);
                    return Err(ApiError::Conflict("Message id already used".into()));
                }
                if stored.body != message.body {
                    warn!("Message id {} replayed by {} with a different body", id, message.sender_id);
                    return Err(ApiError::Conflict("Message id already used for a different message".into()));
                }
                debug!("Replayed send of message {}", id);
                Ok(stored)
            }
            Err(e) => Err(e),
        }
    }

    async fn conversation_messages(
        &self,
        conversation_id: Uuid,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, ApiError> {
        run_store(&self.conversations, self.store_timeout, move |s| {
            s.conversation_messages(conversation_id, limit)
        })
        .await
    }

    async fn append(&self, conversation_id: Uuid, message_id: Uuid) -> Result<bool, ApiError> {
        run_store(&self.conversations, self.store_timeout, move |s| {
            s.append_message(conversation_id, message_id)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use murmur_db::{Database, StoreResult};
    use murmur_types::models::User;

    fn engine_with(db: Arc<Database>) -> ConversationEngine {
        ConversationEngine::new(db.clone(), db.clone(), db, Duration::from_secs(5))
    }

    fn add_user(db: &Database, email: &str) -> Uuid {
        let user = User {
            id: Uuid::new_v4(),
            name: "Test User".into(),
            email: email.into(),
            password_hash: "hash".into(),
            email_verified: true,
            verification_token: None,
            refresh_token: None,
            is_login: false,
            created_at: Utc::now(),
        };
        db.insert_user(&user).unwrap();
        user.id
    }

    fn setup() -> (ConversationEngine, Arc<Database>, Uuid, Uuid) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let a = add_user(&db, "a@x.com");
        let b = add_user(&db, "b@y.com");
        (engine_with(db.clone()), db, a, b)
    }

    #[tokio::test]
    async fn resolution_is_order_independent() {
        let (engine, _db, a, b) = setup();
        let ab = engine.resolve_conversation(a, b).await.unwrap();
        let ba = engine.resolve_conversation(b, a).await.unwrap();
        assert_eq!(ab.id, ba.id);
        assert!(ab.pair_key().contains(a) && ab.pair_key().contains(b));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_resolution_yields_one_conversation() {
        let (engine, _db, a, b) = setup();

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let engine = engine.clone();
                let (x, y) = if i % 2 == 0 { (a, b) } else { (b, a) };
                tokio::spawn(async move { engine.resolve_conversation(x, y).await })
            })
            .collect();

        let mut ids = HashSet::new();
        for task in tasks {
            ids.insert(task.await.unwrap().unwrap().id);
        }
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn self_conversation_is_rejected() {
        let (engine, _db, a, _b) = setup();
        assert!(matches!(
            engine.resolve_conversation(a, a).await,
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn messages_list_in_send_order_from_either_side() {
        let (engine, _db, a, b) = setup();
        engine.send_message(a, b, "hello", None).await.unwrap();
        engine.send_message(b, a, "hi back", None).await.unwrap();
        engine.send_message(a, b, "<b>bold</b>", None).await.unwrap();

        let from_b: Vec<String> = engine
            .messages_with(b, a, None)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.body)
            .collect();
        assert_eq!(from_b, ["hello", "hi back", "&lt;b&gt;bold&lt;/b&gt;"]);

        let latest = engine.messages_with(a, b, Some(1)).await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].body, "&lt;b&gt;bold&lt;/b&gt;");
    }

    #[tokio::test]
    async fn replayed_send_does_not_duplicate() {
        let (engine, _db, a, b) = setup();
        let id = Uuid::new_v4();

        let first = engine.send_message(a, b, "once", Some(id)).await.unwrap();
        assert!(first.appended);
        let replay = engine.send_message(a, b, "once", Some(id)).await.unwrap();
        assert!(!replay.appended);
        assert_eq!(replay.message.id, id);

        assert_eq!(engine.messages_with(a, b, None).await.unwrap().len(), 1);

        // Same id from someone else is a conflict, not a replay
        assert!(matches!(
            engine.send_message(b, a, "hijack", Some(id)).await,
            Err(ApiError::Conflict(_))
        ));

        // Same id and pair but new text must not be reported as sent
        assert!(matches!(
            engine.send_message(a, b, "edited", Some(id)).await,
            Err(ApiError::Conflict(_))
        ));
        let listed = engine.messages_with(a, b, None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].body, "once");
    }

    #[tokio::test]
    async fn unknown_participants_are_not_found() {
        let (engine, _db, a, _b) = setup();
        let ghost = Uuid::new_v4();

        assert!(matches!(
            engine.resolve_conversation(a, ghost).await,
            Err(ApiError::UserNotFound)
        ));
        assert!(matches!(
            engine.send_message(ghost, a, "hi", None).await,
            Err(ApiError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn listing_an_unknown_conversation_is_not_found() {
        let (engine, _db, a, b) = setup();
        assert!(matches!(
            engine.list_messages(Uuid::new_v4(), None).await,
            Err(ApiError::ConversationNotFound)
        ));

        let sent = engine.send_message(a, b, "hi", None).await.unwrap();
        let listed = engine.list_messages(sent.conversation_id, None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, sent.message.id);
    }

    #[tokio::test]
    async fn unknown_receiver_and_empty_body_fail_before_writing() {
        let (engine, db, a, b) = setup();
        assert!(matches!(
            engine.send_message(a, Uuid::new_v4(), "hi", None).await,
            Err(ApiError::UserNotFound)
        ));
        assert!(matches!(
            engine.send_message(a, b, "   ", None).await,
            Err(ApiError::Validation(_))
        ));
        assert!(db.find_conversation(PairKey::new(a, b)).unwrap().is_none());
    }

    #[tokio::test]
    async fn listing_does_not_create_conversations() {
        let (engine, db, a, b) = setup();
        assert!(engine.messages_with(a, b, None).await.unwrap().is_empty());
        assert!(db.find_conversation(PairKey::new(a, b)).unwrap().is_none());
    }

    #[tokio::test]
    async fn orphaned_messages_are_reconciled() {
        let (engine, db, a, b) = setup();

        // Simulate a crash between persisting and appending.
        let at = Utc::now() - chrono::Duration::minutes(5);
        let orphan = Message {
            id: Uuid::new_v4(),
            sender_id: a,
            receiver_id: b,
            body: "lost".into(),
            created_at: at,
            updated_at: at,
        };
        db.insert_message(&orphan).unwrap();

        assert_eq!(engine.reconcile_orphans().await.unwrap(), 1);
        assert_eq!(engine.reconcile_orphans().await.unwrap(), 0);

        let listed = engine.messages_with(b, a, None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, orphan.id);
    }

    /// Conversation store whose lookups stall past the engine's timeout.
    struct StalledStore(Arc<Database>);

    impl ConversationStore for StalledStore {
        fn find_conversation(&self, key: PairKey) -> StoreResult<Option<Conversation>> {
            std::thread::sleep(Duration::from_millis(300));
            self.0.find_conversation(key)
        }

        fn insert_conversation(&self, conversation: &Conversation) -> StoreResult<()> {
            self.0.insert_conversation(conversation)
        }

        fn conversation_by_id(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
            self.0.conversation_by_id(id)
        }

        fn append_message(&self, conversation_id: Uuid, message_id: Uuid) -> StoreResult<bool> {
            self.0.append_message(conversation_id, message_id)
        }

        fn conversation_messages(
            &self,
            conversation_id: Uuid,
            limit: Option<u32>,
        ) -> StoreResult<Vec<Message>> {
            self.0.conversation_messages(conversation_id, limit)
        }
    }

    #[tokio::test]
    async fn slow_store_fails_with_retryable_error() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let a = add_user(&db, "a@x.com");
        let b = add_user(&db, "b@y.com");
        let engine = ConversationEngine::new(
            db.clone(),
            Arc::new(StalledStore(db.clone())),
            db.clone(),
            Duration::from_millis(50),
        );

        let err = engine.send_message(a, b, "hi", None).await.unwrap_err();
        assert!(err.is_retryable());
        // Nothing was persisted for the sender to mistake as sent
        assert!(db.orphaned_messages(Utc::now() + chrono::Duration::seconds(1), 10).unwrap().is_empty());
    }
}
