use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use murmur_api::conversations::ConversationEngine;

/// Background task that appends messages a crashed or timed-out send left
/// outside their conversation.
pub async fn run_reconcile_loop(
    engine: ConversationEngine,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        if let Err(e) = engine.reconcile_orphans().await {
            warn!("Reconcile error: {}", e);
        }
    }

    info!("Reconcile loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use murmur_db::{ConversationStore, Database, MessageStore, UserStore};
    use murmur_types::models::{Message, PairKey, User};
    use uuid::Uuid;

    fn user(email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Loop User".into(),
            email: email.into(),
            password_hash: "hash".into(),
            email_verified: true,
            verification_token: None,
            refresh_token: None,
            is_login: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn loop_repairs_orphans_and_stops_on_cancel() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let (a, b) = (user("a@x.com"), user("b@y.com"));
        db.insert_user(&a).unwrap();
        db.insert_user(&b).unwrap();

        let at = Utc::now() - chrono::Duration::minutes(10);
        db.insert_message(&Message {
            id: Uuid::new_v4(),
            sender_id: a.id,
            receiver_id: b.id,
            body: "stranded".into(),
            created_at: at,
            updated_at: at,
        })
        .unwrap();

        let engine = ConversationEngine::new(db.clone(), db.clone(), db.clone(), Duration::from_secs(5));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_reconcile_loop(engine, Duration::from_millis(20), cancel.clone()));

        let key = PairKey::new(a.id, b.id);
        let mut listed = Vec::new();
        for _ in 0..100 {
            if let Some(conversation) = db.find_conversation(key).unwrap() {
                listed = db.conversation_messages(conversation.id, None).unwrap();
                if !listed.is_empty() {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].body, "stranded");

        cancel.cancel();
        task.await.unwrap();
    }
}
