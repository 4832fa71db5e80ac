use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{debug, error};
use uuid::Uuid;

use murmur_gateway::{Delivery, DeliveryCoordinator};
use murmur_types::api::{Envelope, SendMessageRequest};

use crate::conversations::{ConversationEngine, SendOutcome};
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::state::AppState;

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub limit: Option<u32>,
}

impl MessageQuery {
    fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

/// Persist, append, then push to the receiver if they are online.
///
/// Append and push happen under the receiver's delivery lane, so concurrent
/// sends reach the receiver in the order they were stored.
pub async fn send_and_deliver(
    engine: &ConversationEngine,
    delivery: &DeliveryCoordinator,
    sender_id: Uuid,
    receiver_id: Uuid,
    body: &str,
    message_id: Option<Uuid>,
) -> Result<SendOutcome, ApiError> {
    let pending = engine
        .prepare_message(sender_id, receiver_id, body, message_id)
        .await?;

    let _lane = delivery.lane(receiver_id).await;
    let outcome = engine.commit(pending).await?;

    // A replayed send was already delivered (or missed) the first time.
    if outcome.appended {
        match delivery.deliver(&outcome.message).await {
            Delivery::Pushed => debug!("Message {} pushed to {}", outcome.message.id, receiver_id),
            Delivery::Offline => {
                debug!("Receiver {} offline, message {} stored", receiver_id, outcome.message.id)
            }
        }
    }
    Ok(outcome)
}

/// The pipeline runs on its own task: if the client goes away mid-request the
/// write still finishes and only the response is lost.
pub async fn send_message(
    State(state): State<AppState>,
    Path(peer_id): Path<Uuid>,
    Extension(AuthUser(sender_id)): Extension<AuthUser>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pipeline = tokio::spawn(async move {
        send_and_deliver(
            &state.conversations,
            &state.delivery,
            sender_id,
            peer_id,
            &req.message,
            req.id,
        )
        .await
    });

    let outcome = pipeline.await.map_err(|e| {
        error!("send pipeline task failed: {}", e);
        ApiError::Internal(anyhow::anyhow!("send pipeline failed: {}", e))
    })??;

    let status = if outcome.appended {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(Envelope::success("Message sent", outcome.message))))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(peer_id): Path<Uuid>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if peer_id == user_id {
        return Err(ApiError::Validation("Cannot list a conversation with yourself".into()));
    }
    let messages = state
        .conversations
        .messages_with(user_id, peer_id, Some(query.limit()))
        .await?;
    Ok(Json(Envelope::success("Messages retrieved", messages)))
}
