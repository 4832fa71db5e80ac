use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

use murmur_types::events::GatewayEvent;
use murmur_types::models::Message;

use crate::presence::PresenceDirectory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued on the recipient's live connection
    Pushed,
    /// Recipient not connected; the message stays in the store
    Offline,
}

/// Best-effort push of new messages to connected recipients.
///
/// Each call pushes at most once and never retries. Events for one recipient
/// go through that connection's single FIFO queue, so they leave in the order
/// `deliver` was called. Callers that persist and then deliver hold the
/// recipient's [`lane`](Self::lane) across both steps so that order matches
/// the stored order.
#[derive(Clone)]
pub struct DeliveryCoordinator {
    presence: PresenceDirectory,
    // One lane per recipient ever written to, bounded by the user count.
    lanes: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl DeliveryCoordinator {
    pub fn new(presence: PresenceDirectory) -> Self {
        Self {
            presence,
            lanes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Exclusive access to `receiver_id`'s delivery order until the guard drops.
    pub async fn lane(&self, receiver_id: Uuid) -> OwnedMutexGuard<()> {
        let lane = {
            let mut lanes = self.lanes.lock().await;
            lanes.entry(receiver_id).or_default().clone()
        };
        lane.lock_owned().await
    }

    pub async fn deliver(&self, message: &Message) -> Delivery {
        let event = GatewayEvent::NewMessage {
            message: message.clone(),
        };

        if self.presence.send_to_user(message.receiver_id, event).await {
            debug!("message {} pushed to {}", message.id, message.receiver_id);
            Delivery::Pushed
        } else {
            debug!("{} offline, message {} left in store", message.receiver_id, message.id);
            Delivery::Offline
        }
    }
}
