use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Events sent over the websocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful identification
    Ready { user_id: Uuid },

    /// Full set of currently reachable users, sent on every connect/disconnect
    OnlineUsers { user_ids: Vec<Uuid> },

    /// A message addressed to this connection's user was stored
    NewMessage { message: Message },
}

/// Commands sent FROM client TO server over the websocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the websocket connection with an access token
    Identify { token: String },
}
