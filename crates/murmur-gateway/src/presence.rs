use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::debug;
use uuid::Uuid;

use murmur_types::events::GatewayEvent;

/// Identifies one live connection of one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionHandle {
    pub user_id: Uuid,
    pub conn_id: Uuid,
}

/// Tracks which user is reachable on which live connection.
///
/// At most one entry per user: a new connection replaces the previous one,
/// and dropping the old sender ends that connection's delivery path.
#[derive(Clone)]
pub struct PresenceDirectory {
    inner: Arc<PresenceInner>,
}

struct PresenceInner {
    /// Events every connected client receives (online-user updates)
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Per-user targeted queues: user_id -> (conn_id, sender)
    connections: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl Default for PresenceDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceDirectory {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(PresenceInner {
                broadcast_tx,
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to events sent to every connection.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Register `user_id` as reachable on a new connection and broadcast the
    /// updated online set. Any previous connection of the same user loses its
    /// queue.
    pub async fn connect(
        &self,
        user_id: Uuid,
    ) -> (ConnectionHandle, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut connections = self.inner.connections.write().await;
        if connections.insert(user_id, (conn_id, tx)).is_some() {
            debug!("{} reconnected, previous connection superseded", user_id);
        }
        // Broadcast under the lock so updates go out in mutation order.
        self.broadcast_online(&connections);

        (ConnectionHandle { user_id, conn_id }, rx)
    }

    /// Remove the entry owned by `handle`. A handle that was already
    /// superseded is a no-op. Returns whether an entry was removed.
    pub async fn disconnect(&self, handle: &ConnectionHandle) -> bool {
        let mut connections = self.inner.connections.write().await;

        let owns_entry = connections
            .get(&handle.user_id)
            .is_some_and(|(conn_id, _)| *conn_id == handle.conn_id);
        if !owns_entry {
            return false;
        }

        connections.remove(&handle.user_id);
        self.broadcast_online(&connections);
        true
    }

    /// Push a targeted event to the user's current connection.
    /// Returns false if the user is not connected.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) -> bool {
        let connections = self.inner.connections.read().await;
        match connections.get(&user_id) {
            Some((_, tx)) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.connections.read().await.contains_key(&user_id)
    }

    /// Currently connected users, sorted.
    pub async fn online_user_ids(&self) -> Vec<Uuid> {
        sorted_ids(&*self.inner.connections.read().await)
    }

    fn broadcast_online(
        &self,
        connections: &HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>,
    ) {
        // No receivers is fine: nobody else is connected.
        let _ = self.inner.broadcast_tx.send(GatewayEvent::OnlineUsers {
            user_ids: sorted_ids(connections),
        });
    }
}

fn sorted_ids<V>(connections: &HashMap<Uuid, V>) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = connections.keys().copied().collect();
    ids.sort();
    ids
}
