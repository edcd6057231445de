use banter_proto::protocol::ServerEvent;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;

/// One live WebSocket connection for a user.
pub struct ConnectionHandle {
    /// Distinguishes this connection from a later one by the same user.
    pub conn_id: String,
    /// Write half of the connection; dropping it tears the socket down.
    pub sender: UnboundedSender<ServerEvent>,
    /// Channels this connection receives broadcasts on: the user's own id
    /// plus one per group.
    pub channels: HashSet<String>,
}

/// User identity to at-most-one live connection. A second login replaces
/// the first. The registry is the source of truth for online/offline and
/// carries no validation logic of its own.
#[derive(Default)]
pub struct PresenceRegistry {
    connections: Mutex<HashMap<String, ConnectionHandle>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, returning the entry it replaced so the caller
    /// can drop the stale sender.
    pub async fn register(
        &self,
        user_id: &str,
        handle: ConnectionHandle,
    ) -> Option<ConnectionHandle> {
        self.connections
            .lock()
            .await
            .insert(user_id.to_string(), handle)
    }

    /// Remove the user's entry, but only while it still belongs to the given
    /// connection. Returns whether an entry was removed.
    pub async fn unregister(&self, user_id: &str, conn_id: &str) -> bool {
        let mut connections = self.connections.lock().await;
        match connections.get(user_id) {
            Some(handle) if handle.conn_id == conn_id => {
                connections.remove(user_id);
                true
            }
            _ => false,
        }
    }

    /// Subscribe the user's live connection to a channel. No-op when offline.
    pub async fn join(&self, user_id: &str, channel: &str) {
        if let Some(handle) = self.connections.lock().await.get_mut(user_id) {
            handle.channels.insert(channel.to_string());
        }
    }

    pub async fn is_online(&self, user_id: &str) -> bool {
        self.connections.lock().await.contains_key(user_id)
    }

    /// Snapshot of every currently connected user id.
    pub async fn online_users(&self) -> HashSet<String> {
        self.connections.lock().await.keys().cloned().collect()
    }

    /// Deliver one event to the user's live connection. No-op when offline.
    pub async fn send_to_user(&self, user_id: &str, event: ServerEvent) {
        if let Some(handle) = self.connections.lock().await.get(user_id) {
            let _ = handle.sender.send(event);
        }
    }

    /// Deliver one event to every connection subscribed to the channel.
    pub async fn broadcast(&self, channel: &str, event: &ServerEvent) {
        for handle in self.connections.lock().await.values() {
            if handle.channels.contains(channel) {
                let _ = handle.sender.send(event.clone());
            }
        }
    }
}
