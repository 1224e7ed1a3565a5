//! Messages from the agent to open pages.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Notification pushed to every open page.
///
/// Serialized as `{"type": "NEW_VERSION_AVAILABLE", "timestamp": <ms>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateNotification {
    /// Content actually changed, or a new agent build took control.
    NewVersionAvailable { timestamp: i64 },
    /// A response was served from the offline snapshot.
    OfflineMode { timestamp: i64 },
}

impl UpdateNotification {
    pub fn new_version() -> Self {
        Self::NewVersionAvailable {
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn offline() -> Self {
        Self::OfflineMode {
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Self::NewVersionAvailable { timestamp } | Self::OfflineMode { timestamp } => *timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

struct Slot {
    sender: mpsc::UnboundedSender<UpdateNotification>,
    controller: Option<String>,
}

/// Open pages of the app, shared by every agent build on the device.
#[derive(Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<ClientId, Slot>>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly opened page. It starts uncontrolled.
    pub fn connect(&self) -> ClientConnection {
        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::unbounded_channel();
        self.clients.lock().insert(
            id,
            Slot {
                sender,
                controller: None,
            },
        );
        tracing::debug!(client = %id, "Client connected");
        ClientConnection { id, receiver }
    }

    pub fn disconnect(&self, id: ClientId) {
        if self.clients.lock().remove(&id).is_some() {
            tracing::debug!(client = %id, "Client disconnected");
        }
    }

    /// Send to every open page. Returns how many received it.
    pub fn broadcast(&self, notification: UpdateNotification) -> usize {
        let mut clients = self.clients.lock();
        clients.retain(|_, slot| !slot.sender.is_closed());

        let delivered = clients
            .values()
            .filter(|slot| slot.sender.send(notification).is_ok())
            .count();
        tracing::debug!(?notification, delivered, "Notification broadcast");
        delivered
    }

    /// Make `build` the controller of every open page.
    pub fn claim(&self, build: &str) -> usize {
        let mut clients = self.clients.lock();
        for slot in clients.values_mut() {
            slot.controller = Some(build.to_string());
        }
        clients.len()
    }

    pub fn controller_of(&self, id: ClientId) -> Option<String> {
        self.clients
            .lock()
            .get(&id)
            .and_then(|slot| slot.controller.clone())
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A page's end of the notification channel.
pub struct ClientConnection {
    id: ClientId,
    receiver: mpsc::UnboundedReceiver<UpdateNotification>,
}

impl ClientConnection {
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<UpdateNotification> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<UpdateNotification> {
        self.receiver.try_recv().ok()
    }

    /// Everything received so far.
    pub fn drain(&mut self) -> Vec<UpdateNotification> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_value(UpdateNotification::NewVersionAvailable { timestamp: 42 }).unwrap();
        assert_eq!(json["type"], "NEW_VERSION_AVAILABLE");
        assert_eq!(json["timestamp"], 42);

        let parsed: UpdateNotification =
            serde_json::from_str(r#"{"type":"OFFLINE_MODE","timestamp":7}"#).unwrap();
        assert_eq!(parsed, UpdateNotification::OfflineMode { timestamp: 7 });
    }

    #[test]
    fn test_broadcast_reaches_every_client() {
        let registry = ClientRegistry::new();
        let mut a = registry.connect();
        let mut b = registry.connect();

        assert_eq!(registry.broadcast(UpdateNotification::offline()), 2);
        assert_eq!(a.drain().len(), 1);
        assert_eq!(b.drain().len(), 1);
    }

    #[test]
    fn test_closed_clients_are_pruned() {
        let registry = ClientRegistry::new();
        let a = registry.connect();
        let _b = registry.connect();
        drop(a);

        assert_eq!(registry.broadcast(UpdateNotification::new_version()), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_claim_sets_controller() {
        let registry = ClientRegistry::new();
        let a = registry.connect();
        assert_eq!(registry.controller_of(a.id()), None);

        assert_eq!(registry.claim("v4"), 1);
        assert_eq!(registry.controller_of(a.id()).as_deref(), Some("v4"));

        registry.disconnect(a.id());
        assert!(registry.is_empty());
    }
}
