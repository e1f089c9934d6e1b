//! In-process transport: unbounded channels fanned out per room

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::{RoomTransport, SubscriberId};
use crate::room::events::RoomEvent;

/// Channel-backed [`RoomTransport`] for a single-process deployment
#[derive(Debug, Default)]
pub struct LocalTransport {
    connections: DashMap<SubscriberId, mpsc::UnboundedSender<RoomEvent>>,
    rooms: DashMap<String, Vec<SubscriberId>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoomTransport for LocalTransport {
    fn register(&self) -> (SubscriberId, mpsc::UnboundedReceiver<RoomEvent>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(id, tx);
        debug!(subscriber = %id, "transport connection registered");
        (id, rx)
    }

    fn subscribe(&self, room: &str, subscriber: SubscriberId) {
        let mut members = self.rooms.entry(room.to_string()).or_default();
        if !members.contains(&subscriber) {
            members.push(subscriber);
        }
    }

    fn publish(&self, room: &str, event: RoomEvent) {
        let Some(members) = self.rooms.get(room) else {
            return;
        };
        for subscriber in members.iter() {
            if let Some(tx) = self.connections.get(subscriber) {
                // A closed receiver is cleaned up on disconnect
                let _ = tx.send(event.clone());
            }
        }
    }

    fn send_to(&self, subscriber: SubscriberId, event: RoomEvent) {
        if let Some(tx) = self.connections.get(&subscriber) {
            let _ = tx.send(event);
        }
    }

    fn disconnect(&self, subscriber: SubscriberId) {
        self.connections.remove(&subscriber);
        for mut members in self.rooms.iter_mut() {
            members.retain(|id| *id != subscriber);
        }
        // Empty recipient sets are dropped so room names do not accumulate
        self.rooms.retain(|_, members| !members.is_empty());
        debug!(subscriber = %subscriber, "transport connection dropped");
    }

    fn subscriber_count(&self, room: &str) -> usize {
        self.rooms.get(room).map(|m| m.len()).unwrap_or(0)
    }
}
