//! Broadcast coordinator
//!
//! Applies room commands against the store and fans the results out through
//! the transport. Every mutation refreshes the room's projection cache; the
//! cache is the diff baseline for generated change-log chat lines. A failed
//! command is reported only to the subscriber that issued it and leaves the
//! cache and the other subscribers untouched.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use super::events::{RoomEvent, UpdatePayload};
use super::registry::{Room, RoomRegistry};
use crate::projection::{Projection, ProjectionService};
use crate::store::{Id, Store};
use crate::transport::{RoomTransport, SubscriberId};
use crate::types::AppError;

/// Sender name on generated change-log chat lines
pub const LOG_SENDER: &str = "log";

/// Room command processor shared by every connection
#[derive(Debug)]
pub struct BroadcastCoordinator<S, T> {
    projection: ProjectionService<S>,
    registry: Arc<RoomRegistry>,
    transport: Arc<T>,
}

impl<S, T> Clone for BroadcastCoordinator<S, T> {
    fn clone(&self) -> Self {
        Self {
            projection: self.projection.clone(),
            registry: Arc::clone(&self.registry),
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<S: Store, T: RoomTransport> BroadcastCoordinator<S, T> {
    pub fn new(
        projection: ProjectionService<S>,
        registry: Arc<RoomRegistry>,
        transport: Arc<T>,
    ) -> Self {
        Self { projection, registry, transport }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Subscribe a connection to a room and send it the current snapshot.
    /// The room is created on first join.
    pub async fn join_room(&self, subscriber: SubscriberId, room_id: &str) {
        self.transport.subscribe(room_id, subscriber);
        let room = self.registry.get_or_create(room_id);
        let mut room = room.lock().await;
        room.touch();

        let entities = self.refresh_cache(&mut room).await;
        self.transport.send_to(
            subscriber,
            RoomEvent::RoomData {
                entity_ids: room.member_entity_ids.clone(),
                entities,
            },
        );
        debug!(room = room_id, subscriber = %subscriber, "subscriber joined room");
    }

    /// Add an entity to a room's member list and broadcast the new snapshot.
    /// Adding an entity that is already a member changes nothing except the
    /// re-broadcast.
    pub async fn add_member(&self, subscriber: SubscriberId, room_id: &str, entity_id: Id) {
        if let Err(e) = self.projection.get_summary(entity_id).await {
            self.report(subscriber, e);
            return;
        }

        let room = self.registry.get_or_create(room_id);
        let mut room = room.lock().await;
        room.touch();
        if !room.member_entity_ids.contains(&entity_id) {
            room.member_entity_ids.push(entity_id);
        }

        self.broadcast_snapshot(room_id, &mut room).await;
    }

    /// Remove an entity from a room and broadcast the new snapshot
    pub async fn remove_member(&self, subscriber: SubscriberId, room_id: &str, entity_id: Id) {
        let Some(room) = self.registry.get(room_id) else {
            self.report(subscriber, AppError::NotFound(format!("room {room_id}")));
            return;
        };
        let mut room = room.lock().await;
        room.touch();
        room.member_entity_ids.retain(|id| *id != entity_id);
        room.cached_projections.remove(&entity_id);

        self.broadcast_snapshot(room_id, &mut room).await;
    }

    /// Apply a partial entity update and broadcast the result: change-log
    /// chat lines for watched attributes, then the updated projection. On
    /// failure only the initiator hears about it.
    pub async fn apply_update(
        &self,
        subscriber: SubscriberId,
        room_id: &str,
        entity_id: Id,
        payload: UpdatePayload,
    ) {
        let Some(room) = self.registry.get(room_id) else {
            self.report(subscriber, AppError::NotFound(format!("room {room_id}")));
            return;
        };
        let mut room = room.lock().await;
        room.touch();
        if !room.member_entity_ids.contains(&entity_id) {
            self.report(
                subscriber,
                AppError::NotFound(format!("entity {entity_id} in room {room_id}")),
            );
            return;
        }

        let updated = match self
            .projection
            .apply_partial_update(entity_id, payload.entity, payload.player_character)
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                warn!(room = room_id, entity = entity_id, error = %e, "entity update rejected");
                self.report(subscriber, e);
                return;
            }
        };

        let previous = room.cached_projections.insert(entity_id, updated.clone());
        if let Some(previous) = previous {
            for line in change_log(&previous, &updated) {
                self.transport.publish(
                    room_id,
                    RoomEvent::ChatMessage {
                        sender: LOG_SENDER.to_string(),
                        message: line,
                        timestamp: Utc::now().timestamp_millis(),
                    },
                );
            }
        }

        self.transport.publish(
            room_id,
            RoomEvent::EntityUpdated { entity_id, updated_entity: updated },
        );
    }

    /// Push an already-applied entity update into every room the entity is a
    /// member of: change-log lines against each room's cached projection,
    /// then the updated projection. Used by the HTTP update path so edits
    /// made outside a room are still visible at live tables.
    pub async fn broadcast_entity_update(&self, entity_id: Id, updated: Projection) {
        for room_id in self.registry.room_ids() {
            let Some(room) = self.registry.get(&room_id) else {
                continue;
            };
            let mut room = room.lock().await;
            if !room.member_entity_ids.contains(&entity_id) {
                continue;
            }
            room.touch();

            let previous = room.cached_projections.insert(entity_id, updated.clone());
            if let Some(previous) = previous {
                for line in change_log(&previous, &updated) {
                    self.transport.publish(
                        &room_id,
                        RoomEvent::ChatMessage {
                            sender: LOG_SENDER.to_string(),
                            message: line,
                            timestamp: Utc::now().timestamp_millis(),
                        },
                    );
                }
            }
            self.transport.publish(
                &room_id,
                RoomEvent::EntityUpdated { entity_id, updated_entity: updated.clone() },
            );
        }
    }

    /// Relay a chat line to every subscriber of a room
    pub async fn relay_message(
        &self,
        subscriber: SubscriberId,
        room_id: &str,
        sender: String,
        message: String,
    ) {
        if message.trim().is_empty() {
            self.report(subscriber, AppError::InvalidArgument("empty chat message".into()));
            return;
        }
        if let Some(room) = self.registry.get(room_id) {
            room.lock().await.touch();
        }
        self.transport.publish(
            room_id,
            RoomEvent::ChatMessage {
                sender,
                message,
                timestamp: Utc::now().timestamp_millis(),
            },
        );
    }

    /// Re-resolve every member and publish the room snapshot
    async fn broadcast_snapshot(&self, room_id: &str, room: &mut Room) {
        let entities = self.refresh_cache(room).await;
        self.transport.publish(
            room_id,
            RoomEvent::RoomData {
                entity_ids: room.member_entity_ids.clone(),
                entities,
            },
        );
    }

    /// Re-project the member list and reset the diff baseline
    async fn refresh_cache(&self, room: &mut Room) -> Vec<Projection> {
        let entities = self.projection.batch_fetch(&room.member_entity_ids).await;
        room.cached_projections = entities.iter().map(|p| (p.id, p.clone())).collect();
        entities
    }

    fn report(&self, subscriber: SubscriberId, error: AppError) {
        self.transport.send_to(
            subscriber,
            RoomEvent::Error {
                message: error.to_string(),
                details: Some(error.kind().to_string()),
            },
        );
    }
}

/// Human-readable lines for the attribute changes a table cares about
fn change_log(previous: &Projection, next: &Projection) -> Vec<String> {
    let mut lines = Vec::new();
    if next.hp < previous.hp {
        lines.push(format!("{} lost {} HP", next.name, previous.hp - next.hp));
    } else if next.hp > previous.hp {
        lines.push(format!("{} gained {} HP", next.name, next.hp - previous.hp));
    }
    if next.max_hp != previous.max_hp {
        lines.push(format!(
            "{}'s max HP changed from {} to {}",
            next.name, previous.max_hp, next.max_hp
        ));
    }
    if next.temp_hp != previous.temp_hp {
        lines.push(format!(
            "{}'s temp HP changed from {} to {}",
            next.name, previous.temp_hp, next.temp_hp
        ));
    }
    if next.speed != previous.speed {
        lines.push(format!(
            "{}'s speed changed from {} to {}",
            next.name, previous.speed, next.speed
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::EntityPatch;
    use crate::store::{EntityRow, MemStore};
    use crate::transport::LocalTransport;
    use tokio::sync::mpsc;

    async fn seed_entity(store: &MemStore, name: &str, hp: i32) -> Id {
        let name = name.to_string();
        let mut id = 0;
        store
            .seed(|tables| {
                id = tables.allocate_id();
                tables.entities.insert(
                    id,
                    EntityRow {
                        id,
                        created_by: 1,
                        entity_type: "npc".into(),
                        name,
                        hp,
                        max_hp: hp,
                        temp_hp: 0,
                        ac: 14,
                        speed: 30,
                        passive_perception: 11,
                        stats: serde_json::json!({}),
                        spellcasting: None,
                    },
                );
            })
            .await;
        id
    }

    struct Fixture {
        store: Arc<MemStore>,
        transport: Arc<LocalTransport>,
        coordinator: BroadcastCoordinator<MemStore, LocalTransport>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemStore::new());
        let transport = Arc::new(LocalTransport::new());
        let coordinator = BroadcastCoordinator::new(
            ProjectionService::new(Arc::clone(&store)),
            Arc::new(RoomRegistry::new()),
            Arc::clone(&transport),
        );
        Fixture { store, transport, coordinator }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<RoomEvent>) -> Vec<RoomEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_join_sends_snapshot_to_joiner_only() {
        let f = fixture();
        let (a, mut rx_a) = f.transport.register();
        let (b, mut rx_b) = f.transport.register();

        f.coordinator.join_room(a, "table-1").await;
        f.coordinator.join_room(b, "table-1").await;

        let a_events = drain(&mut rx_a);
        // A received its own snapshot but not B's join snapshot
        assert_eq!(a_events.len(), 1);
        assert!(matches!(a_events[0], RoomEvent::RoomData { .. }));
        assert_eq!(drain(&mut rx_b).len(), 1);
    }

    #[tokio::test]
    async fn test_add_member_is_idempotent_and_broadcasts() {
        let f = fixture();
        let goblin = seed_entity(&f.store, "Goblin", 7).await;
        let (a, mut rx_a) = f.coordinator_join("table-1").await;

        f.coordinator.add_member(a, "table-1", goblin).await;
        f.coordinator.add_member(a, "table-1", goblin).await;

        let room = f.coordinator.registry().get("table-1").unwrap();
        assert_eq!(room.lock().await.member_entity_ids, vec![goblin]);

        let events = drain(&mut rx_a);
        // join snapshot plus one snapshot per add
        assert_eq!(events.len(), 3);
        match &events[2] {
            RoomEvent::RoomData { entity_ids, entities } => {
                assert_eq!(entity_ids, &vec![goblin]);
                assert_eq!(entities.len(), 1);
            }
            other => panic!("expected RoomData, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_add_unknown_entity_reports_only_to_initiator() {
        let f = fixture();
        let (a, mut rx_a) = f.coordinator_join("table-1").await;
        let (b, mut rx_b) = f.coordinator_join("table-1").await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        f.coordinator.add_member(a, "table-1", 999).await;

        let a_events = drain(&mut rx_a);
        assert_eq!(a_events.len(), 1);
        match &a_events[0] {
            RoomEvent::Error { details, .. } => {
                assert_eq!(details.as_deref(), Some("notFound"));
            }
            other => panic!("expected Error, got {other:?}"),
        }
        assert!(drain(&mut rx_b).is_empty());
    }

    #[tokio::test]
    async fn test_update_broadcasts_change_log_then_projection() {
        let f = fixture();
        let goblin = seed_entity(&f.store, "Goblin", 7).await;
        let (a, mut rx_a) = f.coordinator_join("table-1").await;
        f.coordinator.add_member(a, "table-1", goblin).await;
        drain(&mut rx_a);

        let payload = UpdatePayload {
            entity: EntityPatch { hp: Some(2), speed: Some(20), ..Default::default() },
            player_character: None,
        };
        f.coordinator.apply_update(a, "table-1", goblin, payload).await;

        let events = drain(&mut rx_a);
        assert_eq!(events.len(), 3);
        match (&events[0], &events[1]) {
            (
                RoomEvent::ChatMessage { sender: s1, message: m1, .. },
                RoomEvent::ChatMessage { sender: s2, message: m2, .. },
            ) => {
                assert_eq!(s1, LOG_SENDER);
                assert_eq!(m1, "Goblin lost 5 HP");
                assert_eq!(s2, LOG_SENDER);
                assert_eq!(m2, "Goblin's speed changed from 30 to 20");
            }
            other => panic!("expected two chat lines, got {other:?}"),
        }
        match &events[2] {
            RoomEvent::EntityUpdated { entity_id, updated_entity } => {
                assert_eq!(*entity_id, goblin);
                assert_eq!(updated_entity.hp, 2);
            }
            other => panic!("expected EntityUpdated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_update_broadcasts_nothing() {
        let f = fixture();
        let goblin = seed_entity(&f.store, "Goblin", 7).await;
        let (a, mut rx_a) = f.coordinator_join("table-1").await;
        let (b, mut rx_b) = f.coordinator_join("table-1").await;
        f.coordinator.add_member(a, "table-1", goblin).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        // An empty patch is invalid
        f.coordinator
            .apply_update(a, "table-1", goblin, UpdatePayload::default())
            .await;

        let a_events = drain(&mut rx_a);
        assert_eq!(a_events.len(), 1);
        assert!(matches!(a_events[0], RoomEvent::Error { .. }));
        assert!(drain(&mut rx_b).is_empty());

        // The diff baseline is untouched
        let room = f.coordinator.registry().get("table-1").unwrap();
        let cached_hp = room.lock().await.cached_projections[&goblin].hp;
        assert_eq!(cached_hp, 7);
    }

    #[tokio::test]
    async fn test_update_on_non_member_entity_is_rejected() {
        let f = fixture();
        let goblin = seed_entity(&f.store, "Goblin", 7).await;
        let (a, mut rx_a) = f.coordinator_join("table-1").await;
        drain(&mut rx_a);

        let payload = UpdatePayload {
            entity: EntityPatch { hp: Some(1), ..Default::default() },
            player_character: None,
        };
        f.coordinator.apply_update(a, "table-1", goblin, payload).await;

        let events = drain(&mut rx_a);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], RoomEvent::Error { .. }));
    }

    #[tokio::test]
    async fn test_external_update_reaches_member_rooms_only() {
        let f = fixture();
        let goblin = seed_entity(&f.store, "Goblin", 7).await;
        let (a, mut rx_a) = f.coordinator_join("table-1").await;
        let (_b, mut rx_b) = f.coordinator_join("table-2").await;
        f.coordinator.add_member(a, "table-1", goblin).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        // An update applied outside any room, e.g. through the HTTP path
        let service = ProjectionService::new(Arc::clone(&f.store));
        let patch = EntityPatch { hp: Some(3), ..Default::default() };
        let updated = service.apply_partial_update(goblin, patch, None).await.unwrap();
        f.coordinator.broadcast_entity_update(goblin, updated).await;

        let a_events = drain(&mut rx_a);
        assert_eq!(a_events.len(), 2);
        match (&a_events[0], &a_events[1]) {
            (
                RoomEvent::ChatMessage { sender, message, .. },
                RoomEvent::EntityUpdated { entity_id, updated_entity },
            ) => {
                assert_eq!(sender, LOG_SENDER);
                assert_eq!(message, "Goblin lost 4 HP");
                assert_eq!(*entity_id, goblin);
                assert_eq!(updated_entity.hp, 3);
            }
            other => panic!("expected chat line then projection, got {other:?}"),
        }

        // A room the entity is not in hears nothing
        assert!(drain(&mut rx_b).is_empty());

        // The diff baseline advanced to the new value
        let room = f.coordinator.registry().get("table-1").unwrap();
        assert_eq!(room.lock().await.cached_projections[&goblin].hp, 3);
    }

    #[tokio::test]
    async fn test_remove_member_broadcasts_reduced_snapshot() {
        let f = fixture();
        let goblin = seed_entity(&f.store, "Goblin", 7).await;
        let wolf = seed_entity(&f.store, "Wolf", 11).await;
        let (a, mut rx_a) = f.coordinator_join("table-1").await;
        f.coordinator.add_member(a, "table-1", goblin).await;
        f.coordinator.add_member(a, "table-1", wolf).await;
        drain(&mut rx_a);

        f.coordinator.remove_member(a, "table-1", goblin).await;

        let events = drain(&mut rx_a);
        assert_eq!(events.len(), 1);
        match &events[0] {
            RoomEvent::RoomData { entity_ids, .. } => assert_eq!(entity_ids, &vec![wolf]),
            other => panic!("expected RoomData, got {other:?}"),
        }
        let room = f.coordinator.registry().get("table-1").unwrap();
        assert!(!room.lock().await.cached_projections.contains_key(&goblin));
    }

    #[tokio::test]
    async fn test_chat_relay_reaches_the_room() {
        let f = fixture();
        let (a, mut rx_a) = f.coordinator_join("table-1").await;
        let (b, mut rx_b) = f.coordinator_join("table-1").await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        f.coordinator
            .relay_message(a, "table-1", "gm".into(), "roll for initiative".into())
            .await;

        for rx in [&mut rx_a, &mut rx_b] {
            let events = drain(rx);
            assert_eq!(events.len(), 1);
            match &events[0] {
                RoomEvent::ChatMessage { sender, message, timestamp } => {
                    assert_eq!(sender, "gm");
                    assert_eq!(message, "roll for initiative");
                    assert!(*timestamp > 0);
                }
                other => panic!("expected ChatMessage, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_empty_chat_message_is_rejected() {
        let f = fixture();
        let (a, mut rx_a) = f.coordinator_join("table-1").await;
        drain(&mut rx_a);

        f.coordinator
            .relay_message(a, "table-1", "gm".into(), "   ".into())
            .await;

        let events = drain(&mut rx_a);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], RoomEvent::Error { .. }));
    }

    impl Fixture {
        /// Register a connection and join it to a room
        async fn coordinator_join(
            &self,
            room: &str,
        ) -> (SubscriberId, mpsc::UnboundedReceiver<RoomEvent>) {
            let (id, rx) = self.transport.register();
            self.coordinator.join_room(id, room).await;
            (id, rx)
        }
    }
}
