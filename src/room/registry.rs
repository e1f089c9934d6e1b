//! Room registry
//!
//! Rooms are identified by an arbitrary client-chosen string and spring into
//! existence on first join. Each room tracks its member entity ids, a cache
//! of their last broadcast projections for diffing, and a last-activity
//! timestamp for the idle sweeper.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::info;

use crate::projection::Projection;
use crate::store::Id;

/// Mutable state of one live room, guarded by its own lock
#[derive(Debug)]
pub struct Room {
    /// Entity ids in join order, no duplicates
    pub member_entity_ids: Vec<Id>,
    /// Last projection broadcast per member, the diff baseline
    pub cached_projections: HashMap<Id, Projection>,
    pub last_active: Instant,
}

impl Room {
    fn new() -> Self {
        Self {
            member_entity_ids: Vec::new(),
            cached_projections: HashMap::new(),
            last_active: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }
}

/// Registry of live rooms, shared across connections and the sweeper
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: DashMap<String, Arc<Mutex<Room>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Room by name, created fresh on first reference
    pub fn get_or_create(&self, room_id: &str) -> Arc<Mutex<Room>> {
        self.rooms
            .entry(room_id.to_string())
            .or_insert_with(|| {
                info!(room = room_id, "room created");
                Arc::new(Mutex::new(Room::new()))
            })
            .clone()
    }

    /// Room by name if it is live
    pub fn get(&self, room_id: &str) -> Option<Arc<Mutex<Room>>> {
        self.rooms.get(room_id).map(|r| r.clone())
    }

    /// Drop a room's state. Re-joining later recreates it empty.
    pub fn evict(&self, room_id: &str) -> bool {
        let evicted = self.rooms.remove(room_id).is_some();
        if evicted {
            info!(room = room_id, "room evicted");
        }
        evicted
    }

    /// Drop a room's state only if `pred` holds, evaluated under the map
    /// entry's lock so no `get_or_create` can slip between the check and the
    /// removal.
    pub fn evict_if<F>(&self, room_id: &str, pred: F) -> bool
    where
        F: FnOnce(&Arc<Mutex<Room>>) -> bool,
    {
        let evicted = self.rooms.remove_if(room_id, |_, room| pred(room)).is_some();
        if evicted {
            info!(room = room_id, "room evicted");
        }
        evicted
    }

    /// Names of every live room, for the sweeper pass
    pub fn room_ids(&self) -> Vec<String> {
        self.rooms.iter().map(|r| r.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
