//! Idle room sweeper
//!
//! A background task walks the registry on a fixed interval and evicts rooms
//! that have had no activity past the idle timeout AND have zero live
//! subscribers. A room with subscribers is never evicted no matter how long
//! it has been quiet.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::registry::RoomRegistry;
use crate::transport::RoomTransport;

/// Sweeper timings, overridable from configuration
#[derive(Debug, Clone, Copy)]
pub struct SweeperConfig {
    /// Delay between sweeps
    pub interval: Duration,
    /// Inactivity span after which an unwatched room is dropped
    pub idle_timeout: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// Spawn the periodic sweep task
pub fn spawn_sweeper<T: RoomTransport>(
    registry: Arc<RoomRegistry>,
    transport: Arc<T>,
    config: SweeperConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval);
        // The immediate first tick would sweep an empty registry
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = sweep_once(&registry, transport.as_ref(), config.idle_timeout).await;
            if evicted > 0 {
                info!(evicted, remaining = registry.len(), "idle room sweep");
            } else {
                debug!(rooms = registry.len(), "idle room sweep found nothing to evict");
            }
        }
    })
}

/// One sweep pass; returns the number of rooms evicted.
///
/// Liveness and idleness are checked inside `evict_if`, under the registry
/// entry's lock, so a join landing mid-sweep cannot have its room pulled out
/// from under it: a joiner either already shows up in the subscriber count,
/// or still holds the room handle from `get_or_create` (extra `Arc` owner),
/// or arrives after the removal and gets a fresh room.
pub async fn sweep_once<T: RoomTransport>(
    registry: &RoomRegistry,
    transport: &T,
    idle_timeout: Duration,
) -> usize {
    let mut evicted = 0;
    for room_id in registry.room_ids() {
        let removed = registry.evict_if(&room_id, |room| {
            if transport.subscriber_count(&room_id) > 0 {
                return false;
            }
            // Another task holds a handle to this room; treat it as in use
            if Arc::strong_count(room) > 1 {
                return false;
            }
            match room.try_lock() {
                Ok(room) => room.last_active.elapsed() >= idle_timeout,
                Err(_) => false,
            }
        });
        if removed {
            debug!(room = %room_id, "evicted idle room");
            evicted += 1;
        }
    }
    evicted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{LocalTransport, RoomTransport};
    use std::time::Instant;

    fn backdate(registry: &RoomRegistry, room_id: &str, by: Duration) {
        let room = registry.get_or_create(room_id);
        // Direct field write; try_lock is safe with no contention in tests
        room.try_lock().unwrap().last_active = Instant::now() - by;
    }

    #[tokio::test]
    async fn test_idle_unwatched_room_is_evicted() {
        let registry = RoomRegistry::new();
        let transport = LocalTransport::new();
        backdate(&registry, "stale", Duration::from_secs(700));

        let evicted = sweep_once(&registry, &transport, Duration::from_secs(600)).await;

        assert_eq!(evicted, 1);
        assert!(registry.get("stale").is_none());
    }

    #[tokio::test]
    async fn test_recently_active_room_survives() {
        let registry = RoomRegistry::new();
        let transport = LocalTransport::new();
        backdate(&registry, "fresh", Duration::from_secs(30));

        let evicted = sweep_once(&registry, &transport, Duration::from_secs(600)).await;

        assert_eq!(evicted, 0);
        assert!(registry.get("fresh").is_some());
    }

    #[tokio::test]
    async fn test_watched_room_survives_any_idle_span() {
        let registry = RoomRegistry::new();
        let transport = LocalTransport::new();
        backdate(&registry, "watched", Duration::from_secs(86_400));
        let (subscriber, _rx) = transport.register();
        transport.subscribe("watched", subscriber);

        let evicted = sweep_once(&registry, &transport, Duration::from_secs(600)).await;

        assert_eq!(evicted, 0);
        assert!(registry.get("watched").is_some());
    }

    #[tokio::test]
    async fn test_room_with_join_in_flight_survives() {
        let registry = RoomRegistry::new();
        let transport = LocalTransport::new();
        backdate(&registry, "stale", Duration::from_secs(900));

        // A joiner has fetched the room handle but not yet subscribed at the
        // transport, so the subscriber count still reads zero mid-join
        let joining = registry.get_or_create("stale");

        let evicted = sweep_once(&registry, &transport, Duration::from_secs(600)).await;
        assert_eq!(evicted, 0);
        assert!(registry.get("stale").is_some(), "room evicted under an in-flight join");

        // Once the join is abandoned the next sweep reclaims the room
        drop(joining);
        let evicted = sweep_once(&registry, &transport, Duration::from_secs(600)).await;
        assert_eq!(evicted, 1);
        assert!(registry.get("stale").is_none());
    }

    #[tokio::test]
    async fn test_locked_room_is_not_evicted() {
        let registry = RoomRegistry::new();
        let transport = LocalTransport::new();
        backdate(&registry, "busy", Duration::from_secs(900));

        let room = registry.get_or_create("busy");
        let _guard = room.lock().await;

        let evicted = sweep_once(&registry, &transport, Duration::from_secs(600)).await;
        assert_eq!(evicted, 0);
        assert!(registry.get("busy").is_some());
    }

    #[tokio::test]
    async fn test_sweep_is_selective_across_rooms() {
        let registry = RoomRegistry::new();
        let transport = LocalTransport::new();
        backdate(&registry, "stale-a", Duration::from_secs(900));
        backdate(&registry, "stale-b", Duration::from_secs(601));
        backdate(&registry, "fresh", Duration::from_secs(10));

        let evicted = sweep_once(&registry, &transport, Duration::from_secs(600)).await;

        assert_eq!(evicted, 2);
        assert_eq!(registry.room_ids(), vec!["fresh".to_string()]);
    }
}
