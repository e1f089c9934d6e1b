//! Room pub/sub transport abstraction
//!
//! The broadcast coordinator talks to subscribers through this contract:
//! register a connection, subscribe it to named rooms, fan events out. The
//! shipped implementation is [`LocalTransport`], in-process channel fan-out.
//! A brokered transport would implement the same trait.

mod local;

pub use local::LocalTransport;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::room::events::RoomEvent;

/// Identifies one connected subscriber across its lifetime
pub type SubscriberId = Uuid;

/// Pub/sub fan-out for room events.
///
/// Delivery is per-subscriber ordered and best-effort: a subscriber that is
/// gone is dropped, never blocks the publisher.
pub trait RoomTransport: Send + Sync + 'static {
    /// Register a new connection; events arrive on the returned receiver
    fn register(&self) -> (SubscriberId, mpsc::UnboundedReceiver<RoomEvent>);

    /// Add a subscriber to a room's recipient set. Idempotent.
    fn subscribe(&self, room: &str, subscriber: SubscriberId);

    /// Deliver an event to every subscriber of a room
    fn publish(&self, room: &str, event: RoomEvent);

    /// Deliver an event to one subscriber only
    fn send_to(&self, subscriber: SubscriberId, event: RoomEvent);

    /// Drop a connection and remove it from every room
    fn disconnect(&self, subscriber: SubscriberId);

    /// Live subscribers of a room
    fn subscriber_count(&self, room: &str) -> usize;
}
