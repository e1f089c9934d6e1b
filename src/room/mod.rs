//! Real-time rooms: registry, wire events, broadcast coordination and the
//! idle sweeper

pub mod coordinator;
pub mod events;
pub mod registry;
pub mod sweeper;

pub use coordinator::{BroadcastCoordinator, LOG_SENDER};
pub use events::{ClientCommand, RoomEvent, UpdatePayload};
pub use registry::{Room, RoomRegistry};
pub use sweeper::{spawn_sweeper, sweep_once, SweeperConfig};
