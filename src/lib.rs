//! Lorehall - campaign content tree and real-time room service
//!
//! Lorehall keeps a campaign's content in a manually ordered folder tree and
//! mirrors live table state to connected clients over WebSocket rooms.
//!
//! ## Services
//!
//! - **Tree**: folders with positioned items (notes, sub-folders, entities)
//! - **Projection**: flattened client-facing entity views with partial updates
//! - **Rooms**: join/leave, entity membership, chat and change-log broadcast
//! - **Sweeper**: background eviction of idle, unwatched rooms

pub mod config;
pub mod projection;
pub mod room;
pub mod routes;
pub mod server;
pub mod store;
pub mod transport;
pub mod tree;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{AppError, Result};
