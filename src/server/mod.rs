//! HTTP server and WebSocket room endpoint

mod http;
pub mod websocket;

pub use http::{run, AppState};
