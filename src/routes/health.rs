//! Liveness probe

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    pub timestamp: String,
    #[serde(rename = "nodeId")]
    pub node_id: String,
    pub mode: String,
    /// Live room count, informational
    pub rooms: usize,
}

/// Handle `GET /health`. Returns 200 whenever the service is running.
pub fn health_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let response = HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
        node_id: state.args.node_id.to_string(),
        mode: if state.args.dev_mode {
            "development".to_string()
        } else {
            "production".to_string()
        },
        rooms: state.registry.len(),
    };

    super::json_response(StatusCode::OK, &response)
}
