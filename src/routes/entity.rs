//! Entity projection endpoints
//!
//! - `GET /api/entity/{id}/summary` - flattened client-facing view
//! - `PATCH /api/entity/{id}` - partial update, returns the new projection
//!   and notifies every live room the entity is a member of

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;

use super::{error_response, json_response, read_json_body};
use crate::room::UpdatePayload;
use crate::server::AppState;
use crate::store::Id;

pub async fn handle_summary(state: Arc<AppState>, entity_id: Id) -> Response<Full<Bytes>> {
    match state.projection.get_summary(entity_id).await {
        Ok(projection) => json_response(StatusCode::OK, &projection),
        Err(e) => error_response(e),
    }
}

pub async fn handle_update(
    req: Request<Incoming>,
    state: Arc<AppState>,
    entity_id: Id,
) -> Response<Full<Bytes>> {
    let body: UpdatePayload = match read_json_body(req).await {
        Ok(body) => body,
        Err(e) => return error_response(e),
    };

    match state
        .projection
        .apply_partial_update(entity_id, body.entity, body.player_character)
        .await
    {
        Ok(projection) => {
            // Live tables hear about HTTP-initiated edits too
            state
                .coordinator
                .broadcast_entity_update(entity_id, projection.clone())
                .await;
            json_response(StatusCode::OK, &projection)
        }
        Err(e) => error_response(e),
    }
}
