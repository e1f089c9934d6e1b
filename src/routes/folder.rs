//! Folder tree endpoints
//!
//! - `POST /api/folder` - create a folder, optionally under a parent
//! - `GET /api/folder/{id}` - folder with hydrated, position-ordered items
//! - `PATCH /api/folder` - move an item to a folder/position
//! - `DELETE /api/folder/{id}` - delete a folder subtree
//! - `POST /api/folder/items` - append a reference to a folder
//! - `DELETE /api/folder/items/{itemId}` - remove one item

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use super::{error_response, json_response, read_json_body};
use crate::server::AppState;
use crate::store::{Id, ItemKind};
use crate::types::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderRequest {
    pub name: String,
    pub created_by: Id,
    #[serde(default)]
    pub settings: Option<Value>,
    #[serde(default)]
    pub parent_folder_id: Option<Id>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveItemRequest {
    pub item_id: Id,
    pub to_folder_id: Id,
    pub new_position: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub folder_id: Id,
    /// Omitted for entities: the kind is detected from the entity type
    #[serde(rename = "type")]
    pub kind: Option<ItemKind>,
    pub ref_id: Id,
}

pub async fn handle_create(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<Full<Bytes>> {
    let body: CreateFolderRequest = match read_json_body(req).await {
        Ok(body) => body,
        Err(e) => return error_response(e),
    };

    if body.name.trim().is_empty() {
        return error_response(AppError::InvalidArgument("folder name is empty".into()));
    }

    match state
        .tree
        .create_folder(body.name, body.created_by, body.settings, body.parent_folder_id)
        .await
    {
        Ok(folder) => {
            info!(folder = folder.id, "folder created");
            json_response(StatusCode::CREATED, &folder)
        }
        Err(e) => error_response(e),
    }
}

pub async fn handle_get(state: Arc<AppState>, folder_id: Id) -> Response<Full<Bytes>> {
    match state.tree.folder_contents(folder_id).await {
        Ok(view) => json_response(StatusCode::OK, &view),
        Err(e) => error_response(e),
    }
}

pub async fn handle_move(req: Request<Incoming>, state: Arc<AppState>) -> Response<Full<Bytes>> {
    let body: MoveItemRequest = match read_json_body(req).await {
        Ok(body) => body,
        Err(e) => return error_response(e),
    };

    match state.tree.move_item(body.item_id, body.to_folder_id, body.new_position).await {
        Ok(()) => json_response(StatusCode::OK, &serde_json::json!({ "moved": body.item_id })),
        Err(e) => error_response(e),
    }
}

pub async fn handle_delete(state: Arc<AppState>, folder_id: Id) -> Response<Full<Bytes>> {
    match state.tree.delete_folder_recursive(folder_id).await {
        Ok(()) => {
            info!(folder = folder_id, "folder subtree deleted");
            json_response(StatusCode::OK, &serde_json::json!({ "deleted": folder_id }))
        }
        Err(e) => error_response(e),
    }
}

pub async fn handle_add_item(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<Full<Bytes>> {
    let body: AddItemRequest = match read_json_body(req).await {
        Ok(body) => body,
        Err(e) => return error_response(e),
    };

    let result = match body.kind {
        Some(kind) => state.tree.insert_at_end(body.folder_id, kind, body.ref_id).await,
        None => state.tree.attach_entity(body.folder_id, body.ref_id).await,
    };

    match result {
        Ok(item) => json_response(StatusCode::CREATED, &item),
        Err(e) => error_response(e),
    }
}

pub async fn handle_remove_item(state: Arc<AppState>, item_id: Id) -> Response<Full<Bytes>> {
    match state.tree.remove_item(item_id).await {
        Ok(()) => json_response(StatusCode::OK, &serde_json::json!({ "removed": item_id })),
        Err(e) => error_response(e),
    }
}
