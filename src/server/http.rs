//! HTTP server implementation
//!
//! hyper http1 with TokioIo per connection; routing is a match over method
//! and path. WebSocket upgrades for the room endpoint are handed to
//! [`websocket`].

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::Args;
use crate::projection::ProjectionService;
use crate::room::{BroadcastCoordinator, RoomRegistry};
use crate::routes;
use crate::server::websocket;
use crate::store::{Id, MemStore};
use crate::transport::LocalTransport;
use crate::tree::TreeStore;
use crate::types::AppError;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub store: Arc<MemStore>,
    pub tree: TreeStore<MemStore>,
    pub projection: ProjectionService<MemStore>,
    pub registry: Arc<RoomRegistry>,
    pub transport: Arc<LocalTransport>,
    pub coordinator: BroadcastCoordinator<MemStore, LocalTransport>,
}

impl AppState {
    pub fn new(args: Args) -> Self {
        let store = Arc::new(MemStore::new());
        let registry = Arc::new(RoomRegistry::new());
        let transport = Arc::new(LocalTransport::new());
        let tree = TreeStore::new(Arc::clone(&store));
        let projection = ProjectionService::new(Arc::clone(&store));
        let coordinator = BroadcastCoordinator::new(
            projection.clone(),
            Arc::clone(&registry),
            Arc::clone(&transport),
        );

        Self { args, store, tree, projection, registry, transport, coordinator }
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Lorehall listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - demo data seeded");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .with_upgrades()
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        // Liveness probe
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            routes::health_check(Arc::clone(&state))
        }

        // CORS preflight
        (Method::OPTIONS, _) => preflight_response(),

        // Real-time room feed
        (Method::GET, "/ws") => {
            if hyper_tungstenite::is_upgrade_request(&req) {
                websocket::handle_room_upgrade(state, req).await
            } else {
                bad_request_response("WebSocket upgrade required for /ws")
            }
        }

        // Folder tree
        (Method::POST, "/api/folder") => routes::folder::handle_create(req, state).await,
        (Method::PATCH, "/api/folder") => routes::folder::handle_move(req, state).await,
        (Method::POST, "/api/folder/items") => routes::folder::handle_add_item(req, state).await,
        (Method::DELETE, p) if p.starts_with("/api/folder/items/") => {
            match parse_id(p.strip_prefix("/api/folder/items/").unwrap_or("")) {
                Ok(item_id) => routes::folder::handle_remove_item(state, item_id).await,
                Err(e) => routes::error_response(e),
            }
        }
        (Method::GET, p) if p.starts_with("/api/folder/") => {
            match parse_id(p.strip_prefix("/api/folder/").unwrap_or("")) {
                Ok(folder_id) => routes::folder::handle_get(state, folder_id).await,
                Err(e) => routes::error_response(e),
            }
        }
        (Method::DELETE, p) if p.starts_with("/api/folder/") => {
            match parse_id(p.strip_prefix("/api/folder/").unwrap_or("")) {
                Ok(folder_id) => routes::folder::handle_delete(state, folder_id).await,
                Err(e) => routes::error_response(e),
            }
        }

        // Entity projections
        (Method::GET, p) if p.starts_with("/api/entity/") && p.ends_with("/summary") => {
            let id_str = p
                .strip_prefix("/api/entity/")
                .and_then(|s| s.strip_suffix("/summary"))
                .unwrap_or("");
            match parse_id(id_str) {
                Ok(entity_id) => routes::entity::handle_summary(state, entity_id).await,
                Err(e) => routes::error_response(e),
            }
        }
        (Method::PATCH, p) if p.starts_with("/api/entity/") => {
            match parse_id(p.strip_prefix("/api/entity/").unwrap_or("")) {
                Ok(entity_id) => routes::entity::handle_update(req, state, entity_id).await,
                Err(e) => routes::error_response(e),
            }
        }

        // Not found
        _ => not_found_response(&path),
    };

    Ok(response)
}

fn parse_id(raw: &str) -> Result<Id, AppError> {
    raw.parse::<Id>()
        .map_err(|_| AppError::InvalidArgument(format!("invalid id '{raw}'")))
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PATCH, DELETE, OPTIONS")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// Not found response
fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Not Found",
        "path": path,
    });

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

/// Bad request response
fn bad_request_response(message: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Bad Request",
        "message": message,
    });

    Response::builder()
        .status(StatusCode::BAD_REQUEST)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("42").unwrap(), 42);
        assert!(matches!(parse_id("").unwrap_err(), AppError::InvalidArgument(_)));
        assert!(matches!(parse_id("abc").unwrap_err(), AppError::InvalidArgument(_)));
    }
}
