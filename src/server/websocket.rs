//! Room WebSocket endpoint
//!
//! ## Protocol
//!
//! Connect: `ws://localhost:5000/ws`
//!
//! Client commands (JSON, `action` tag): `joinRoom`, `addEntity`,
//! `removeEntity`, `updateEntity`, `chatMessage`.
//!
//! Server events (JSON, `event` tag): `roomData`, `entityUpdated`,
//! `chatMessage`, `error`. Errors go only to the subscriber whose command
//! failed.
//!
//! A connection may join any number of rooms; leaving is implicit on
//! disconnect. Room state itself outlives the connection until the idle
//! sweeper reclaims it.

use futures_util::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use crate::room::{ClientCommand, RoomEvent};
use crate::server::AppState;
use crate::transport::RoomTransport;

/// WebSocket type after upgrade
type HyperWebSocket =
    hyper_tungstenite::WebSocketStream<hyper_util::rt::TokioIo<hyper::upgrade::Upgraded>>;

/// Handle WebSocket upgrade for the room feed
pub async fn handle_room_upgrade(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let (response, websocket) = match hyper_tungstenite::upgrade(req, None) {
        Ok((resp, ws)) => (resp, ws),
        Err(e) => {
            error!("WebSocket upgrade failed: {}", e);
            return Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Full::new(Bytes::from("WebSocket upgrade failed")))
                .unwrap();
        }
    };

    tokio::spawn(async move {
        match websocket.await {
            Ok(ws) => {
                let ws: HyperWebSocket = ws;
                if let Err(e) = handle_room_connection(state, ws).await {
                    warn!("Room WebSocket error: {}", e);
                }
            }
            Err(e) => {
                error!("WebSocket connection failed: {}", e);
            }
        }
    });

    let (parts, _body) = response.into_parts();
    Response::from_parts(parts, Full::new(Bytes::new()))
}

/// Handle an individual room WebSocket connection
async fn handle_room_connection(
    state: Arc<AppState>,
    ws: HyperWebSocket,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (mut sender, mut receiver) = ws.split();
    let (subscriber, mut events) = state.transport.register();

    info!(subscriber = %subscriber, "room client connected");

    loop {
        tokio::select! {
            // Event fanned out by the coordinator
            event = events.recv() => {
                match event {
                    Some(event) => {
                        let json = serde_json::to_string(&event)?;
                        if sender.send(WsMessage::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            // Command from the client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<ClientCommand>(&text) {
                            Ok(command) => dispatch(&state, subscriber, command).await,
                            Err(e) => {
                                debug!(subscriber = %subscriber, "unparseable command: {}", e);
                                state.transport.send_to(subscriber, RoomEvent::Error {
                                    message: format!("invalid command: {e}"),
                                    details: None,
                                });
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        info!(subscriber = %subscriber, "room client disconnected");
                        break;
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = sender.send(WsMessage::Pong(data)).await;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }
        }
    }

    state.transport.disconnect(subscriber);
    info!(subscriber = %subscriber, "room connection closed");
    Ok(())
}

async fn dispatch(
    state: &AppState,
    subscriber: crate::transport::SubscriberId,
    command: ClientCommand,
) {
    match command {
        ClientCommand::JoinRoom { room } => {
            state.coordinator.join_room(subscriber, &room).await;
        }
        ClientCommand::AddEntity { room, entity_id } => {
            state.coordinator.add_member(subscriber, &room, entity_id).await;
        }
        ClientCommand::RemoveEntity { room, entity_id } => {
            state.coordinator.remove_member(subscriber, &room, entity_id).await;
        }
        ClientCommand::UpdateEntity { room, entity_id, updated_data } => {
            state
                .coordinator
                .apply_update(subscriber, &room, entity_id, updated_data)
                .await;
        }
        ClientCommand::ChatMessage { room, sender, message } => {
            state.coordinator.relay_message(subscriber, &room, sender, message).await;
        }
    }
}
