//! `WebSocket` handler for real-time telemetry streaming.
//!
//! Clients connect to `GET /ws` and receive one JSON-encoded
//! [`FleetMessage`](homewatt_types::FleetMessage) per tick. Each connection
//! registers its own bounded queue with the hub and drains it onto the
//! socket. Anything the client sends is read and discarded so a close is
//! noticed promptly. Reading also lets the protocol layer flush its pong
//! replies.
//!
//! The connection ends when the client closes, a frame send fails or takes
//! longer than the configured timeout, or the hub drops the queue at
//! shutdown. The subscriber is deregistered on every exit path.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use tracing::{debug, warn};

use crate::hub::Subscription;
use crate::state::AppState;

/// Upgrade an HTTP request to a `WebSocket` connection and begin
/// streaming fleet telemetry.
///
/// # Route
///
/// `GET /ws`
pub async fn ws_telemetry(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

/// Handle the `WebSocket` lifecycle: register with the hub, forward each
/// message as a text frame, and deregister on the way out.
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    let Subscription { id, mut receiver } = match state.hub.subscribe() {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!("Failed to register WebSocket subscriber: {e}");
            return;
        }
    };

    debug!(subscriber = %id, "WebSocket client connected");

    loop {
        tokio::select! {
            // Receive the next fleet message from the hub.
            next = receiver.recv() => {
                let Some(message) = next else {
                    debug!(subscriber = %id, "Hub closed, shutting down WebSocket");
                    let _ = tokio::time::timeout(
                        state.send_timeout,
                        socket.send(Message::Close(None)),
                    )
                    .await;
                    break;
                };
                let json = match serde_json::to_string(message.as_ref()) {
                    Ok(j) => j,
                    Err(e) => {
                        warn!("Failed to serialize fleet message: {e}");
                        continue;
                    }
                };
                let send = socket.send(Message::Text(json.into()));
                match tokio::time::timeout(state.send_timeout, send).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!(subscriber = %id, "WebSocket client disconnected (send failed): {e}");
                        break;
                    }
                    Err(elapsed) => {
                        warn!(subscriber = %id, "WebSocket send timed out: {elapsed}");
                        break;
                    }
                }
            }
            // Check if the client sent a close frame or disconnected.
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(subscriber = %id, "WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!(subscriber = %id, "WebSocket error: {e}");
                        break;
                    }
                    _ => {
                        // Pings are answered by the protocol layer; other
                        // inbound frames are ignored.
                    }
                }
            }
        }
    }

    state.hub.deregister(id);
}
