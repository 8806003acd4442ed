//! WebSocket handler for the HUD push channel

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::hub::BroadcastBridge;
use crate::gaze::AttentionStatus;
use crate::{Error, Result};

/// Incoming WebSocket message from a viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsIncoming {
    /// The orb was clicked
    Click,
    /// Keep-alive
    Ping,
    /// Any other `type`
    #[serde(other)]
    Unknown,
}

/// Outgoing WebSocket message to viewers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsOutgoing {
    /// Sent once when a viewer connects
    Connected { message: String },
    /// Smoothed attention status, every frame
    Status { value: AttentionStatus },
    /// A line is about to be spoken
    Speak { text: String, envelope: Vec<f32> },
    /// Speech started (`true`) or played to the end (`false`)
    Playing { value: bool },
    /// Pong response
    Pong,
}

/// Parse an inbound text frame
///
/// # Errors
///
/// Returns [`Error::InvalidMessage`] if the payload is not a JSON object
/// with a string `type`
pub fn parse_incoming(text: &str) -> Result<WsIncoming> {
    serde_json::from_str(text).map_err(|e| Error::InvalidMessage(e.to_string()))
}

/// Act on one inbound frame, returning the reply for the sender if any
///
/// Unknown and malformed payloads are logged and ignored.
pub fn handle_message(text: &str, bridge: &BroadcastBridge) -> Option<WsOutgoing> {
    match parse_incoming(text) {
        Ok(WsIncoming::Click) => {
            tracing::info!("orb clicked by remote viewer");
            bridge.dispatch_click();
            None
        }
        Ok(WsIncoming::Ping) => Some(WsOutgoing::Pong),
        Ok(WsIncoming::Unknown) => {
            tracing::info!(payload = %text, "ignoring unknown message type");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "ignoring malformed message");
            None
        }
    }
}

/// Build WebSocket router
///
/// Viewers may connect on `/` or `/ws`.
pub fn router(bridge: BroadcastBridge) -> Router {
    Router::new()
        .route("/", get(ws_upgrade))
        .route("/ws", get(ws_upgrade))
        .with_state(bridge)
}

async fn ws_upgrade(
    State(bridge): State<BroadcastBridge>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, bridge))
}

/// Handle one viewer connection until either side closes
async fn handle_socket(socket: WebSocket, bridge: BroadcastBridge) {
    let (mut sender, mut receiver) = socket.split();

    let (client_id, mut frames) = match bridge.register_client().await {
        Ok(registered) => registered,
        Err(e) => {
            tracing::warn!(error = %e, "rejecting viewer");
            return;
        }
    };

    // Replies addressed to this client only (pong)
    let (reply_tx, mut reply_rx) = mpsc::channel::<WsOutgoing>(8);

    let mut send_task = tokio::spawn(async move {
        loop {
            let text: Arc<str> = tokio::select! {
                frame = frames.recv() => match frame {
                    Some(text) => text,
                    // Dropped by the hub
                    None => break,
                },
                reply = reply_rx.recv() => match reply {
                    Some(reply) => match serde_json::to_string(&reply) {
                        Ok(text) => text.into(),
                        Err(_) => continue,
                    },
                    None => break,
                },
            };

            if sender.send(Message::Text(text.to_string().into())).await.is_err() {
                break;
            }
        }
    });

    let recv_bridge = bridge.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if let Some(reply) = handle_message(text.as_str(), &recv_bridge) {
                        if reply_tx.send(reply).await.is_err() {
                            break;
                        }
                    }
                }
                Message::Close(_) => {
                    tracing::debug!(client = client_id, "WebSocket closed by client");
                    break;
                }
                _ => {}
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    bridge.unregister_client(client_id);
}
