//! WebSocket handling: renderer events in, session effects out

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use blockdiff_core::session::SessionSnapshot;
use blockdiff_core::{BlockChange, SessionEffect, SessionEvent, json};
use futures_util::{SinkExt, StreamExt};
use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::ServerState;

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Full session state, sent on connect and on request.
    State { state: SessionSnapshot },
    Effect { effect: SessionEffect },
    Error { message: String },
    Pong,
}

/// Messages sent from client to server: a renderer event or a control
/// message.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    Event(SessionEvent),
    Control(Control),
}

impl ClientMessage {
    /// Parse one text frame. The document of a `load` change may nest
    /// arbitrarily deep, so it is lifted out before the rest of the message
    /// is decoded and put back afterwards.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let mut value: Value = json::from_str(text)?;
        let document = value.pointer_mut("/change/document").map(Value::take);
        let decoded = match json::check_depth(&value) {
            Ok(()) => serde_json::from_value::<ClientMessage>(value),
            Err(e) => {
                json::release(value);
                Err(serde_json::Error::custom(e))
            }
        };

        let mut message = match decoded {
            Ok(message) => message,
            Err(e) => {
                if let Some(document) = document {
                    json::release(document);
                }
                return Err(e);
            }
        };
        if let Some(document) = document {
            match &mut message {
                ClientMessage::Event(SessionEvent::BlockChanged {
                    change: BlockChange::Load { document: slot },
                    ..
                }) => *slot = document,
                _ => json::release(document),
            }
        }
        Ok(message)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Control {
    RequestState,
    Ping,
}

/// Handle WebSocket upgrade requests
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn state_message(state: &ServerState) -> ServerMessage {
    ServerMessage::State {
        state: state.session.read().await.snapshot(),
    }
}

fn encode(message: &ServerMessage) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!("Failed to serialize server message: {}", e);
            None
        }
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    info!("New WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.effects_tx.subscribe();
    // Replies meant for this client only.
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<String>();

    if let Some(text) = encode(&state_message(&state).await) {
        if sender.send(Message::Text(text)).await.is_err() {
            warn!("Failed to send initial state to WebSocket client");
            return;
        }
    }

    let state_clone = Arc::clone(&state);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    debug!("Received WebSocket message: {}", text);
                    if let Some(reply) = handle_client_text(&text, &state_clone).await {
                        if let Some(encoded) = encode(&reply) {
                            if reply_tx.send(encoded).is_err() {
                                break;
                            }
                        }
                    }
                }
                Message::Close(_) => {
                    debug!("WebSocket client disconnected");
                    break;
                }
                _ => {}
            }
        }
    });

    let mut send_task = tokio::spawn(async move {
        loop {
            let text = tokio::select! {
                broadcasted = rx.recv() => match broadcasted {
                    Ok(text) => text,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("WebSocket client lagged behind by {} messages", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                reply = reply_rx.recv() => match reply {
                    Some(text) => text,
                    None => break,
                },
            };
            if sender.send(Message::Text(text)).await.is_err() {
                debug!("Failed to send message to WebSocket client");
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    info!("WebSocket connection closed");
}

/// Handle one text frame. Returns a reply for this client only; effects of
/// events reach every client through the broadcast channel.
pub async fn handle_client_text(text: &str, state: &ServerState) -> Option<ServerMessage> {
    let message = match ClientMessage::parse(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Failed to parse WebSocket message: {}", e);
            return Some(ServerMessage::Error {
                message: format!("unrecognized message: {}", e),
            });
        }
    };

    match message {
        ClientMessage::Event(event) => match state.dispatch(event).await {
            Ok(_) => None,
            Err(e) => {
                warn!("Event rejected: {}", e);
                Some(ServerMessage::Error {
                    message: e.to_string(),
                })
            }
        },
        ClientMessage::Control(Control::RequestState) => Some(state_message(state).await),
        ClientMessage::Control(Control::Ping) => Some(ServerMessage::Pong),
    }
}
