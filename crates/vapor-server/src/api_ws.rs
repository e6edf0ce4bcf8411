//! WebSocket transport adapter.
//!
//! Each connection gets a hub session with a bounded outbound queue. A
//! writer task drains the queue into the socket and keeps the connection
//! alive with pings; the reader decodes frames and hands them to the hub.
//! Whatever ends the reader ends the session.

use crate::AppState;
use axum::{
    body::Bytes,
    extract::{
        ws::{Message as AxumMessage, WebSocket},
        ConnectInfo, Extension, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::{net::SocketAddr, sync::Arc};
use tokio::time::{Instant, Interval};
use vapor_hub::Hub;
use vapor_types::{decode_client_frame, OutboundEvent, SessionId};

/// Handler for `GET /ws`.
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    tracing::debug!(remote_addr = %addr, "websocket upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state, addr))
}

/// Queues an `error` frame for the session.
fn send_ws_error(hub: &Hub, session_id: SessionId, message: String) {
    if !hub
        .registry()
        .send(session_id, OutboundEvent::Error { message })
    {
        tracing::warn!(session_id = %session_id, "failed to send WebSocket error to client");
    }
}

/// Resolves on the next ping tick, or never when pings are disabled.
async fn next_ping(ping: &mut Option<Interval>) {
    match ping {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, addr: SocketAddr) {
    let hub = state.hub.clone();
    let (mut sender, mut receiver) = socket.split();
    let (session_id, mut rx) = hub.open_session();
    tracing::info!(session_id = %session_id, remote_addr = %addr, "websocket connected");

    let ping_interval = state.transport.ping_interval();
    let send_task = tokio::spawn(async move {
        let mut ping =
            ping_interval.map(|period| tokio::time::interval_at(Instant::now() + period, period));
        loop {
            let outgoing = tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => match serde_json::to_string(event.as_ref()) {
                        Ok(json) => AxumMessage::Text(json.into()),
                        Err(e) => {
                            tracing::error!(
                                session_id = %session_id,
                                event = event.name(),
                                "failed to serialize outbound event: {}",
                                e
                            );
                            continue;
                        }
                    },
                    None => break,
                },
                () = next_ping(&mut ping) => AxumMessage::Ping(Bytes::new()),
            };
            if sender.send(outgoing).await.is_err() {
                break;
            }
        }
    });

    let idle_timeout = state.transport.idle_timeout();
    loop {
        let next = match idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, receiver.next()).await {
                Ok(next) => next,
                Err(_) => {
                    tracing::info!(session_id = %session_id, "websocket idle timeout; closing");
                    break;
                }
            },
            None => receiver.next().await,
        };

        let msg = match next {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                tracing::debug!(session_id = %session_id, "websocket receive error: {}", e);
                break;
            }
            None => break,
        };

        match msg {
            AxumMessage::Text(text) => match decode_client_frame(text.as_str()) {
                Ok(frame) => {
                    if let Err(e) = hub.dispatch(session_id, frame) {
                        tracing::error!(session_id = %session_id, "closing websocket: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(session_id = %session_id, "malformed frame: {}", e);
                    send_ws_error(&hub, session_id, format!("malformed frame: {e}"));
                }
            },
            AxumMessage::Binary(_) => {
                send_ws_error(&hub, session_id, "binary frames are not supported".to_string());
            }
            AxumMessage::Close(_) => break,
            AxumMessage::Ping(_) | AxumMessage::Pong(_) => {}
        }
    }

    hub.disconnect(session_id);
    send_task.abort();
    tracing::info!(session_id = %session_id, remote_addr = %addr, "websocket closed");
}
