//! WebSocket viewer channel
//!
//! Each connection gets one bounded outbound queue. The relay pushes
//! `stream-data` chunks into it; control replies share the same queue so a
//! viewer sees them in order with the video.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use watchdog_common::db;

use crate::relay::{generate_stream_id, ClientMessage, ServerMessage, ViewerId, ViewerSender};
use crate::AppState;

/// GET /ws
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Per-connection state kept on the receive side
struct Viewer {
    id: ViewerId,
    tx: ViewerSender,
    /// Ad-hoc relays this connection opened with `connect-rtsp`
    adhoc: HashSet<String>,
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (tx, mut rx) = state.relays.viewer_channel();
    let mut viewer = Viewer {
        id: Uuid::new_v4(),
        tx,
        adhoc: HashSet::new(),
    };
    info!("Viewer connected: {}", viewer.id);

    let (mut sender, mut receiver) = socket.split();

    let viewer_id = viewer.id;
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize message for {}: {}", viewer_id, e);
                    continue;
                }
            };

            if let Err(e) = sender.send(Message::Text(json)).await {
                debug!("Send to viewer {} failed: {}", viewer_id, e);
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut send_task => {
                debug!("Send task completed for viewer {}", viewer.id);
                break;
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => handle_message(&state, &mut viewer, &text).await,
                Some(Ok(Message::Binary(_))) => {
                    warn!("Received binary message from {}, ignoring", viewer.id);
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!("Viewer {} closed the connection", viewer.id);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket error from {}: {}", viewer.id, e);
                    break;
                }
            }
        }
    }

    send_task.abort();
    let stopped = state.relays.remove_viewer(viewer.id).await;
    info!(
        "Viewer disconnected: {} ({} relays stopped)",
        viewer.id,
        stopped.len()
    );
}

async fn handle_message(state: &AppState, viewer: &mut Viewer, text: &str) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            debug!("Malformed message from {}: {}", viewer.id, e);
            reply(viewer, ServerMessage::error(format!("invalid message: {}", e))).await;
            return;
        }
    };

    match message {
        ClientMessage::SubscribeStream { stream_id } => subscribe(state, viewer, stream_id).await,
        ClientMessage::UnsubscribeStream { stream_id } => {
            if !state.relays.remove_viewer_from(&stream_id, viewer.id).await {
                debug!("Viewer {} was not watching {}", viewer.id, stream_id);
            }
        }
        ClientMessage::ConnectRtsp { url } => connect_adhoc(state, viewer, url).await,
        ClientMessage::DisconnectRtsp { stream_id } => {
            if viewer.adhoc.remove(&stream_id) {
                state.relays.remove_stream(&stream_id).await;
            } else {
                reply(
                    viewer,
                    ServerMessage::RtspError {
                        message: format!("no ad-hoc relay {} on this connection", stream_id),
                    },
                )
                .await;
            }
        }
    }
}

async fn subscribe(state: &AppState, viewer: &Viewer, stream_id: String) {
    let record = match db::get_stream(&state.db, &stream_id).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            reply(viewer, ServerMessage::error(format!("stream not found: {}", stream_id))).await;
            return;
        }
        Err(e) => {
            error!("Catalog lookup for {} failed: {}", stream_id, e);
            reply(viewer, ServerMessage::error("catalog unavailable")).await;
            return;
        }
    };

    match state
        .relays
        .add_viewer(&record.id, &record.url, viewer.id, viewer.tx.clone())
        .await
    {
        Ok(_) => reply(viewer, ServerMessage::Subscribed { stream_id }).await,
        Err(e) => {
            warn!("Viewer {} could not join {}: {}", viewer.id, stream_id, e);
            reply(
                viewer,
                ServerMessage::StreamError {
                    stream_id,
                    message: e.to_string(),
                },
            )
            .await;
        }
    }
}

async fn connect_adhoc(state: &AppState, viewer: &mut Viewer, url: String) {
    let url = url.trim().to_string();
    if url.is_empty() || url.chars().any(char::is_whitespace) {
        reply(
            viewer,
            ServerMessage::RtspError {
                message: "a single URL is required".to_string(),
            },
        )
        .await;
        return;
    }

    let stream_id = generate_stream_id();
    match state
        .relays
        .add_viewer(&stream_id, &url, viewer.id, viewer.tx.clone())
        .await
    {
        Ok(_) => {
            viewer.adhoc.insert(stream_id.clone());
            reply(viewer, ServerMessage::RtspConnected { stream_id }).await;
        }
        Err(e) => {
            warn!("Ad-hoc relay for {} failed: {}", url, e);
            reply(
                viewer,
                ServerMessage::RtspError {
                    message: e.to_string(),
                },
            )
            .await;
        }
    }
}

async fn reply(viewer: &Viewer, message: ServerMessage) {
    if viewer.tx.send(message).await.is_err() {
        debug!("Viewer {} queue closed before reply", viewer.id);
    }
}
